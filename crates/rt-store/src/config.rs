use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which structured parser turns questions into queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserBackend {
    #[default]
    Deterministic,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub backend: ParserBackend,
    /// OpenAI-compatible chat-completions endpoint.
    pub url: String,
    pub model: String,
    /// Environment variable holding the bearer key, if the endpoint needs one.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            backend: ParserBackend::Deterministic,
            url: "http://127.0.0.1:1234/v1/chat/completions".to_string(),
            model: "qwen2.5-7b-instruct".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub csv_path: PathBuf,
    pub parser: ParserConfig,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("Combined_AllMetrics.csv"),
            parser: ParserConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve configuration: explicit path, then `$RT_CONFIG`, then
    /// defaults. `$RT_DATA` overrides the CSV path in every case.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = env::var_os("RT_CONFIG").map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        if let Some(data) = env::var_os("RT_DATA") {
            config.csv_path = PathBuf::from(data);
        }
        Ok(config)
    }
}

mod llm;
mod narrate;
mod server;

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser as ClapParser, Subcommand};
use rt_core::{ConversationState, Dataset, Engine, IsoDate, Metric};
use rt_store::{Config, load_csv};

use crate::llm::Parser;
use crate::narrate::{narrate, narrate_definition};

#[derive(ClapParser)]
#[command(name = "rt", about = "Ask trend questions about rehabilitation game sessions")]
struct Cli {
    /// Path to a TOML config file (default: $RT_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question
    Ask {
        question: String,

        /// JSON file holding the conversation context; read before and
        /// rewritten after the turn
        #[arg(long)]
        context: Option<PathBuf>,

        /// Print the structured outcome instead of a sentence
        #[arg(long)]
        json: bool,
    },

    /// Interactive session over stdin
    Chat,

    /// Explain a metric by name or alias
    Explain { metric: String },

    /// Start the HTTP server
    Serve {
        /// Address to listen on (overrides the config file)
        #[arg(long)]
        bind: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn load_dataset(config: &Config) -> Result<Dataset> {
    load_csv(&config.csv_path)
        .with_context(|| format!("failed to load {}", config.csv_path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("failed to load config")?;

    match &cli.command {
        Commands::Ask {
            question,
            context,
            json,
        } => cmd_ask(&config, question, context.as_deref(), *json).await,
        Commands::Chat => cmd_chat(&config).await,
        Commands::Explain { metric } => cmd_explain(metric),
        Commands::Serve { bind } => cmd_serve(config.clone(), bind.as_deref()).await,
    }
}

fn read_context(path: &Path) -> Result<ConversationState> {
    if !path.exists() {
        return Ok(ConversationState::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(ConversationState::default());
    }
    serde_json::from_str(&content).with_context(|| format!("invalid context in {}", path.display()))
}

async fn cmd_ask(config: &Config, question: &str, context: Option<&Path>, json: bool) -> Result<()> {
    let dataset = load_dataset(config)?;
    let parser = Parser::from_config(&config.parser)?;
    let engine = Engine::new(&dataset, IsoDate::today());

    let state = match context {
        Some(path) => read_context(path)?,
        None => ConversationState::default(),
    };
    let result = parser.answer(&engine, question, &state).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.outcome)?);
    } else {
        println!("{}", narrate(&result.outcome));
    }

    if let Some(path) = context {
        std::fs::write(path, serde_json::to_string_pretty(&result.state)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    if result.outcome.is_error() {
        std::process::exit(2);
    }
    Ok(())
}

async fn cmd_chat(config: &Config) -> Result<()> {
    let dataset = load_dataset(config)?;
    let parser = Parser::from_config(&config.parser)?;
    let engine = Engine::new(&dataset, IsoDate::today());
    let mut state = ConversationState::default();

    println!("Ask about a patient's metrics. Type 'reset' to clear context, 'quit' to leave.");
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "quit" | "exit") {
            break;
        }
        let result = parser.answer(&engine, question, &state).await;
        let tag = if result.outcome.is_error() { "[BLOCKED] " } else { "" };
        writeln!(stdout, "\n{tag}{}\n", narrate(&result.outcome))?;
        stdout.flush()?;
        state = result.state;
    }
    Ok(())
}

fn cmd_explain(name: &str) -> Result<()> {
    let Some(metric) = Metric::from_name_or_alias(name) else {
        let known: Vec<&str> = Metric::ALL.iter().map(|m| m.column()).collect();
        bail!("unknown metric '{name}' (known: {})", known.join(", "));
    };
    println!("{}", narrate_definition(metric));
    Ok(())
}

async fn cmd_serve(config: Config, bind: Option<&str>) -> Result<()> {
    let dataset = load_dataset(&config)?;
    let parser = Parser::from_config(&config.parser)?;
    let bind = bind.unwrap_or(&config.server.bind).to_string();
    tracing::info!(rows = dataset.len(), "starting server");
    server::serve(Arc::new(server::AppState { dataset, parser }), &bind).await
}

//! Structured question parsing, local or through an OpenAI-compatible
//! chat-completions endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use rt_core::constants::{MISSING, RETURN_COLUMNS};
use rt_core::{
    ConversationState, DeterministicParser, Engine, Metric, QueryError, QueryParser, RawQuery,
    Step, TurnResult,
};
use rt_store::{ParserBackend, ParserConfig};
use serde::Deserialize;

fn system_prompt() -> String {
    let metrics: Vec<&str> = Metric::ALL.iter().map(|m| m.column()).collect();
    let columns = serde_json::to_string(&RETURN_COLUMNS).unwrap_or_default();
    format!(
        r#"You are a strict query generator for a medical data CSV.
You MUST output ONLY ONE valid JSON object and NOTHING ELSE.

Rules:
- Do NOT answer the question.
- Do NOT include any numbers from the dataset.
- Only generate JSON that matches this action: "get_metric_timeseries".
- metric must be EXACTLY one of: {metrics:?}
- If the user uses an alias, map it to a valid metric name:
  - "smoothness" or "sparc" -> "average_sparc"
  - "range of motion" or "rom" -> "area"
  - "efficiency" -> "avg_efficiency"
  - "force" or "strength" -> "avg_f_patient"
  - "session duration" or "how long" -> "timestampms"
- patient must be the exact digits (e.g., "46") if mentioned.
- If session is null, date_start must be present. date_end may be "{MISSING}" for open-ended queries like "since <date>".
- If a session is specified and the question does not include dates, set date_start and date_end to "{MISSING}".
- return_columns must be exactly: {columns}.
- If the question mentions a game like "game0" or "game3", set "game" to that exact string. Otherwise set "game" to null. Do NOT guess the game.
- If the question mentions a session like "session_1", set "session" to that exact string. Otherwise set "session" to null. Do NOT guess the session.
- If the question uses relative session language (next/previous/latest/first), set "session" to null.
- If the question mentions MORE THAN ONE game, set "game" to "__MULTI__".
- If the question mentions MORE THAN ONE session, set "session" to "__MULTI__".

If the question is missing patient or metric, output:
{{"action":"get_metric_timeseries","patient":"{MISSING}","metric":"{MISSING}","date_start":"{MISSING}","date_end":"{MISSING}","game":null,"session":null,"return_columns":{columns}}}"#
    )
}

/// Accept exactly one JSON object, optionally wrapped in a code fence.
pub fn extract_json_strict(text: &str) -> std::result::Result<&str, QueryError> {
    let mut text = text.trim();
    if let Some(fenced) = text.strip_prefix("```") {
        let body = fenced.split_once('\n').map_or("", |(_, rest)| rest);
        text = body.trim_end().strip_suffix("```").unwrap_or(body).trim();
    }
    if text.starts_with('{') && text.ends_with('}') {
        Ok(text)
    } else {
        Err(QueryError::MalformedParserOutput(
            "model did not return a single JSON object".to_string(),
        ))
    }
}

pub fn decode_reply(content: &str) -> std::result::Result<RawQuery, QueryError> {
    let json = extract_json_strict(content)?;
    serde_json::from_str(json).map_err(|e| QueryError::MalformedParserOutput(e.to_string()))
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

pub struct RemoteParser {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl RemoteParser {
    pub fn new(config: &ParserConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    async fn complete(&self, question: &str) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": system_prompt()},
                {"role": "user", "content": question},
            ],
        });
        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let completion: Completion = request
            .send()
            .await
            .context("parser request failed")?
            .error_for_status()
            .context("parser endpoint returned an error")?
            .json()
            .await
            .context("parser reply was not a chat completion")?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("parser reply had no choices")
    }

    pub async fn parse(&self, question: &str) -> std::result::Result<RawQuery, QueryError> {
        match self.complete(question).await {
            Ok(content) => decode_reply(&content),
            Err(e) => {
                tracing::warn!(model = %self.model, "remote parse failed: {e:#}");
                Err(QueryError::MalformedParserOutput(format!("{e:#}")))
            }
        }
    }
}

pub enum Parser {
    Deterministic(DeterministicParser),
    Remote(RemoteParser),
}

impl Parser {
    pub fn from_config(config: &ParserConfig) -> Result<Self> {
        Ok(match config.backend {
            ParserBackend::Deterministic => Parser::Deterministic(DeterministicParser),
            ParserBackend::Remote => Parser::Remote(RemoteParser::new(config)?),
        })
    }

    pub async fn parse(&self, question: &str) -> std::result::Result<RawQuery, QueryError> {
        match self {
            Parser::Deterministic(p) => p.parse(question),
            Parser::Remote(p) => p.parse(question).await,
        }
    }

    /// Run one turn, calling the parser only when the engine asks for it.
    pub async fn answer(
        &self,
        engine: &Engine<'_>,
        question: &str,
        state: &ConversationState,
    ) -> TurnResult {
        match engine.begin(question, state) {
            Step::Done(result) => result,
            Step::NeedsParse(pending) => {
                let raw = self.parse(pending.question()).await;
                let result = pending.finish(raw);
                tracing::debug!(outcome = result.outcome.type_name(), "turn routed");
                result
            }
        }
    }
}

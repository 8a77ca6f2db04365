//! HTTP transport: `POST /chat` runs one turn, `GET /health` reports readiness.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use rt_core::{ConversationState, Dataset, Engine, IsoDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::llm::Parser;
use crate::narrate::narrate;

pub struct AppState {
    pub dataset: Dataset,
    pub parser: Parser,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub answer: String,
    pub data: Value,
    pub context: ConversationState,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A context the client mangled is treated as no context at all.
fn decode_context(context: Option<Value>) -> ConversationState {
    match context.map(serde_json::from_value::<ConversationState>) {
        Some(Ok(state)) => state,
        Some(Err(e)) => {
            tracing::warn!("ignoring unreadable context: {e}");
            ConversationState::default()
        }
        None => ConversationState::default(),
    }
}

async fn chat(State(app): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Json<ChatResponse> {
    let state = decode_context(req.context);
    let engine = Engine::new(&app.dataset, IsoDate::today());
    let result = app.parser.answer(&engine, &req.message, &state).await;

    let data = match serde_json::to_value(&result.outcome) {
        Ok(mut value) => value.get_mut("data").map(Value::take).unwrap_or(Value::Null),
        Err(e) => {
            tracing::warn!("failed to serialize outcome: {e}");
            Value::Null
        }
    };
    Json(ChatResponse {
        kind: result.outcome.type_name(),
        answer: narrate(&result.outcome),
        data,
        context: result.state,
    })
}

async fn health(State(app): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "rows": app.dataset.len(),
    }))
}

pub async fn serve(state: Arc<AppState>, bind: &str) -> anyhow::Result<()> {
    use anyhow::Context;

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .context("server error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use rt_core::{Cell, DatasetBuilder, DeterministicParser, Metric};
    use tower::ServiceExt;

    fn app() -> Router {
        let dataset = DatasetBuilder::with_metrics(&[Metric::Area])
            .row("2022-03-10", "46", "game0", "session_1", vec![Cell::Number(0.10)])
            .row("2022-03-12", "46", "game0", "session_2", vec![Cell::Number(0.12)])
            .build();
        router(Arc::new(AppState {
            dataset,
            parser: Parser::Deterministic(DeterministicParser),
        }))
    }

    async fn post_chat(app: Router, body: Value) -> Value {
        let response = app
            .oneshot(
                Request::post("/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["rows"], 2);
    }

    #[tokio::test]
    async fn test_chat_threads_context() {
        let first = post_chat(
            app(),
            serde_json::json!({"message": "area for patient 46 in game0 session 1"}),
        )
        .await;
        assert_eq!(first["type"], "point");
        assert_eq!(first["data"]["point"]["value"], 0.1);
        assert!(first["answer"].as_str().unwrap().contains("0.1000"));

        let second = post_chat(
            app(),
            serde_json::json!({"message": "and the next session?", "context": first["context"]}),
        )
        .await;
        assert_eq!(second["type"], "point");
        assert_eq!(second["data"]["point"]["session"], "session_2");
    }

    #[tokio::test]
    async fn test_chat_error_keeps_context() {
        let body = post_chat(
            app(),
            serde_json::json!({"message": "what about area?", "context": {"bogus": true}}),
        )
        .await;
        assert_eq!(body["type"], "error");
        assert_eq!(body["data"]["kind"], "precondition");
        assert!(body["context"]["last_query"].is_null());
    }
}

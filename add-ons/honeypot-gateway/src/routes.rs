//! HTTP surface: `/honeypot` plus liveness/readiness routes.
//!
//! Evaluation-mode contract: the honeypot route never returns a non-200
//! except the 401 auth failure. Every other failure — oversized body, bad
//! JSON, validation, internal errors — comes back as HTTP 200 with
//! `{"status":"error","reply":...}`.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use honeypot_core::sanitize::{sanitize_text, validate_message_text, validate_session_id};
use honeypot_core::Engine;

pub struct AppState {
    pub engine: Arc<Engine>,
}

#[derive(Serialize)]
struct HoneypotResponse {
    status: &'static str,
    reply: String,
}

fn success(reply: impl Into<String>) -> Response {
    Json(HoneypotResponse {
        status: "success",
        reply: reply.into(),
    })
    .into_response()
}

fn error_reply(reply: impl Into<String>) -> Response {
    Json(HoneypotResponse {
        status: "error",
        reply: reply.into(),
    })
    .into_response()
}

pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ready", get(ready))
        .route("/health", get(health))
        .route("/honeypot", post(honeypot))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Agentic Honeypot API",
        "status": "ok",
        "honeypot": "POST /honeypot",
        "health": "GET /health",
    }))
}

async fn ready() -> Json<Value> {
    Json(json!({"ready": "true", "service": "honeypot"}))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "honeypot",
        "store": state.engine.store_mode(),
    }))
}

async fn honeypot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let settings = state.engine.settings();
    let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();

    // Auth first: the only non-200 this route produces.
    let provided = headers
        .get(settings.api_key_header.as_str())
        .and_then(|v| v.to_str().ok());
    if provided != Some(settings.api_key.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid or missing API key"})),
        )
            .into_response();
    }

    // Size guard, from the declared length where present, before any parse.
    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.unwrap_or(body.len()) > settings.max_request_body_size
        || body.len() > settings.max_request_body_size
    {
        return error_reply("Request too large");
    }

    if body.is_empty() {
        return error_reply("Request body is required");
    }
    let parsed: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return error_reply("Invalid JSON in request body"),
    };
    if !parsed.is_object() {
        return error_reply("Request body must be JSON object");
    }

    let normalized = match crate::request::normalize_request(&parsed) {
        Ok(n) => n,
        Err(reply) => {
            tracing::warn!(%request_id, "request normalization rejected body");
            return error_reply(reply);
        }
    };

    if !validate_session_id(&normalized.session_id) {
        return error_reply("Invalid session ID");
    }
    if !validate_message_text(&normalized.message.text) {
        return error_reply("Invalid message text");
    }
    if sanitize_text(&normalized.message.text).is_empty() {
        return success("I didn't understand. Can you repeat?");
    }

    let session_id = normalized.session_id.clone();
    match state
        .engine
        .handle_turn(&session_id, normalized.message, normalized.history)
        .await
    {
        Ok(outcome) => {
            // Extraction and lifecycle run after the reply goes out.
            if let Some(work) = outcome.deferred {
                let engine = Arc::clone(&state.engine);
                tokio::spawn(async move {
                    engine.run_deferred(work).await;
                });
            }

            let elapsed = start.elapsed().as_secs_f64();
            if elapsed > settings.max_response_time_secs {
                tracing::warn!(%request_id, %session_id, elapsed, "response exceeded target time");
            } else {
                tracing::info!(%request_id, %session_id, elapsed, "turn completed");
            }
            success(outcome.reply)
        }
        Err(e) => {
            tracing::error!(%request_id, %session_id, error = %e, "honeypot turn failed");
            error_reply("Something went wrong. Please try again.")
        }
    }
}

//! Gateway entry point: env, tracing, store selection, serve.

use std::sync::Arc;

use honeypot_core::llm::LlmBridge;
use honeypot_core::store::{MemorySessionStore, SessionStore, SledSessionStore};
use honeypot_core::{Engine, Settings};
use honeypot_gateway::{build_app, AppState};

#[tokio::main]
async fn main() {
    // Load .env first: all keys stay backend-side.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = Settings::from_env();

    let store: Arc<dyn SessionStore> =
        match SledSessionStore::open(&settings.session_db_path, settings.session_ttl_secs) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(
                    path = %settings.session_db_path,
                    error = %e,
                    "sled unavailable, using volatile in-memory sessions"
                );
                Arc::new(MemorySessionStore::new())
            }
        };

    let llm = LlmBridge::from_key(settings.llm_api_key.as_deref());
    if llm.is_none() {
        tracing::warn!("OPENROUTER_API_KEY not set: detection, extraction, and persona replies run on local fallbacks only");
    }

    let engine = Arc::new(Engine::new(settings, store, llm));
    let app = build_app(Arc::new(AppState { engine }));

    let bind_addr =
        std::env::var("HONEYPOT_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%bind_addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!(%bind_addr, "honeypot gateway listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}

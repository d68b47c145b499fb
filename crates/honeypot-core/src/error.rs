//! Error taxonomy for the honeypot core.
//!
//! Components below the engine degrade to local fallbacks wherever one
//! exists, so most of these variants are logged and absorbed rather than
//! propagated to the HTTP surface.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HoneypotError {
    /// Language-model call failed (timeout, non-2xx, unparsable body).
    /// Callers fall back to keyword / template logic.
    #[error("llm call failed: {0}")]
    Llm(String),

    /// Session store unavailable or corrupt record.
    #[error("session store error: {0}")]
    Store(String),

    /// Session state serialization failed.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// All callback attempts exhausted. Logged and swallowed by the caller.
    #[error("callback delivery failed after {attempts} attempts")]
    CallbackExhausted { attempts: u32 },
}

impl From<sled::Error> for HoneypotError {
    fn from(e: sled::Error) -> Self {
        HoneypotError::Store(e.to_string())
    }
}

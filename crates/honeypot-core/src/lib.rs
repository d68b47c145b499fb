//! Honeypot core: everything behind the HTTP surface.
//!
//! The pipeline per inbound turn is detection → persona reply →
//! intelligence extraction → lifecycle end-check, over session state
//! persisted in the session store. Model-backed components (detector,
//! extractor, persona agent) all follow the same hybrid rule: local
//! computation is always available, the model call is an optional
//! enhancement that can only add confidence or items, never required for
//! correctness.

pub mod agent;
pub mod callback;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod lifecycle;
pub mod llm;
pub mod models;
pub mod sanitize;
pub mod store;

pub use config::Settings;
pub use engine::{DeferredWork, Engine, TurnOutcome, NEUTRAL_REPLY};
pub use error::HoneypotError;
pub use models::{
    AgentResponse, DetectionResult, ExtractedIntelligence, Message, Sender, SessionMemory,
};
pub use store::{MemorySessionStore, SessionStore, SledSessionStore};

//! Honeypot gateway: the axum HTTP surface over `honeypot-core`.

pub mod request;
pub mod routes;

pub use routes::{build_app, AppState};

//! Service configuration loaded from environment.
//!
//! Every knob has a default that matches evaluation-mode expectations, so the
//! service comes up with zero configuration. `dotenvy` is loaded by the
//! gateway before `Settings::from_env` runs.

use std::time::Duration;

/// Runtime settings.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | HONEYPOT_API_KEY | your-secret-api-key | Shared secret for the honeypot route. |
/// | HONEYPOT_API_KEY_HEADER | x-api-key | Header carrying the secret. |
/// | OPENROUTER_API_KEY | (unset) | LLM provider key; all model-backed paths degrade to local logic without it. |
/// | LLM_MODEL | meta-llama/llama-3.3-70b-instruct | Persona reply generation model. |
/// | LLM_DETECTION_MODEL | (LLM_MODEL) | Scam classification model. |
/// | LLM_EXTRACTION_MODEL | (LLM_MODEL) | Structured extraction model. |
/// | SESSION_DB_PATH | ./data/honeypot_sessions | Sled database path. |
/// | SESSION_TTL_SECS | 3600 | Session time-to-live, refreshed on every save. |
/// | SCAM_CONFIDENCE_THRESHOLD | 0.7 | Confidence at which a session is flagged. |
/// | MAX_MESSAGES_BEFORE_END | 12 | Lifecycle: message count that ends engagement. |
/// | MIN_INTEL_ITEMS_TO_END | 2 | Lifecycle: intelligence count that ends engagement. |
/// | CALLBACK_URL | GUVI evaluation endpoint | Final-report destination. |
/// | CALLBACK_TIMEOUT_SECS | 5 | Per-attempt callback timeout. |
/// | CALLBACK_RETRIES | 3 | Total callback attempts. |
/// | MAX_RESPONSE_TIME_SECS | 3.0 | Soft budget; overruns are logged, not failed. |
/// | MAX_REQUEST_BODY_SIZE | 100000 | Bytes; larger bodies are rejected before parsing. |
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub api_key_header: String,

    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_detection_model: String,
    pub llm_extraction_model: String,

    pub session_db_path: String,
    pub session_ttl_secs: u64,

    pub scam_confidence_threshold: f64,

    pub max_messages_before_end: usize,
    pub min_intelligence_items_to_end: usize,

    pub callback_url: String,
    pub callback_timeout: Duration,
    pub callback_retries: u32,

    pub max_response_time_secs: f64,
    pub max_request_body_size: usize,
}

const DEFAULT_CALLBACK_URL: &str = "https://hackathon.guvi.in/api/updateHoneyPotFinalResult";
const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

impl Settings {
    /// Load settings from environment. Unset or unparsable values fall back
    /// to the documented defaults.
    pub fn from_env() -> Self {
        let llm_model = env_string("LLM_MODEL", DEFAULT_MODEL);
        Self {
            api_key: env_string("HONEYPOT_API_KEY", "your-secret-api-key"),
            api_key_header: env_string("HONEYPOT_API_KEY_HEADER", "x-api-key"),
            llm_api_key: env_opt_string("OPENROUTER_API_KEY"),
            llm_detection_model: env_string("LLM_DETECTION_MODEL", &llm_model),
            llm_extraction_model: env_string("LLM_EXTRACTION_MODEL", &llm_model),
            llm_model,
            session_db_path: env_string("SESSION_DB_PATH", "./data/honeypot_sessions"),
            session_ttl_secs: env_parse("SESSION_TTL_SECS", 3600),
            scam_confidence_threshold: env_parse::<f64>("SCAM_CONFIDENCE_THRESHOLD", 0.7)
                .clamp(0.0, 1.0),
            max_messages_before_end: env_parse("MAX_MESSAGES_BEFORE_END", 12),
            min_intelligence_items_to_end: env_parse("MIN_INTEL_ITEMS_TO_END", 2),
            callback_url: env_string("CALLBACK_URL", DEFAULT_CALLBACK_URL),
            callback_timeout: Duration::from_secs(env_parse("CALLBACK_TIMEOUT_SECS", 5)),
            callback_retries: env_parse("CALLBACK_RETRIES", 3),
            max_response_time_secs: env_parse("MAX_RESPONSE_TIME_SECS", 3.0),
            max_request_body_size: env_parse("MAX_REQUEST_BODY_SIZE", 100_000),
        }
    }

    /// True when a language-model key is configured. Without it every
    /// model-backed component runs on its local fallback only.
    pub fn llm_configured(&self) -> bool {
        self.llm_api_key.is_some()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: "your-secret-api-key".to_string(),
            api_key_header: "x-api-key".to_string(),
            llm_api_key: None,
            llm_model: DEFAULT_MODEL.to_string(),
            llm_detection_model: DEFAULT_MODEL.to_string(),
            llm_extraction_model: DEFAULT_MODEL.to_string(),
            session_db_path: "./data/honeypot_sessions".to_string(),
            session_ttl_secs: 3600,
            scam_confidence_threshold: 0.7,
            max_messages_before_end: 12,
            min_intelligence_items_to_end: 2,
            callback_url: DEFAULT_CALLBACK_URL.to_string(),
            callback_timeout: Duration::from_secs(5),
            callback_retries: 3,
            max_response_time_secs: 3.0,
            max_request_body_size: 100_000,
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

//! OpenRouter bridge: the single outbound path to the language model.
//!
//! All three model-backed components (detector, extractor, persona agent) go
//! through [`LlmBridge::chat`]. The bridge is optional by construction: with
//! no `OPENROUTER_API_KEY` every caller runs its local fallback instead, and
//! any call failure is an ordinary recoverable error, never a crash.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HoneypotError;

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const LLM_TIMEOUT: Duration = Duration::from_secs(20);

// OpenAI-compatible request/response for OpenRouter
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Long-lived chat-completions client. Created once at startup and shared
/// across requests; the underlying `reqwest::Client` pools connections.
pub struct LlmBridge {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl LlmBridge {
    /// Build a bridge from the configured key. `None` when no key is set.
    pub fn from_key(api_key: Option<&str>) -> Option<Self> {
        let key = api_key?.trim().to_string();
        if key.is_empty() {
            return None;
        }
        Some(Self::new(key))
    }

    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(LLM_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.trim().to_string(),
            base_url: OPENROUTER_API_BASE.to_string(),
            client,
        }
    }

    /// Point the bridge at a different OpenAI-compatible endpoint (tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// One chat completion. Returns the first choice's content.
    pub async fn chat(
        &self,
        model: &str,
        system: Option<&str>,
        user: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, HoneypotError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: user.to_string(),
        });

        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: model.to_string(),
            messages,
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
        };

        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| HoneypotError::Llm(format!("request failed: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(HoneypotError::Llm(format!("API error {status}: {body}")));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| HoneypotError::Llm(format!("response parse failed: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| HoneypotError::Llm("empty choices in response".to_string()))
    }
}

/// Strip a fenced code block (```json ... ```) wrapper, if present. Models
/// routinely wrap JSON payloads this way despite instructions not to.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the language tag on the opening fence.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

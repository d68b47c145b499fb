//! Final-result delivery to the external evaluation endpoint.
//!
//! Bounded retries with a fixed inter-attempt delay. Failure here never
//! propagates to the HTTP caller: the reporter returns `false` after the
//! last attempt and the engine logs and moves on.

use std::time::Duration;

use serde::Serialize;

use crate::config::Settings;
use crate::models::ExtractedIntelligence;

const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Serialize)]
struct CallbackPayload<'a> {
    #[serde(rename = "sessionId")]
    session_id: &'a str,
    #[serde(rename = "scamDetected")]
    scam_detected: bool,
    #[serde(rename = "totalMessagesExchanged")]
    total_messages_exchanged: usize,
    #[serde(rename = "extractedIntelligence")]
    extracted_intelligence: &'a ExtractedIntelligence,
    #[serde(rename = "agentNotes")]
    agent_notes: &'a str,
}

pub struct CallbackReporter {
    url: String,
    retries: u32,
    retry_delay: Duration,
    client: reqwest::Client,
}

impl CallbackReporter {
    pub fn new(settings: &Settings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.callback_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: settings.callback_url.clone(),
            retries: settings.callback_retries.max(1),
            retry_delay: RETRY_DELAY,
            client,
        }
    }

    /// Shorter inter-attempt delay, for tests.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Deliver the final summary. `true` on the first 2xx; `false` once all
    /// attempts are exhausted. Never panics, never propagates.
    pub async fn report(
        &self,
        session_id: &str,
        scam_detected: bool,
        total_messages: usize,
        extracted_intelligence: &ExtractedIntelligence,
        agent_notes: &str,
    ) -> bool {
        let notes = if agent_notes.is_empty() {
            "Engagement completed"
        } else {
            agent_notes
        };
        let payload = CallbackPayload {
            session_id,
            scam_detected,
            total_messages_exchanged: total_messages,
            extracted_intelligence,
            agent_notes: notes,
        };

        for attempt in 1..=self.retries {
            match self.client.post(&self.url).json(&payload).send().await {
                Ok(res) => {
                    let status = res.status();
                    tracing::info!(session_id, %status, attempt, "callback response");
                    if status.is_success() {
                        return true;
                    }
                }
                Err(e) => {
                    tracing::warn!(session_id, attempt, error = %e, "callback attempt failed");
                }
            }
            if attempt < self.retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        false
    }
}

//! Engagement lifecycle: Engaging → Ended.
//!
//! A session ends when it has run long enough or yielded enough
//! intelligence. Ending a scam session fires the final callback exactly
//! once (`ended` gates re-triggering); ending a non-scam session is a
//! no-op — nothing is reported for sessions that were never flagged.

use crate::callback::CallbackReporter;
use crate::config::Settings;
use crate::models::SessionMemory;

pub struct LifecycleManager<'a> {
    settings: &'a Settings,
    reporter: &'a CallbackReporter,
}

impl<'a> LifecycleManager<'a> {
    pub fn new(settings: &'a Settings, reporter: &'a CallbackReporter) -> Self {
        Self { settings, reporter }
    }

    /// Either end condition: enough turns, or enough intelligence.
    pub fn should_end(&self, memory: &SessionMemory) -> bool {
        memory.message_count >= self.settings.max_messages_before_end
            || memory.extracted_intelligence.total_items()
                >= self.settings.min_intelligence_items_to_end
    }

    /// Run the end-check. Marks the session ended and fires the callback
    /// when conditions are met on a flagged session. Returns true when the
    /// callback was delivered.
    pub async fn check_and_end(&self, memory: &mut SessionMemory) -> bool {
        if memory.ended || !self.should_end(memory) {
            return false;
        }

        // No report for sessions never flagged. Not marked ended: a late
        // detection can still report once the flag flips.
        if !memory.scam_detected {
            tracing::info!(session_id = %memory.session_id, "skipping callback - scam not detected");
            return false;
        }

        // One report per session, even if delivery fails: retries already
        // happened inside the reporter.
        memory.ended = true;
        let delivered = self
            .reporter
            .report(
                &memory.session_id,
                memory.scam_detected,
                memory.message_count,
                &memory.extracted_intelligence,
                &memory.agent_notes,
            )
            .await;
        if delivered {
            tracing::info!(session_id = %memory.session_id, "engagement ended, callback sent");
        } else {
            tracing::warn!(session_id = %memory.session_id, "engagement ended, callback delivery failed");
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedIntelligence;

    fn manager_parts() -> (Settings, CallbackReporter) {
        let mut settings = Settings::default();
        // Unroutable port so accidental sends fail fast.
        settings.callback_url = "http://127.0.0.1:9/cb".to_string();
        settings.callback_retries = 1;
        let reporter = CallbackReporter::new(&settings);
        (settings, reporter)
    }

    #[test]
    fn ends_on_message_count_or_intel_count() {
        let (settings, reporter) = manager_parts();
        let lifecycle = LifecycleManager::new(&settings, &reporter);

        let mut memory = SessionMemory::new("s1");
        assert!(!lifecycle.should_end(&memory));

        memory.message_count = settings.max_messages_before_end;
        assert!(lifecycle.should_end(&memory));

        memory.message_count = 1;
        memory.extracted_intelligence = ExtractedIntelligence {
            upi_ids: vec!["a@upi".into(), "b@upi".into()],
            ..Default::default()
        };
        assert!(lifecycle.should_end(&memory));
    }

    #[tokio::test]
    async fn non_scam_session_skips_callback() {
        let (settings, reporter) = manager_parts();
        let lifecycle = LifecycleManager::new(&settings, &reporter);

        let mut memory = SessionMemory::new("s1");
        memory.message_count = 12;
        memory.scam_detected = false;
        assert!(!lifecycle.check_and_end(&mut memory).await);
        assert!(!memory.ended);
    }

    #[tokio::test]
    async fn ended_session_never_re_reports() {
        let (settings, reporter) = manager_parts();
        let lifecycle = LifecycleManager::new(&settings, &reporter);

        let mut memory = SessionMemory::new("s1");
        memory.message_count = 12;
        memory.scam_detected = true;
        memory.ended = true;
        assert!(!lifecycle.check_and_end(&mut memory).await);
    }
}

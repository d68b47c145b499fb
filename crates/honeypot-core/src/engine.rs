//! The per-turn pipeline: detection → persona reply → extraction →
//! lifecycle, over mutable session state.
//!
//! One [`Engine`] is built at startup and shared across requests; it holds
//! the store, the LLM bridge, and the callback reporter. A turn runs in two
//! halves: the synchronous half produces the reply and persists the session,
//! and the deferred half (extraction + lifecycle end-check) re-loads the
//! session from the store to get the freshest copy before writing back —
//! eventual consistency, not strict ordering, with later inbound turns.

use std::sync::Arc;

use crate::agent::PersonaAgent;
use crate::callback::CallbackReporter;
use crate::config::Settings;
use crate::detector::Detector;
use crate::error::HoneypotError;
use crate::extractor::Extractor;
use crate::lifecycle::LifecycleManager;
use crate::llm::LlmBridge;
use crate::models::{Message, Sender, SessionMemory};
use crate::sanitize::sanitize_text;
use crate::store::SessionStore;

pub const NEUTRAL_REPLY: &str = "I'm not sure what you mean. Can you explain?";

/// Outcome of the synchronous half of a turn.
pub struct TurnOutcome {
    pub reply: String,
    /// Present when the scam path ran and deferred extraction + lifecycle
    /// work should be scheduled for this session.
    pub deferred: Option<DeferredWork>,
}

/// Snapshot handed to the deferred worker. The worker re-loads the session
/// from the store rather than trusting this snapshot's state.
pub struct DeferredWork {
    pub session_id: String,
    pub history: Vec<Message>,
    pub latest_text: String,
}

pub struct Engine {
    settings: Settings,
    store: Arc<dyn SessionStore>,
    llm: Option<LlmBridge>,
    reporter: CallbackReporter,
}

impl Engine {
    pub fn new(settings: Settings, store: Arc<dyn SessionStore>, llm: Option<LlmBridge>) -> Self {
        let reporter = CallbackReporter::new(&settings);
        Self {
            settings,
            store,
            llm,
            reporter,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store_mode(&self) -> &'static str {
        self.store.mode()
    }

    /// The synchronous half of one inbound turn.
    ///
    /// Sequencing: load-or-create session → append supplied history and the
    /// sanitized current message → detect (if not yet flagged) → persona
    /// reply (if flagged) or neutral reply → persist → return. Persistence
    /// happens unconditionally on whatever partial progress was made.
    pub async fn handle_turn(
        &self,
        session_id: &str,
        message: Message,
        supplied_history: Vec<Message>,
    ) -> Result<TurnOutcome, HoneypotError> {
        let mut memory = match self.store.load(session_id).await {
            Ok(Some(memory)) => memory,
            Ok(None) => SessionMemory::new(session_id),
            Err(e) => {
                // Store read failure degrades to a fresh session rather than
                // failing the turn; the save below may still succeed.
                tracing::warn!(session_id, error = %e, "session load failed, starting fresh");
                SessionMemory::new(session_id)
            }
        };

        let sanitized_text = sanitize_text(&message.text);
        memory.conversation_history.extend(supplied_history);
        memory.conversation_history.push(Message::new(
            message.sender,
            sanitized_text.clone(),
            message.timestamp.clone(),
        ));

        if !memory.scam_detected {
            let history_before = &memory.conversation_history[..memory.conversation_history.len() - 1];
            let detector = Detector::new(&self.settings, self.llm.as_ref());
            let detection = detector.detect(&sanitized_text, history_before).await;
            tracing::info!(
                session_id,
                confidence = detection.confidence,
                is_scam = detection.is_scam,
                "detection pass"
            );
            if detection.confidence >= self.settings.scam_confidence_threshold {
                memory.scam_detected = true;
                memory.agent_notes =
                    build_agent_notes(&memory.agent_notes, &detection.reason, &sanitized_text, 0);
            }
        }

        memory.message_count = memory.conversation_history.len();

        let mut deferred = None;
        let reply = if memory.scam_detected {
            let agent = PersonaAgent::new(&self.settings, self.llm.as_ref());
            let history_before = memory.conversation_history
                [..memory.conversation_history.len() - 1]
                .to_vec();
            let response = agent
                .reply(
                    &sanitized_text,
                    &history_before,
                    &memory.extracted_intelligence,
                    memory.message_count,
                    &memory.agent_notes,
                )
                .await;
            tracing::debug!(
                session_id,
                engagement_score = response.engagement_score,
                "persona reply generated"
            );

            memory.conversation_history.push(Message::new(
                Sender::User,
                response.reply.clone(),
                message.timestamp.clone(),
            ));
            memory.message_count = memory.conversation_history.len();

            // Extraction and the lifecycle end-check run after the reply is
            // returned; hand the worker the pre-reply history snapshot.
            deferred = Some(DeferredWork {
                session_id: memory.session_id.clone(),
                history: history_before,
                latest_text: sanitized_text.clone(),
            });

            response.reply
        } else {
            NEUTRAL_REPLY.to_string()
        };

        if let Err(e) = self.store.save(&memory).await {
            tracing::warn!(session_id, error = %e, "session save failed");
        }

        Ok(TurnOutcome { reply, deferred })
    }

    /// The deferred half: re-load the session, extract intelligence, rebuild
    /// notes, run the lifecycle end-check, save. Any failure is logged and
    /// absorbed — this runs after the caller already has its reply.
    pub async fn run_deferred(&self, work: DeferredWork) {
        let mut memory = match self.store.load(&work.session_id).await {
            Ok(Some(memory)) => memory,
            Ok(None) => {
                tracing::warn!(session_id = %work.session_id, "deferred work found no session");
                return;
            }
            Err(e) => {
                tracing::warn!(session_id = %work.session_id, error = %e, "deferred session load failed");
                return;
            }
        };

        let extractor = Extractor::new(&self.settings, self.llm.as_ref());
        memory.extracted_intelligence = extractor
            .extract(&work.history, &work.latest_text, &memory.extracted_intelligence)
            .await;

        let intel_count = memory.extracted_intelligence.total_items();
        memory.agent_notes = build_agent_notes(&memory.agent_notes, "", &work.latest_text, intel_count);

        let lifecycle = LifecycleManager::new(&self.settings, &self.reporter);
        lifecycle.check_and_end(&mut memory).await;

        if let Err(e) = self.store.save(&memory).await {
            tracing::warn!(session_id = %work.session_id, error = %e, "deferred session save failed");
        }
    }
}

/// Summarize scammer behavior for the final report: detection reason plus
/// payment/link/OTP cues sniffed from the latest text. Keeps the last 5
/// segments.
fn build_agent_notes(
    existing_notes: &str,
    detector_reason: &str,
    latest_text: &str,
    intel_count: usize,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !existing_notes.is_empty() {
        parts.extend(existing_notes.split("; ").map(str::to_string));
    }
    if !detector_reason.is_empty() {
        let cut: String = detector_reason.chars().take(100).collect();
        parts.push(format!("Detection: {cut}"));
    }
    let lower = latest_text.to_lowercase();
    if lower.contains("upi") || lower.contains("bank") {
        parts.push("Requested payment/account details".to_string());
    }
    if lower.contains("link") || lower.contains("http") {
        parts.push("Shared/solicited link".to_string());
    }
    if lower.contains("otp") || lower.contains("pin") {
        parts.push("Requested OTP/PIN".to_string());
    }
    if intel_count > 0 {
        parts.push(format!("Extracted {intel_count} intelligence items"));
    }
    let start = parts.len().saturating_sub(5);
    parts[start..].join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySessionStore;

    fn engine() -> Engine {
        let mut settings = Settings::default();
        settings.callback_url = "http://127.0.0.1:9/cb".to_string();
        settings.callback_retries = 1;
        Engine::new(settings, Arc::new(MemorySessionStore::new()), None)
    }

    fn scammer_msg(text: &str) -> Message {
        Message::new(Sender::Scammer, text, "2026-01-01T00:00:00Z")
    }

    #[tokio::test]
    async fn scam_turn_flags_session_and_replies_in_persona() {
        let e = engine();
        let outcome = e
            .handle_turn("s1", scammer_msg("Your account will be blocked, verify UPI now"), vec![])
            .await
            .unwrap();
        assert!(!outcome.reply.is_empty());
        assert_ne!(outcome.reply, NEUTRAL_REPLY);
        assert!(outcome.deferred.is_some());

        let memory = e.store.load("s1").await.unwrap().unwrap();
        assert!(memory.scam_detected);
        // Inbound message plus the honeypot's reply.
        assert_eq!(memory.message_count, 2);
        assert!(memory.agent_notes.contains("Detection:"));
    }

    #[tokio::test]
    async fn benign_turn_gets_neutral_reply() {
        let e = engine();
        let outcome = e.handle_turn("s1", scammer_msg("hello"), vec![]).await.unwrap();
        assert_eq!(outcome.reply, NEUTRAL_REPLY);
        assert!(outcome.deferred.is_none());

        let memory = e.store.load("s1").await.unwrap().unwrap();
        assert!(!memory.scam_detected);
        assert_eq!(memory.message_count, 1);
    }

    #[tokio::test]
    async fn scam_flag_is_monotonic_across_turns() {
        let e = engine();
        e.handle_turn("s1", scammer_msg("Your account will be blocked, verify UPI now"), vec![])
            .await
            .unwrap();
        e.handle_turn("s1", scammer_msg("nice weather today"), vec![])
            .await
            .unwrap();
        let memory = e.store.load("s1").await.unwrap().unwrap();
        assert!(memory.scam_detected);
    }

    #[tokio::test]
    async fn flagged_session_keeps_engaging_on_benign_followups() {
        let e = engine();
        e.handle_turn("s1", scammer_msg("Your account will be blocked, verify UPI now"), vec![])
            .await
            .unwrap();
        let outcome = e.handle_turn("s1", scammer_msg("so, ready?"), vec![]).await.unwrap();
        assert_ne!(outcome.reply, NEUTRAL_REPLY);
        assert!(outcome.deferred.is_some());
    }

    #[tokio::test]
    async fn supplied_history_is_appended_before_current_message() {
        let e = engine();
        let history = vec![
            scammer_msg("hello sir"),
            Message::new(Sender::User, "who is this?", "t1"),
        ];
        e.handle_turn("s1", scammer_msg("hi again"), history).await.unwrap();
        let memory = e.store.load("s1").await.unwrap().unwrap();
        assert_eq!(memory.message_count, 3);
        assert_eq!(memory.conversation_history[0].text, "hello sir");
        assert_eq!(memory.conversation_history[2].text, "hi again");
    }

    #[tokio::test]
    async fn deferred_work_extracts_and_persists() {
        let e = engine();
        let outcome = e
            .handle_turn(
                "s1",
                scammer_msg("Account blocked! verify upi now: send to 9876543210 or pay to scammer@upi"),
                vec![],
            )
            .await
            .unwrap();
        let work = outcome.deferred.unwrap();
        e.run_deferred(work).await;

        let memory = e.store.load("s1").await.unwrap().unwrap();
        assert!(memory
            .extracted_intelligence
            .phone_numbers
            .contains(&"+919876543210".to_string()));
        assert!(memory
            .extracted_intelligence
            .upi_ids
            .contains(&"scammer@upi".to_string()));
        assert!(memory.agent_notes.contains("intelligence items"));
    }

    #[tokio::test]
    async fn empty_message_still_counts_and_persists() {
        let e = engine();
        let outcome = e.handle_turn("s1", scammer_msg("   "), vec![]).await.unwrap();
        assert_eq!(outcome.reply, NEUTRAL_REPLY);
        let memory = e.store.load("s1").await.unwrap().unwrap();
        assert_eq!(memory.message_count, 1);
        assert!(!memory.scam_detected);
    }

    #[test]
    fn agent_notes_keep_last_five_segments() {
        let notes = build_agent_notes("a; b; c; d", "reason here", "send otp and upi via link", 3);
        let segments: Vec<&str> = notes.split("; ").collect();
        assert_eq!(segments.len(), 5);
        // Oldest segments fall off, newest cues survive.
        assert!(notes.contains("Requested OTP/PIN"));
        assert!(notes.contains("Extracted 3 intelligence items"));
        assert!(!notes.contains("a; b"));
    }

    #[test]
    fn agent_notes_sniff_cues() {
        let notes = build_agent_notes("", "Detection: foo", "click this link to verify bank upi", 0);
        assert!(notes.contains("Requested payment/account details"));
        assert!(notes.contains("Shared/solicited link"));
        assert!(!notes.contains("OTP"));
    }
}

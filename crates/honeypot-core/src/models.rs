//! Domain data model: conversation messages, extracted intelligence, and
//! per-session memory.
//!
//! Wire format notes: the five intelligence arrays serialize under camelCase
//! names (`bankAccounts`, `upiIds`, ...) because both the session store value
//! and the final callback payload use that shape.

use serde::{Deserialize, Serialize};

/// Who authored a message in the engagement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The counterpart we are engaging (the suspected scammer).
    Scammer,
    /// The honeypot persona ("user" on the wire, matching the tester format).
    User,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::Scammer => "scammer",
            Sender::User => "user",
        }
    }
}

/// One message in a conversation. Immutable once appended to history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: String,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: timestamp.into(),
        }
    }
}

/// Result of one scam-detection pass. Transient: only its effect (flipping
/// `SessionMemory::scam_detected`) is persisted.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub is_scam: bool,
    pub confidence: f64,
    pub reason: String,
}

/// Result of one persona-agent reply pass. Transient.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub reply: String,
    pub engagement_score: f64,
}

/// Structured intelligence pulled out of the conversation so far.
///
/// Each field is an insertion-ordered set: no duplicates, first-seen order
/// preserved across merges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedIntelligence {
    #[serde(rename = "bankAccounts", alias = "bank_accounts", default)]
    pub bank_accounts: Vec<String>,
    #[serde(rename = "upiIds", alias = "upi_ids", default)]
    pub upi_ids: Vec<String>,
    #[serde(rename = "phishingLinks", alias = "phishing_links", default)]
    pub phishing_links: Vec<String>,
    #[serde(rename = "phoneNumbers", alias = "phone_numbers", default)]
    pub phone_numbers: Vec<String>,
    #[serde(rename = "suspiciousKeywords", alias = "suspicious_keywords", default)]
    pub suspicious_keywords: Vec<String>,
}

fn union_ordered(existing: &[String], new: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(existing.len() + new.len());
    for v in existing.iter().chain(new.iter()) {
        if !out.iter().any(|seen| seen == v) {
            out.push(v.clone());
        }
    }
    out
}

impl ExtractedIntelligence {
    /// Per-field union with `other`, deduplicated, first-seen order preserved.
    /// Never removes an item already in `self`.
    pub fn merge(&self, other: &ExtractedIntelligence) -> ExtractedIntelligence {
        ExtractedIntelligence {
            bank_accounts: union_ordered(&self.bank_accounts, &other.bank_accounts),
            upi_ids: union_ordered(&self.upi_ids, &other.upi_ids),
            phishing_links: union_ordered(&self.phishing_links, &other.phishing_links),
            phone_numbers: union_ordered(&self.phone_numbers, &other.phone_numbers),
            suspicious_keywords: union_ordered(&self.suspicious_keywords, &other.suspicious_keywords),
        }
    }

    /// Total item count across all five categories; lifecycle threshold signal.
    pub fn total_items(&self) -> usize {
        self.bank_accounts.len()
            + self.upi_ids.len()
            + self.phishing_links.len()
            + self.phone_numbers.len()
            + self.suspicious_keywords.len()
    }
}

/// Aggregate root for one engagement, persisted between turns in the
/// session store under `honeypot:session:<session_id>`.
///
/// `scam_detected` is monotonic: once true it never reverts. `ended` gates
/// the lifecycle callback so a long-running session reports exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMemory {
    pub session_id: String,
    #[serde(default)]
    pub conversation_history: Vec<Message>,
    #[serde(default)]
    pub extracted_intelligence: ExtractedIntelligence,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default)]
    pub scam_detected: bool,
    #[serde(default)]
    pub ended: bool,
    #[serde(default)]
    pub agent_notes: String,
    #[serde(default)]
    pub created_at: String,
}

impl SessionMemory {
    /// Fresh session for a session id not yet in the store.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            conversation_history: Vec::new(),
            extracted_intelligence: ExtractedIntelligence::default(),
            message_count: 0,
            scam_detected: false,
            ended: false,
            agent_notes: String::new(),
            created_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

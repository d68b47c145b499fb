//! Intelligence extraction: regex baseline plus optional LLM structured
//! extraction, with hard validation before anything reaches the report.
//!
//! The regex pass always runs and catches machine-verifiable formats the
//! model might hallucinate; model output is merged in and then every item
//! goes through the same per-category validation, so unvalidated model
//! output never pollutes the final report.

use serde::Deserialize;

use crate::config::Settings;
use crate::llm::{strip_code_fence, LlmBridge};
use crate::models::{ExtractedIntelligence, Message};
use crate::sanitize::{
    self, extract_bank_account, extract_indian_phone, extract_upi, extract_url,
    is_valid_indian_phone, is_valid_upi, is_valid_url, sanitize_text,
};

/// Corpus prefix handed to the model; the regex pass sees the whole corpus.
const LLM_CORPUS_PREFIX: usize = 3000;

const SCAM_TERMS: &[&str] = &[
    "urgent", "verify", "immediately", "blocked", "suspended",
    "upi", "otp", "kyc", "click link", "share", "transfer",
    "prize", "winner", "claim", "account blocked",
];

/// Structured extraction payload requested from the model. Field names match
/// the callback wire format.
#[derive(Debug, Default, Deserialize)]
struct LlmExtraction {
    #[serde(rename = "bankAccounts", default)]
    bank_accounts: Vec<serde_json::Value>,
    #[serde(rename = "upiIds", default)]
    upi_ids: Vec<serde_json::Value>,
    #[serde(rename = "phishingLinks", default)]
    phishing_links: Vec<serde_json::Value>,
    #[serde(rename = "phoneNumbers", default)]
    phone_numbers: Vec<serde_json::Value>,
    #[serde(rename = "suspiciousKeywords", default)]
    suspicious_keywords: Vec<serde_json::Value>,
}

fn values_to_strings(values: Vec<serde_json::Value>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::String(s) if !s.is_empty() => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

impl From<LlmExtraction> for ExtractedIntelligence {
    fn from(raw: LlmExtraction) -> Self {
        ExtractedIntelligence {
            bank_accounts: values_to_strings(raw.bank_accounts),
            upi_ids: values_to_strings(raw.upi_ids),
            phishing_links: values_to_strings(raw.phishing_links),
            phone_numbers: values_to_strings(raw.phone_numbers),
            suspicious_keywords: values_to_strings(raw.suspicious_keywords),
        }
    }
}

fn push_unique(items: &mut Vec<String>, value: String) {
    if !value.is_empty() && !items.iter().any(|v| *v == value) {
        items.push(value);
    }
}

/// Regex-based extraction over the sanitized corpus. Always available.
fn extract_from_text(text: &str) -> ExtractedIntelligence {
    let sanitized = sanitize_text(text);
    let mut intel = ExtractedIntelligence::default();

    for m in sanitize::BANK_MASKED_RE.find_iter(&sanitized) {
        push_unique(&mut intel.bank_accounts, m.as_str().to_string());
    }
    for m in sanitize::BANK_GROUPED_RE.find_iter(&sanitized) {
        push_unique(&mut intel.bank_accounts, m.as_str().to_string());
    }
    if let Some(acc) = extract_bank_account(&sanitized) {
        push_unique(&mut intel.bank_accounts, acc);
    }

    for m in sanitize::UPI_RE.find_iter(&sanitized) {
        let val = m.as_str().to_string();
        if is_valid_upi(&val) {
            push_unique(&mut intel.upi_ids, val);
        }
    }
    if let Some(upi) = extract_upi(&sanitized) {
        push_unique(&mut intel.upi_ids, upi);
    }

    for m in sanitize::URL_RE.find_iter(&sanitized) {
        let val = m.as_str().to_string();
        if is_valid_url(&val) {
            push_unique(&mut intel.phishing_links, val);
        }
    }
    if let Some(url) = extract_url(&sanitized) {
        push_unique(&mut intel.phishing_links, url);
    }

    for phone in sanitize::scan_indian_phones(&sanitized) {
        push_unique(&mut intel.phone_numbers, phone);
    }
    if let Some(phone) = extract_indian_phone(&sanitized) {
        push_unique(&mut intel.phone_numbers, phone);
    }

    let lower = sanitized.to_lowercase();
    for term in SCAM_TERMS {
        if lower.contains(term) {
            push_unique(&mut intel.suspicious_keywords, term.to_string());
        }
    }

    intel
}

/// Drop items that fail per-category validation. Silent: invalid items
/// simply never reach the report.
fn validate(intel: ExtractedIntelligence) -> ExtractedIntelligence {
    ExtractedIntelligence {
        bank_accounts: intel.bank_accounts.into_iter().filter(|b| b.len() <= 30).collect(),
        upi_ids: intel.upi_ids.into_iter().filter(|u| is_valid_upi(u)).collect(),
        phishing_links: intel.phishing_links.into_iter().filter(|l| is_valid_url(l)).collect(),
        phone_numbers: intel
            .phone_numbers
            .into_iter()
            .filter(|p| is_valid_indian_phone(p))
            .collect(),
        suspicious_keywords: intel
            .suspicious_keywords
            .into_iter()
            .filter(|k| k.len() <= 50)
            .collect(),
    }
}

pub struct Extractor<'a> {
    settings: &'a Settings,
    llm: Option<&'a LlmBridge>,
}

impl<'a> Extractor<'a> {
    pub fn new(settings: &'a Settings, llm: Option<&'a LlmBridge>) -> Self {
        Self { settings, llm }
    }

    /// Extract intelligence from the whole conversation and merge it into
    /// `existing`. Never removes previously known items.
    pub async fn extract(
        &self,
        conversation_history: &[Message],
        latest_message: &str,
        existing: &ExtractedIntelligence,
    ) -> ExtractedIntelligence {
        let mut corpus = latest_message.to_string();
        for m in conversation_history {
            corpus.push(' ');
            corpus.push_str(&m.text);
        }

        let regex_result = extract_from_text(&corpus);

        let merged = match self.llm_extract(&corpus).await {
            Some(llm_intel) => regex_result.merge(&llm_intel),
            None => regex_result,
        };

        existing.merge(&validate(merged))
    }

    /// Structured model extraction over a bounded corpus prefix. `None` on
    /// any call or parse failure — the regex baseline stands alone then.
    async fn llm_extract(&self, corpus: &str) -> Option<ExtractedIntelligence> {
        let llm = self.llm?;
        let prefix: String = corpus.chars().take(LLM_CORPUS_PREFIX).collect();
        let prompt = format!(
            "Extract scam-related intelligence from this conversation. Return ONLY valid JSON \
             with these exact keys (arrays of strings):\n\
             - bankAccounts: bank account numbers, masked formats like XXXX-XXXX-1234\n\
             - upiIds: UPI IDs (handle@bank format)\n\
             - phishingLinks: URLs that may be phishing/malicious\n\
             - phoneNumbers: Indian phone numbers (+91XXXXXXXXXX)\n\
             - suspiciousKeywords: scam-related phrases used\n\n\
             Conversation:\n{prefix}\n\n\
             Return ONLY the JSON object, no other text."
        );

        let content = match llm
            .chat(&self.settings.llm_extraction_model, None, &prompt, 300, 0.0)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "LLM extraction failed");
                return None;
            }
        };

        match serde_json::from_str::<LlmExtraction>(strip_code_fence(&content)) {
            Ok(parsed) => Some(parsed.into()),
            Err(e) => {
                tracing::warn!(error = %e, "LLM extraction returned unparsable JSON");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sender;

    fn settings() -> Settings {
        Settings::default()
    }

    #[tokio::test]
    async fn local_path_finds_phone_and_upi() {
        let s = settings();
        let ex = Extractor::new(&s, None);
        let result = ex
            .extract(&[], "send to 9876543210 or pay to scammer@upi", &ExtractedIntelligence::default())
            .await;
        assert!(result.phone_numbers.contains(&"+919876543210".to_string()));
        assert!(result.upi_ids.contains(&"scammer@upi".to_string()));
    }

    #[tokio::test]
    async fn history_text_contributes_to_corpus() {
        let s = settings();
        let ex = Extractor::new(&s, None);
        let history = vec![Message::new(
            Sender::Scammer,
            "click https://evil.example/verify to unblock",
            "t0",
        )];
        let result = ex
            .extract(&history, "do it now", &ExtractedIntelligence::default())
            .await;
        assert!(result
            .phishing_links
            .contains(&"https://evil.example/verify".to_string()));
    }

    #[tokio::test]
    async fn extraction_merges_into_existing_monotonically() {
        let s = settings();
        let ex = Extractor::new(&s, None);
        let existing = ExtractedIntelligence {
            upi_ids: vec!["old@upi".to_string()],
            ..Default::default()
        };
        let result = ex.extract(&[], "pay new@upi today", &existing).await;
        assert_eq!(result.upi_ids, vec!["old@upi", "new@upi"]);
        assert!(result.total_items() >= existing.total_items());
    }

    #[tokio::test]
    async fn re_extraction_is_idempotent() {
        let s = settings();
        let ex = Extractor::new(&s, None);
        let msg = "transfer money to 9876543210, upi scammer@upi, link https://bad.example";
        let once = ex.extract(&[], msg, &ExtractedIntelligence::default()).await;
        let twice = ex.extract(&[], msg, &once).await;
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn keyword_hits_are_collected() {
        let s = settings();
        let ex = Extractor::new(&s, None);
        let result = ex
            .extract(&[], "URGENT: verify or account blocked", &ExtractedIntelligence::default())
            .await;
        assert!(result.suspicious_keywords.contains(&"urgent".to_string()));
        assert!(result.suspicious_keywords.contains(&"verify".to_string()));
        assert!(result.suspicious_keywords.contains(&"blocked".to_string()));
    }

    #[test]
    fn validation_drops_malformed_items() {
        let dirty = ExtractedIntelligence {
            bank_accounts: vec!["1234-5678-9012".into(), "x".repeat(40)],
            upi_ids: vec!["good@upi".into(), "not a upi".into()],
            phishing_links: vec!["https://ok.example".into(), "ftp://bad".into()],
            phone_numbers: vec!["+919876543210".into(), "12345".into()],
            suspicious_keywords: vec!["otp".into(), "k".repeat(60)],
        };
        let clean = validate(dirty);
        assert_eq!(clean.bank_accounts.len(), 1);
        assert_eq!(clean.upi_ids, vec!["good@upi"]);
        assert_eq!(clean.phishing_links, vec!["https://ok.example"]);
        assert_eq!(clean.phone_numbers, vec!["+919876543210"]);
        assert_eq!(clean.suspicious_keywords, vec!["otp"]);
    }

    #[test]
    fn llm_payload_tolerates_fences_and_numbers() {
        let raw = "```json\n{\"upiIds\": [\"a@upi\"], \"phoneNumbers\": [9876543210]}\n```";
        let parsed: LlmExtraction =
            serde_json::from_str(strip_code_fence(raw)).unwrap();
        let intel: ExtractedIntelligence = parsed.into();
        assert_eq!(intel.upi_ids, vec!["a@upi"]);
        assert_eq!(intel.phone_numbers, vec!["9876543210"]);
    }
}

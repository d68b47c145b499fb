//! Hybrid scam detection: weighted keyword scoring plus optional LLM
//! classification.
//!
//! The keyword signal is always available and serves three roles: a fast
//! short-circuit for obvious scams (no LLM round trip), a fallback when the
//! model call fails, and a confidence boost on marginal model verdicts.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Settings;
use crate::llm::LlmBridge;
use crate::models::{DetectionResult, Message};
use crate::sanitize::sanitize_text;

/// Cap on the keyword score used in combination logic. The local signal
/// alone never claims full certainty there.
const KEYWORD_SCORE_CAP: f64 = 0.5;
/// Raw indicator sum at which the LLM call is skipped entirely.
const SHORT_CIRCUIT_SCORE: f64 = 0.6;

static SCAM_INDICATORS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    [
        (r"(?i)\b(verify|verification)\b[^.!?]{0,30}\b(immediately|now|urgent)\b", 0.3),
        (r"(?i)\baccount\s+(?:will\s+be\s+|is\s+|has\s+been\s+)?(blocked|suspended|locked)\b", 0.35),
        (r"(?i)\bupi\b", 0.25),
        (r"(?i)\b(share|send|provide)\s+(your|ur)\s+(upi|bank)\b", 0.3),
        (r"(?i)\b(click|visit)\s+(the\s+|this\s+)?(link|url)\b", 0.25),
        (r"(?i)\b(urgent|immediately|asap)\b", 0.15),
        (r"(?i)\b(otp|pin)\s+(required|needed)\b", 0.25),
        (r"(?i)\b(won|winner|prize|reward)\s+(claim|collect)\b", 0.3),
        (r"(?i)\b(kyc|verification)\s+(pending|required)\b", 0.25),
        (r"(?i)\b(bank|sbi|hdfc|icici)\s+(account|block)\b", 0.3),
        (r"(?i)\bphishing|malicious\b", 0.5),
        (r"(?i)\b(transfer|send)\s+money\b", 0.2),
        (r"(?i)\b\d{10,12}\s*(call|whatsapp)\b", 0.2),
    ]
    .iter()
    .map(|(p, w)| (Regex::new(p).expect("scam indicator pattern"), *w))
    .collect()
});

/// Sum of matched indicator weights, uncapped.
fn indicator_sum(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    SCAM_INDICATORS
        .iter()
        .filter(|(pattern, _)| pattern.is_match(text))
        .map(|(_, weight)| weight)
        .sum()
}

/// Keyword score in `[0, 0.5]`, for combination with the model verdict.
fn keyword_score(text: &str) -> f64 {
    indicator_sum(text).min(KEYWORD_SCORE_CAP)
}

pub struct Detector<'a> {
    settings: &'a Settings,
    llm: Option<&'a LlmBridge>,
}

impl<'a> Detector<'a> {
    pub fn new(settings: &'a Settings, llm: Option<&'a LlmBridge>) -> Self {
        Self { settings, llm }
    }

    /// Classify `text` as scam-or-not with a confidence in `[0, 1]`.
    ///
    /// `recent_history` supplies up to the last 5 turns as model context.
    /// Empty sanitized text is never a scam.
    pub async fn detect(&self, text: &str, recent_history: &[Message]) -> DetectionResult {
        let sanitized = sanitize_text(text);
        if sanitized.is_empty() {
            return DetectionResult {
                is_scam: false,
                confidence: 0.0,
                reason: "Empty message".to_string(),
            };
        }

        // Obvious scams skip the LLM round trip entirely. The raw indicator
        // sum decides; the capped score would never clear the bar.
        let raw = indicator_sum(&sanitized);
        if raw >= SHORT_CIRCUIT_SCORE && raw >= self.settings.scam_confidence_threshold {
            return DetectionResult {
                is_scam: true,
                confidence: raw.min(1.0),
                reason: "High keyword match - scam indicators detected".to_string(),
            };
        }

        let kw_score = raw.min(KEYWORD_SCORE_CAP);
        let context: String = recent_history
            .iter()
            .rev()
            .take(5)
            .rev()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let (llm_is_scam, llm_conf, reason) = self.llm_classify(&sanitized, &context).await;

        // Keywords suggesting scam boost a marginal model verdict.
        let combined = if kw_score >= 0.3 {
            llm_conf.max(kw_score + 0.2)
        } else {
            llm_conf
        }
        .min(1.0);

        let mut is_scam = llm_is_scam || (kw_score >= 0.5 && combined >= 0.5);
        if combined >= self.settings.scam_confidence_threshold {
            is_scam = true;
        }

        DetectionResult {
            is_scam,
            confidence: combined,
            reason,
        }
    }

    /// LLM verdict `(is_scam, confidence, reason)`. Falls back to the keyword
    /// score when no bridge is configured or the call fails.
    async fn llm_classify(&self, text: &str, context: &str) -> (bool, f64, String) {
        let Some(llm) = self.llm else {
            tracing::debug!("no LLM key configured, keyword-only detection");
            let kw = keyword_score(text);
            return (kw >= 0.5, kw, "Keyword-based detection (no LLM)".to_string());
        };

        let context_block = if context.is_empty() {
            String::new()
        } else {
            let cut = context.chars().take(500).collect::<String>();
            format!("\n\nPrevious context: {cut}")
        };
        let prompt = format!(
            "You are a scam/fraud intent classifier. Analyze the following message for scam \
             or fraudulent intent (bank fraud, UPI fraud, phishing, fake offers, impersonation).\n\n\
             Message to analyze:\n\"{text}\"{context_block}\n\n\
             Respond in exactly this format (no other text):\n\
             IS_SCAM: true/false\n\
             CONFIDENCE: 0.0 to 1.0\n\
             REASON: one short sentence explaining why"
        );

        match llm
            .chat(&self.settings.llm_detection_model, None, &prompt, 80, 0.0)
            .await
        {
            Ok(content) => parse_classifier_output(&content),
            Err(e) => {
                tracing::warn!(error = %e, "LLM detection failed, falling back to keywords");
                let kw = keyword_score(text);
                let msg = e.to_string();
                let short = msg.chars().take(50).collect::<String>();
                (kw >= 0.5, kw, format!("Fallback: keyword score (LLM error: {short})"))
            }
        }
    }
}

/// Parse `IS_SCAM / CONFIDENCE / REASON` lines from the classifier output.
/// Unparseable fields keep conservative defaults.
fn parse_classifier_output(content: &str) -> (bool, f64, String) {
    let mut is_scam = false;
    let mut confidence = 0.0_f64;
    let mut reason = "Unknown".to_string();

    for line in content.lines() {
        let line = line.trim();
        let upper = line.to_uppercase();
        if upper.starts_with("IS_SCAM:") {
            if let Some(val) = line.splitn(2, ':').nth(1) {
                is_scam = matches!(val.trim().to_lowercase().as_str(), "true" | "yes" | "1");
            }
        } else if upper.starts_with("CONFIDENCE:") {
            if let Some(val) = line.splitn(2, ':').nth(1) {
                if let Ok(v) = val.trim().parse::<f64>() {
                    confidence = v.clamp(0.0, 1.0);
                }
            }
        } else if upper.starts_with("REASON:") {
            if let Some(val) = line.splitn(2, ':').nth(1) {
                reason = val.trim().to_string();
            }
        }
    }
    (is_scam, confidence, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sender;

    fn settings() -> Settings {
        Settings::default()
    }

    #[tokio::test]
    async fn empty_text_is_never_scam() {
        let s = settings();
        let d = Detector::new(&s, None);
        let r = d.detect("", &[]).await;
        assert!(!r.is_scam);
        assert_eq!(r.confidence, 0.0);

        let r = d.detect("   \n ", &[]).await;
        assert!(!r.is_scam);
        assert_eq!(r.confidence, 0.0);
    }

    #[tokio::test]
    async fn obvious_scam_short_circuits_above_threshold() {
        let s = settings();
        let d = Detector::new(&s, None);
        // account-block (0.35) + verify..now (0.3) + upi (0.25) = 0.9 raw
        let r = d
            .detect("Your account will be blocked, verify UPI now", &[])
            .await;
        assert!(r.is_scam);
        assert!(r.confidence >= s.scam_confidence_threshold);
        assert_eq!(r.reason, "High keyword match - scam indicators detected");
    }

    #[tokio::test]
    async fn marginal_scam_uses_boosted_keyword_fallback() {
        let s = settings();
        let d = Detector::new(&s, None);
        // Two indicators summing to 0.5: below the short circuit, keyword
        // fallback boosts the confidence to 0.7.
        let r = d.detect("urgent: your account blocked", &[]).await;
        assert!(r.is_scam);
        assert!((r.confidence - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn benign_text_scores_low() {
        let s = settings();
        let d = Detector::new(&s, None);
        let r = d.detect("hello", &[]).await;
        assert!(!r.is_scam);
        assert!(r.confidence < 0.3);
    }

    #[tokio::test]
    async fn history_context_does_not_flip_benign_message() {
        let s = settings();
        let d = Detector::new(&s, None);
        let history = vec![Message::new(Sender::Scammer, "hi there", "t0")];
        let r = d.detect("how are you", &history).await;
        assert!(!r.is_scam);
    }

    #[test]
    fn classifier_output_parses_and_clamps() {
        let (scam, conf, reason) =
            parse_classifier_output("IS_SCAM: true\nCONFIDENCE: 1.7\nREASON: asks for OTP");
        assert!(scam);
        assert_eq!(conf, 1.0);
        assert_eq!(reason, "asks for OTP");

        let (scam, conf, reason) = parse_classifier_output("garbage");
        assert!(!scam);
        assert_eq!(conf, 0.0);
        assert_eq!(reason, "Unknown");
    }

    #[test]
    fn keyword_score_is_capped() {
        let text = "urgent! account blocked, share your upi id, otp required, click link, transfer money";
        assert_eq!(keyword_score(text), 0.5);
        assert!(indicator_sum(text) > 0.5);
    }
}

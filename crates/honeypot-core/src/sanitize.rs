//! Input sanitization and format validation.
//!
//! Free text from the counterpart is scrubbed for prompt-injection phrasing
//! before it reaches any model prompt. The extract-and-validate helpers are
//! shared between the extractor and its per-item validation pass.

use once_cell::sync::Lazy;
use regex::Regex;

const MAX_TEXT_LEN: usize = 10_000;

static INJECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)ignore\s+(all\s+)?(previous|above|prior)\s+instructions",
        r"(?i)disregard\s+(all\s+)?(previous|above|prior)",
        r"(?i)forget\s+(everything|all)\s+(you\s+)?(know|learned)",
        r"(?i)you\s+are\s+now\s+in\s+(debug|developer|admin)\s+mode",
        r"(?i)system\s*:\s*",
        r"(?i)\[INST\]|\[/INST\]",
        r"(?i)<\|[a-z_]+\|>",
        r"(?i)repeat\s+(after|this)\s*:",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("injection pattern"))
    .collect()
});

static SESSION_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\-_.]+$").expect("session id pattern"));

pub(crate) static UPI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([a-zA-Z0-9._-]+@[a-zA-Z0-9.-]+)\b").expect("upi pattern"));

pub(crate) static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\+91|91)?[6-9]\d{9}\b").expect("phone pattern"));

// Boundary-free variant for scanning text with separators stripped, where a
// glued-on word kills `\b` (e.g. "to9876543210or"). Callers must reject
// matches followed by another digit.
pub(crate) static PHONE_SCAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\+91|91)?[6-9]\d{9}").expect("phone scan pattern"));

/// All Indian mobile numbers in `text`, normalized, separators tolerated.
pub(crate) fn scan_indian_phones(text: &str) -> Vec<String> {
    let cleaned: String = text.chars().filter(|c| *c != ' ' && *c != '-').collect();
    PHONE_SCAN_RE
        .find_iter(&cleaned)
        .filter(|m| {
            // A trailing digit means this is a prefix of a longer number.
            !cleaned[m.end()..].starts_with(|c: char| c.is_ascii_digit())
        })
        .map(|m| normalize_indian_phone(m.as_str()))
        .collect()
}

pub(crate) static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("url pattern"));

pub(crate) static BANK_MASKED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:XXXX|\*{4})-?(?:XXXX|\*{4})-?(\d{4,})").expect("bank masked pattern")
});

pub(crate) static BANK_GROUPED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4,}-?\d{4,}-?\d{4,}\b").expect("bank grouped pattern"));

/// Strip prompt-injection phrasing and cap length. Empty or whitespace-only
/// input yields an empty string.
pub fn sanitize_text(text: &str) -> String {
    let mut end = MAX_TEXT_LEN.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut sanitized = text[..end].trim().to_string();
    for pattern in INJECTION_PATTERNS.iter() {
        sanitized = pattern.replace_all(&sanitized, " ").into_owned();
    }
    sanitized
}

/// Session ids: non-empty, ≤128 chars, alphanumeric plus `- _ .`.
pub fn validate_session_id(session_id: &str) -> bool {
    !session_id.is_empty() && session_id.len() <= 128 && SESSION_ID_RE.is_match(session_id)
}

/// Message text: non-empty and within the absolute size cap.
pub fn validate_message_text(text: &str) -> bool {
    !text.is_empty() && text.len() <= 50_000
}

/// UPI ids are `handle@domain`, at most 50 chars.
pub fn is_valid_upi(upi: &str) -> bool {
    !upi.is_empty()
        && upi.len() <= 50
        && UPI_RE
            .find(upi)
            .map(|m| m.start() == 0 && m.end() == upi.len())
            .unwrap_or(false)
}

/// URLs must be http(s) and at most 500 chars.
pub fn is_valid_url(url: &str) -> bool {
    !url.is_empty()
        && url.len() <= 500
        && (url.starts_with("http://") || url.starts_with("https://"))
}

/// Indian mobile numbers, with separators tolerated.
pub fn is_valid_indian_phone(phone: &str) -> bool {
    if phone.is_empty() || phone.len() > 15 {
        return false;
    }
    let cleaned: String = phone.chars().filter(|c| *c != ' ' && *c != '-').collect();
    PHONE_RE.is_match(&cleaned)
}

/// First UPI id in `text`, if any.
pub fn extract_upi(text: &str) -> Option<String> {
    UPI_RE
        .find(text)
        .map(|m| m.as_str().to_string())
        .filter(|u| is_valid_upi(u))
}

/// First Indian mobile number in `text`, normalized to `+91` + 10 digits.
pub fn extract_indian_phone(text: &str) -> Option<String> {
    scan_indian_phones(text).into_iter().next()
}

/// Normalize a matched Indian mobile number to `+91XXXXXXXXXX`.
pub fn normalize_indian_phone(num: &str) -> String {
    if let Some(rest) = num.strip_prefix("+91") {
        return format!("+91{}", rest);
    }
    if num.len() == 12 {
        if let Some(rest) = num.strip_prefix("91") {
            return format!("+91{}", rest);
        }
    }
    let digits: &str = if num.len() > 10 { &num[num.len() - 10..] } else { num };
    format!("+91{}", digits)
}

/// First http(s) URL in `text`, if any.
pub fn extract_url(text: &str) -> Option<String> {
    URL_RE
        .find(text)
        .map(|m| m.as_str().to_string())
        .filter(|u| is_valid_url(u))
}

/// First masked (`XXXX-XXXX-1234`) or grouped-digit bank account pattern.
pub fn extract_bank_account(text: &str) -> Option<String> {
    if let Some(m) = BANK_MASKED_RE.find(text) {
        return Some(m.as_str().to_string());
    }
    BANK_GROUPED_RE.find(text).map(|m| m.as_str().to_string())
}

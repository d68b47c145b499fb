//! Tolerant request normalization for the `/honeypot` route.
//!
//! The evaluation tester is loose about shape: `message` may be an object or
//! a bare string, senders arrive in any case, `conversationHistory` may be
//! null, timestamps may be missing. Normalization absorbs all of that;
//! anything genuinely malformed maps to a single "Invalid request format"
//! rejection.

use honeypot_core::{Message, Sender};
use serde_json::Value;

const DEFAULT_SESSION_ID: &str = "eval-session";
const MAX_MESSAGE_TEXT: usize = 10_000;
const MAX_HISTORY_ITEMS: usize = 50;

/// A fully normalized inbound turn.
pub struct NormalizedRequest {
    pub session_id: String,
    pub message: Message,
    pub history: Vec<Message>,
}

fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn normalize_session_id(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                DEFAULT_SESSION_ID.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Some(Value::Number(n)) => n.to_string(),
        // Anything structured stringifies and then fails session-id
        // validation downstream, which is the right rejection.
        Some(Value::Array(_)) | Some(Value::Object(_)) | Some(Value::Bool(_)) => value
            .map(|v| v.to_string())
            .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string()),
        Some(Value::Null) | None => DEFAULT_SESSION_ID.to_string(),
    }
}

fn normalize_sender(value: Option<&Value>) -> Option<Sender> {
    match value {
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "scammer" => Some(Sender::Scammer),
            "user" => Some(Sender::User),
            _ => None,
        },
        _ => None,
    }
}

fn normalize_text(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => {
            if s.chars().count() > MAX_MESSAGE_TEXT {
                return None;
            }
            Some(s.clone())
        }
        Some(Value::Null) | None => Some(String::new()),
        _ => None,
    }
}

fn normalize_timestamp(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() && s.len() <= 50 => s.clone(),
        _ => now_timestamp(),
    }
}

fn normalize_message(value: &Value) -> Option<Message> {
    match value {
        // Simplified tester format: a bare string is a scammer message.
        Value::String(text) => {
            if text.chars().count() > MAX_MESSAGE_TEXT {
                return None;
            }
            Some(Message::new(Sender::Scammer, text.clone(), now_timestamp()))
        }
        Value::Object(map) => {
            let sender = normalize_sender(map.get("sender"))?;
            let text = normalize_text(map.get("text"))?;
            let timestamp = normalize_timestamp(map.get("timestamp"));
            Some(Message::new(sender, text, timestamp))
        }
        _ => None,
    }
}

/// Normalize a parsed JSON body. `Err` carries the user-facing reply string.
pub fn normalize_request(body: &Value) -> Result<NormalizedRequest, &'static str> {
    let Value::Object(map) = body else {
        return Err("Request body must be JSON object");
    };

    let session_id = normalize_session_id(map.get("sessionId"));

    let message = map
        .get("message")
        .and_then(normalize_message)
        .ok_or("Invalid request format")?;

    let history = match map.get("conversationHistory") {
        Some(Value::Array(items)) => {
            if items.len() > MAX_HISTORY_ITEMS {
                return Err("Invalid request format");
            }
            let mut history = Vec::with_capacity(items.len());
            for item in items {
                history.push(normalize_message(item).ok_or("Invalid request format")?);
            }
            history
        }
        _ => Vec::new(),
    };

    Ok(NormalizedRequest {
        session_id,
        message,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_object_request_normalizes() {
        let body = json!({
            "sessionId": "sess-1",
            "message": {"sender": "SCAMMER", "text": "hi", "timestamp": "2026-01-01T00:00:00Z"},
            "conversationHistory": [
                {"sender": "scammer", "text": "hello", "timestamp": "t0"},
                {"sender": "user", "text": "who?", "timestamp": "t1"}
            ]
        });
        let req = normalize_request(&body).unwrap();
        assert_eq!(req.session_id, "sess-1");
        assert_eq!(req.message.sender, Sender::Scammer);
        assert_eq!(req.history.len(), 2);
        assert_eq!(req.history[1].sender, Sender::User);
    }

    #[test]
    fn bare_string_message_defaults_to_scammer() {
        let body = json!({"message": "verify your upi now"});
        let req = normalize_request(&body).unwrap();
        assert_eq!(req.session_id, "eval-session");
        assert_eq!(req.message.sender, Sender::Scammer);
        assert_eq!(req.message.text, "verify your upi now");
        assert!(!req.message.timestamp.is_empty());
    }

    #[test]
    fn null_history_and_missing_fields_are_tolerated() {
        let body = json!({
            "sessionId": null,
            "message": {"sender": "user", "text": null},
            "conversationHistory": null
        });
        let req = normalize_request(&body).unwrap();
        assert_eq!(req.session_id, "eval-session");
        assert_eq!(req.message.text, "");
        assert!(req.history.is_empty());
    }

    #[test]
    fn unknown_sender_is_rejected() {
        let body = json!({"message": {"sender": "bot", "text": "hi"}});
        assert!(normalize_request(&body).is_err());
    }

    #[test]
    fn missing_message_is_rejected() {
        assert!(normalize_request(&json!({"sessionId": "s"})).is_err());
        assert!(normalize_request(&json!([1, 2])).is_err());
    }

    #[test]
    fn oversized_text_and_history_are_rejected() {
        let long = "x".repeat(10_001);
        let body = json!({"message": {"sender": "scammer", "text": long}});
        assert!(normalize_request(&body).is_err());

        let items: Vec<_> = (0..51)
            .map(|i| json!({"sender": "scammer", "text": format!("m{i}")}))
            .collect();
        let body = json!({"message": "hi", "conversationHistory": items});
        assert!(normalize_request(&body).is_err());
    }

    #[test]
    fn structured_session_id_survives_to_validation() {
        let body = json!({"sessionId": {"nested": true}, "message": "hi"});
        let req = normalize_request(&body).unwrap();
        assert!(!honeypot_core::sanitize::validate_session_id(&req.session_id));
    }
}

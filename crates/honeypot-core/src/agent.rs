//! Persona agent: generates the honeypot's in-character reply.
//!
//! The persona is a worried, cooperative Indian bank customer. A fixed
//! template rotation keeps the agent functional with no model configured;
//! when a model is available its reply is used but its self-reported
//! engagement score can only raise the locally computed heuristic, never
//! lower it — a terse or misbehaving model must not silently degrade the
//! session's measured engagement quality.

use serde::Deserialize;

use crate::config::Settings;
use crate::llm::{strip_code_fence, LlmBridge};
use crate::models::{AgentResponse, ExtractedIntelligence, Message, Sender};
use crate::sanitize::sanitize_text;

const AGENT_SYSTEM_PROMPT: &str = r#"You are an AI honeypot agent pretending to be a confused but cooperative Indian user. Your goal is to extract scam-related intelligence WITHOUT revealing that you are a honeypot.

PERSONA - BE A REALISTIC INDIAN USER:
- Age: 25-40, middle-class Indian
- Location: Urban India (Mumbai/Delhi/Bangalore)
- Language: Mix of English and Hindi words naturally
- Personality: Worried about account security, but trusting of "official" messages
- Tone: Casual, friendly, slightly anxious when account is mentioned
- Use natural phrases: "yaar", "acha", "ok ok", "bhai", "dear", "sir/madam"

RESPONSE QUALITY REQUIREMENTS:
- MINIMUM 2-3 sentences (30-80 words)
- Ask 1-2 natural questions per response
- Show genuine concern and confusion
- Be conversational, not robotic

GOALS TO EXTRACT (when scammer asks):
- Bank account numbers (ask which bank first)
- UPI IDs (act confused, ask why needed)
- Phishing links (ask if official, which bank sent)
- Phone numbers (ask why they need it)
- OTP/PIN (say you'll share after verification)

NEVER:
- Reveal you're an AI or automated system
- Use one-line responses
- Give information immediately without questions
- End conversation quickly

RESPONSE FORMAT:
Return ONLY valid JSON with exactly these keys:
{"reply": "your natural, conversational response (2-3 sentences, 30-80 words)", "engagement_score": 0.0 to 1.0}
"#;

/// Persona-consistent fallback replies, rotated by message count so repeated
/// turns of one session vary without extra state.
const FALLBACK_REPLIES: &[&str] = &[
    "Yaar, I'm really worried now. Which bank sent this message? I didn't receive any notification in my banking app. Can you tell me more about why my account will be blocked?",
    "Ok ok, I understand you're saying my account will be blocked. But I want to make sure this is safe and official. Which bank are you from? And can you tell me what I need to do exactly? I'm a bit confused.",
    "Hmm, I'm really concerned about this. I don't understand why my account would be blocked. Can you explain more? Also, which bank sent this message? I want to verify this is legitimate.",
    "Yaar, I don't understand. Is my account really blocked? I checked my banking app and I don't see any notification there. Can you tell me which bank you're from and why this is happening?",
    "Let me see... This is worrying me. Can you send the link again? But first, please confirm which bank you're representing. I want to make sure this is safe before I click anything.",
    "Ok I'll do what you're asking, but is this really safe? I'm worried about fraud. Can you tell me which bank sent this and why I need to verify? I want to be careful.",
    "Acha, give me 2 minutes. I need to check my banking app first to see if there's any notification there. But can you tell me which bank you're from? I want to verify this is official.",
    "Which bank is this from? I want to verify this is legitimate before I do anything. I'm really worried about my account being blocked, but I also don't want to fall for a scam. Can you help me understand?",
    "I'm worried about this message. Can you tell me more about what's happening? Which bank sent this and why do I need to verify? I want to make sure this is safe before I share any details.",
    "Ok, I'll share what you need, but please confirm it's official first. I'm concerned about fraud. Can you tell me which bank you're from and why this verification is necessary? I want to be careful.",
];

const PERSONA_PHRASES: &[&str] = &[
    "yaar", "acha", "ok ok", "worried", "confused", "which", "why", "can you",
];

/// Payload the model is asked to return.
#[derive(Deserialize)]
struct LlmReply {
    reply: Option<String>,
    engagement_score: Option<f64>,
}

fn fallback_reply(message_count: usize) -> String {
    FALLBACK_REPLIES[message_count % FALLBACK_REPLIES.len()].to_string()
}

/// Heuristic engagement score from the reply's own text plus turn context.
/// Base 0.6, boosted by length, questions, persona phrasing, depth, and
/// whether any intelligence has landed. Capped at 1.0.
fn engagement_score(reply: &str, message_count: usize, intel_count: usize) -> f64 {
    let mut score: f64 = 0.6;
    if reply.len() > 50 {
        score += 0.15;
    } else if reply.len() > 30 {
        score += 0.1;
    }
    let questions = reply.matches('?').count();
    if questions >= 2 {
        score += 0.15;
    } else if questions >= 1 {
        score += 0.1;
    }
    let lower = reply.to_lowercase();
    let phrase_hits = PERSONA_PHRASES.iter().filter(|p| lower.contains(**p)).count();
    if phrase_hits >= 2 {
        score += 0.1;
    }
    if message_count > 3 {
        score += 0.05;
    }
    if intel_count > 0 {
        score += 0.1;
    }
    score.min(1.0)
}

fn format_conversation(history: &[Message], latest: &str) -> String {
    let mut lines: Vec<String> = history
        .iter()
        .rev()
        .take(10)
        .rev()
        .map(|m| {
            let role = match m.sender {
                Sender::Scammer => "Scammer",
                Sender::User => "You",
            };
            format!("{role}: {}", m.text)
        })
        .collect();
    lines.push(format!("Scammer: {latest}"));
    lines.join("\n")
}

pub struct PersonaAgent<'a> {
    settings: &'a Settings,
    llm: Option<&'a LlmBridge>,
}

impl<'a> PersonaAgent<'a> {
    pub fn new(settings: &'a Settings, llm: Option<&'a LlmBridge>) -> Self {
        Self { settings, llm }
    }

    /// Produce the next in-character reply. Never returns an empty string.
    pub async fn reply(
        &self,
        latest_message: &str,
        conversation_history: &[Message],
        extracted_intelligence: &ExtractedIntelligence,
        message_count: usize,
        agent_notes: &str,
    ) -> AgentResponse {
        let sanitized = sanitize_text(latest_message);
        if sanitized.is_empty() {
            return AgentResponse {
                reply: "I didn't get that. Can you repeat?".to_string(),
                engagement_score: 0.5,
            };
        }

        let intel_count = extracted_intelligence.total_items();
        let Some(llm) = self.llm else {
            let reply = fallback_reply(message_count);
            let score = engagement_score(&reply, message_count, intel_count);
            return AgentResponse { reply, engagement_score: score };
        };

        let conv_text = format_conversation(conversation_history, &sanitized);
        // The agent's own recent replies, so the model can avoid repeating itself.
        let own_replies: Vec<&str> = conversation_history
            .iter()
            .filter(|m| m.sender == Sender::User)
            .map(|m| m.text.as_str())
            .collect();
        let prev_context = if own_replies.is_empty() {
            "No previous replies".to_string()
        } else {
            own_replies[own_replies.len().saturating_sub(3)..].join("\n")
        };
        let notes_line = if agent_notes.is_empty() {
            String::new()
        } else {
            format!("Agent notes: {agent_notes}\n")
        };

        let user_prompt = format!(
            "Conversation so far:\n{conv_text}\n\n\
             Previous replies you made (AVOID repeating these):\n{prev_context}\n\n\
             Current extracted intelligence: {intel_count} items so far.\n\
             Message count: {message_count}\n{notes_line}\n\
             CRITICAL: Generate a UNIQUE, NATURAL, CONVERSATIONAL response (2-3 sentences, 30-80 words minimum).\n\
             - DO NOT repeat your previous responses - be creative and varied\n\
             - Ask 1-2 DIFFERENT natural questions than before\n\
             - Use Indian English phrases naturally: \"yaar\", \"acha\", \"ok ok\", \"bhai\"\n\
             - Express concern about account security and gradually show willingness to cooperate\n\n\
             Return ONLY the JSON object."
        );

        match llm
            .chat(&self.settings.llm_model, Some(AGENT_SYSTEM_PROMPT), &user_prompt, 200, 0.85)
            .await
        {
            Ok(content) => self.parse_reply(&content, message_count, intel_count),
            Err(e) => {
                tracing::warn!(error = %e, "agent LLM failed, using fallback rotation");
                let reply = fallback_reply(message_count);
                let score = engagement_score(&reply, message_count, intel_count);
                AgentResponse { reply, engagement_score: score }
            }
        }
    }

    fn parse_reply(&self, content: &str, message_count: usize, intel_count: usize) -> AgentResponse {
        let cleaned = strip_code_fence(content);
        match serde_json::from_str::<LlmReply>(cleaned) {
            Ok(parsed) => {
                let reply = parsed
                    .reply
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| fallback_reply(message_count));
                let model_score = parsed.engagement_score.unwrap_or(0.6);
                // The heuristic is a floor: the model can only raise it.
                let floor = engagement_score(&reply, message_count, intel_count);
                AgentResponse {
                    reply,
                    engagement_score: model_score.max(floor).min(1.0),
                }
            }
            Err(_) => {
                // Not JSON, but plausibly a bare reply.
                let raw = content.trim();
                if raw.len() > 5 && raw.len() < 500 {
                    AgentResponse {
                        reply: raw.to_string(),
                        engagement_score: 0.6,
                    }
                } else {
                    AgentResponse {
                        reply: fallback_reply(message_count),
                        engagement_score: 0.5,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::default()
    }

    #[tokio::test]
    async fn empty_input_gets_clarification() {
        let s = settings();
        let agent = PersonaAgent::new(&s, None);
        let r = agent
            .reply("", &[], &ExtractedIntelligence::default(), 0, "")
            .await;
        assert_eq!(r.reply, "I didn't get that. Can you repeat?");
        assert_eq!(r.engagement_score, 0.5);
    }

    #[tokio::test]
    async fn fallback_rotation_varies_by_turn_and_is_never_empty() {
        let s = settings();
        let agent = PersonaAgent::new(&s, None);
        let intel = ExtractedIntelligence::default();
        let r1 = agent.reply("your account is blocked", &[], &intel, 1, "").await;
        let r2 = agent.reply("your account is blocked", &[], &intel, 2, "").await;
        assert!(!r1.reply.is_empty());
        assert!(!r2.reply.is_empty());
        assert_ne!(r1.reply, r2.reply);
        // Rotation wraps around.
        let r11 = agent
            .reply("your account is blocked", &[], &intel, 1 + FALLBACK_REPLIES.len(), "")
            .await;
        assert_eq!(r1.reply, r11.reply);
    }

    #[tokio::test]
    async fn fallback_scores_reflect_engagement_signals() {
        let s = settings();
        let intel = ExtractedIntelligence {
            upi_ids: vec!["a@upi".to_string()],
            ..Default::default()
        };
        let agent = PersonaAgent::new(&s, None);
        let deep = agent.reply("share your upi", &[], &intel, 6, "").await;
        let shallow = agent.reply("share your upi", &[], &ExtractedIntelligence::default(), 0, "").await;
        assert!(deep.engagement_score >= shallow.engagement_score);
        assert!(deep.engagement_score <= 1.0);
    }

    #[test]
    fn heuristic_floor_holds_against_terse_model_scores() {
        let s = settings();
        let agent = PersonaAgent::new(&s, None);
        let content = r#"{"reply": "Yaar, which bank is this? Why is my account blocked? I'm worried.", "engagement_score": 0.1}"#;
        let r = agent.parse_reply(content, 4, 1);
        let floor = engagement_score(&r.reply, 4, 1);
        assert!(r.engagement_score >= floor);
        assert!(r.engagement_score > 0.1);
    }

    #[test]
    fn fenced_json_reply_parses() {
        let s = settings();
        let agent = PersonaAgent::new(&s, None);
        let content = "```json\n{\"reply\": \"Acha ok, but which bank are you from?\", \"engagement_score\": 0.9}\n```";
        let r = agent.parse_reply(content, 0, 0);
        assert_eq!(r.reply, "Acha ok, but which bank are you from?");
        assert!(r.engagement_score >= 0.9);
    }

    #[test]
    fn plausible_raw_text_is_used_verbatim() {
        let s = settings();
        let agent = PersonaAgent::new(&s, None);
        let r = agent.parse_reply("Which bank sent this? I am confused.", 0, 0);
        assert_eq!(r.reply, "Which bank sent this? I am confused.");
        assert_eq!(r.engagement_score, 0.6);
    }

    #[test]
    fn implausible_raw_text_falls_back_to_rotation() {
        let s = settings();
        let agent = PersonaAgent::new(&s, None);
        let r = agent.parse_reply("ok", 3, 0);
        assert_eq!(r.reply, fallback_reply(3));
        assert_eq!(r.engagement_score, 0.5);
    }
}

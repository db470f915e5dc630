use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

/// Who produced a message. A single tag instead of independent
/// `is_ai_response`/`is_staff_reply` booleans, so both-true is
/// unrepresentable; the booleans survive only at the store boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrigin {
    Visitor,
    GeneratedReply,
    HumanOperator,
}

impl MessageOrigin {
    pub fn is_ai_response(self) -> bool {
        matches!(self, MessageOrigin::GeneratedReply)
    }

    pub fn is_staff_reply(self) -> bool {
        matches!(self, MessageOrigin::HumanOperator)
    }
}

/// Decided once at session start from the business-hours gate and held
/// fixed for the session's lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Human,
    Ai,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Human => "human",
            SessionMode::Ai => "ai",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub role: ChatRole,
    pub origin: MessageOrigin,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSessionRecord {
    pub session_id: String,
    pub mode: SessionMode,
    pub language: String,
    pub started_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl ChatSessionRecord {
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

/// Result of handling a visitor message. Rate-limit rejection and
/// off-hours queuing are expected control flow, not errors.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendOutcome {
    Replied { message: ChatMessage },
    Queued { acknowledgment: ChatMessage },
    RateLimited { retry_after: String },
    Rejected { reason: String },
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn message_wire_shape_is_snake_case() {
        let timestamp = Utc
            .with_ymd_and_hms(2026, 3, 2, 1, 0, 0)
            .single()
            .expect("valid test instant");
        let message = ChatMessage {
            id: "m1".to_owned(),
            session_id: "s1".to_owned(),
            role: ChatRole::Assistant,
            origin: MessageOrigin::HumanOperator,
            content: "operator here".to_owned(),
            timestamp,
        };

        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["role"], json!("assistant"));
        assert_eq!(value["origin"], json!("human_operator"));
        assert_eq!(value["session_id"], json!("s1"));
    }

    #[test]
    fn send_outcome_is_tagged_by_status() {
        let rate_limited = SendOutcome::RateLimited {
            retry_after: "5m 0s".to_owned(),
        };
        let value = serde_json::to_value(&rate_limited).expect("serialize");
        assert_eq!(
            value,
            json!({ "status": "rate_limited", "retry_after": "5m 0s" })
        );

        let rejected = SendOutcome::Rejected {
            reason: "unknown session".to_owned(),
        };
        let value = serde_json::to_value(&rejected).expect("serialize");
        assert_eq!(value["status"], json!("rejected"));
    }
}

use std::collections::HashSet;

use uuid::Uuid;

use crate::types::ChatMessage;

/// Session identity handed out at session creation. Random v4, since
/// the id gates the generated-reply call server-side and must not be
/// guessable.
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Id for a persisted message.
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Id for a transient message that never reaches the store (welcome
/// text, queued acknowledgments).
pub fn new_transient_id() -> String {
    format!("local-{}", Uuid::new_v4())
}

/// Ordered transcript of an open chat, deduplicated by message id.
/// Staff replies arrive both from direct responses and from the push
/// subscription, so the same record can be offered twice.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    seen: HashSet<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends unless the id was already seen; returns whether the
    /// message was added.
    pub fn push(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::types::{ChatRole, MessageOrigin};

    use super::*;

    fn message(id: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_owned(),
            session_id: "s1".to_owned(),
            role: ChatRole::Assistant,
            origin: MessageOrigin::HumanOperator,
            content: "hello".to_owned(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
    }

    #[test]
    fn transient_ids_are_prefixed() {
        assert!(new_transient_id().starts_with("local-"));
    }

    #[test]
    fn transcript_drops_duplicate_ids() {
        let mut transcript = Transcript::new();
        assert!(transcript.push(message("m1")));
        assert!(transcript.push(message("m2")));
        assert!(!transcript.push(message("m1")));
        assert_eq!(transcript.len(), 2);
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::types::{ChatMessage, ChatSessionRecord};

use super::subscribers::{StaffReplySubscription, SubscriberRegistry};
use super::MessageStore;

/// Default store when no database is configured. State lives for the
/// process lifetime only.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    sessions: RwLock<HashMap<String, ChatSessionRecord>>,
    messages: RwLock<HashMap<String, Vec<ChatMessage>>>,
    subscribers: Arc<SubscriberRegistry>,
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create_session(&self, session: ChatSessionRecord) -> anyhow::Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.session_id) {
            anyhow::bail!("session {} already exists", session.session_id);
        }
        sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> anyhow::Result<Option<ChatSessionRecord>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn close_session(&self, session_id: &str) -> anyhow::Result<bool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(session) if !session.is_closed() => {
                session.closed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_message(&self, message: ChatMessage) -> anyhow::Result<()> {
        {
            let mut messages = self.messages.write().await;
            messages
                .entry(message.session_id.clone())
                .or_default()
                .push(message.clone());
        }
        if message.origin.is_staff_reply() {
            self.subscribers.notify(&message);
        }
        Ok(())
    }

    async fn list_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<ChatMessage>> {
        let mut messages = self
            .messages
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by_key(|message| message.timestamp);
        if messages.len() > limit {
            let start = messages.len().saturating_sub(limit);
            messages = messages.split_off(start);
        }
        Ok(messages)
    }

    fn subscribe_staff_replies(&self, session_id: &str) -> StaffReplySubscription {
        self.subscribers.subscribe(session_id)
    }
}

mod in_memory;
mod postgres;
mod subscribers;

use async_trait::async_trait;

use crate::types::{ChatMessage, ChatSessionRecord};

pub use in_memory::InMemoryMessageStore;
pub use postgres::PostgresMessageStore;
pub use subscribers::StaffReplySubscription;

/// Persistence plus staff-reply push for chat sessions. The canonical
/// transcript lives behind this trait; messages are append-only.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_session(&self, session: ChatSessionRecord) -> anyhow::Result<()>;

    async fn get_session(&self, session_id: &str) -> anyhow::Result<Option<ChatSessionRecord>>;

    /// Marks the session closed; returns false when it does not exist
    /// or was already closed.
    async fn close_session(&self, session_id: &str) -> anyhow::Result<bool>;

    async fn append_message(&self, message: ChatMessage) -> anyhow::Result<()>;

    async fn list_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<ChatMessage>>;

    /// Live feed of human-operator replies for the session; dropping
    /// the subscription unsubscribes.
    fn subscribe_staff_replies(&self, session_id: &str) -> StaffReplySubscription;
}

use async_trait::async_trait;

use crate::types::ChatRole;

use super::{ReplyError, ReplyProvider, ReplyRequest};

/// Canned provider for local development and tests.
#[derive(Debug, Default)]
pub struct MockReplyProvider;

#[async_trait]
impl ReplyProvider for MockReplyProvider {
    async fn generate(&self, request: ReplyRequest) -> Result<String, ReplyError> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|message| message.role == ChatRole::User)
            .map(|message| message.content.as_str())
            .unwrap_or("(empty)");

        Ok(format!("Mock reply to: {last_user}"))
    }
}

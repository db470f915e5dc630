mod http;
mod mock;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use http::HttpReplyProvider;
pub use mock::MockReplyProvider;

use crate::types::ChatRole;

#[derive(Debug, Clone, Serialize)]
pub struct ReplyMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyRequest {
    pub messages: Vec<ReplyMessage>,
    pub language: String,
    pub session_id: String,
}

/// Failure classes of the generated-reply service. Session rejections
/// must be surfaced and never retried; everything else is recoverable
/// with a fallback message.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("invalid reply request: {0}")]
    InvalidRequest(String),
    #[error("session rejected: {0}")]
    SessionRejected(String),
    #[error("reply service rate limited")]
    RateLimited,
    #[error("reply service unavailable: {0}")]
    Upstream(String),
}

impl ReplyError {
    /// Whether the conversation can continue with a fallback assistant
    /// message. Retrying a rejected session id cannot succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ReplyError::InvalidRequest(_) | ReplyError::SessionRejected(_)
        )
    }
}

#[async_trait]
pub trait ReplyProvider: Send + Sync {
    async fn generate(&self, request: ReplyRequest) -> Result<String, ReplyError>;
}

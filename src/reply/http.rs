use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ReplyError, ReplyProvider, ReplyRequest};

/// Client for the hosted generated-reply endpoint. The endpoint takes
/// the conversation history plus language and session id, and answers
/// with a single assistant message.
#[derive(Debug, Clone)]
pub struct HttpReplyProvider {
    client: Client,
    endpoint: String,
}

impl HttpReplyProvider {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReplyResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[async_trait]
impl ReplyProvider for HttpReplyProvider {
    async fn generate(&self, request: ReplyRequest) -> Result<String, ReplyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|error| ReplyError::Upstream(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .json::<ReplyResponse>()
                .await
                .map_err(|error| ReplyError::Upstream(error.to_string()))?;
            return Ok(body.message);
        }

        let detail = response
            .json::<ErrorResponse>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());

        Err(match status.as_u16() {
            400 => ReplyError::InvalidRequest(detail),
            403 => ReplyError::SessionRejected(detail),
            429 => ReplyError::RateLimited,
            _ => ReplyError::Upstream(detail),
        })
    }
}

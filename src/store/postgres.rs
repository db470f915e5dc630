use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::types::{ChatMessage, ChatRole, ChatSessionRecord, MessageOrigin, SessionMode};

use super::subscribers::{StaffReplySubscription, SubscriberRegistry};
use super::MessageStore;

/// Store backed by the hosted database. The schema is owned by the
/// hosting side and keeps its wire shape, with message origin spread
/// over the `is_ai_response`/`is_staff_reply` booleans:
///
///   chat_sessions(session_id, mode, language, started_at, closed_at)
///   chat_messages(id, session_id, role, content,
///                 is_ai_response, is_staff_reply, created_at)
#[derive(Debug, Clone)]
pub struct PostgresMessageStore {
    pool: PgPool,
    subscribers: Arc<SubscriberRegistry>,
}

impl PostgresMessageStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool,
            subscribers: Arc::new(SubscriberRegistry::default()),
        })
    }
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    async fn create_session(&self, session: ChatSessionRecord) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO chat_sessions (session_id, mode, language, started_at, closed_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session.session_id)
        .bind(session.mode.as_str())
        .bind(session.language)
        .bind(session.started_at)
        .bind(session.closed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> anyhow::Result<Option<ChatSessionRecord>> {
        let session = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                chrono::DateTime<chrono::Utc>,
                Option<chrono::DateTime<chrono::Utc>>,
            ),
        >(
            "SELECT session_id, mode, language, started_at, closed_at
             FROM chat_sessions
             WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .map(
            |(session_id, mode, language, started_at, closed_at)| ChatSessionRecord {
                session_id,
                mode: parse_mode(&mode),
                language,
                started_at,
                closed_at,
            },
        );

        Ok(session)
    }

    async fn close_session(&self, session_id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE chat_sessions
             SET closed_at = NOW()
             WHERE session_id = $1 AND closed_at IS NULL",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_message(&self, message: ChatMessage) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO chat_messages
             (id, session_id, role, content, is_ai_response, is_staff_reply, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&message.id)
        .bind(&message.session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.origin.is_ai_response())
        .bind(message.origin.is_staff_reply())
        .bind(message.timestamp)
        .execute(&self.pool)
        .await?;

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
        let limit = query_limit(limit);

        let mut messages = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                String,
                bool,
                bool,
                chrono::DateTime<chrono::Utc>,
            ),
        >(
            "SELECT id, session_id, role, content, is_ai_response, is_staff_reply, created_at
             FROM chat_messages
             WHERE session_id = $1
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(
            |(id, session_id, role, content, is_ai_response, is_staff_reply, created_at)| {
                let role = parse_role(&role);
                ChatMessage {
                    id,
                    session_id,
                    role,
                    origin: derive_origin(role, is_ai_response, is_staff_reply),
                    content,
                    timestamp: created_at,
                }
            },
        )
        .collect::<Vec<_>>();

        messages.reverse();
        Ok(messages)
    }

    fn subscribe_staff_replies(&self, session_id: &str) -> StaffReplySubscription {
        self.subscribers.subscribe(session_id)
    }
}

// Client-supplied limits can exceed i64; a plain `as` cast would wrap
// negative and make Postgres reject the query.
fn query_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn parse_mode(mode: &str) -> SessionMode {
    match mode {
        "human" => SessionMode::Human,
        _ => SessionMode::Ai,
    }
}

fn parse_role(role: &str) -> ChatRole {
    match role {
        "assistant" => ChatRole::Assistant,
        "system" => ChatRole::System,
        _ => ChatRole::User,
    }
}

// The staff flag wins over everything else; rows with both booleans set
// were never written by this code but exist in principle in the wire
// format.
fn derive_origin(role: ChatRole, is_ai_response: bool, is_staff_reply: bool) -> MessageOrigin {
    if is_staff_reply {
        MessageOrigin::HumanOperator
    } else if role == ChatRole::User {
        MessageOrigin::Visitor
    } else if is_ai_response {
        MessageOrigin::GeneratedReply
    } else {
        MessageOrigin::HumanOperator
    }
}

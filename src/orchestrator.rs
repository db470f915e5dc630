use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    clock::Clock,
    hours,
    rate_limit::{format_time_remaining, RateLimitConfig, RateLimiter},
    reply::{ReplyMessage, ReplyProvider, ReplyRequest},
    session::{self, Transcript},
    store::MessageStore,
    types::{ChatMessage, ChatRole, ChatSessionRecord, MessageOrigin, SendOutcome, SessionMode},
};

/// How much history goes to the reply service per turn.
const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct SessionStart {
    pub session: ChatSessionRecord,
    pub welcome: ChatMessage,
}

/// Advisory limiter state for UI display; reading it never consumes an
/// attempt.
#[derive(Debug, Clone, Serialize)]
pub struct LimitStatus {
    pub allowed: bool,
    pub remaining_attempts: u32,
    pub retry_after: Option<String>,
}

pub struct ChatOrchestrator {
    reply: Arc<dyn ReplyProvider>,
    store: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    limit_config: RateLimitConfig,
    limiters: Mutex<HashMap<String, RateLimiter>>,
}

impl ChatOrchestrator {
    pub fn new(
        reply: Arc<dyn ReplyProvider>,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
        limit_config: RateLimitConfig,
    ) -> anyhow::Result<Self> {
        limit_config.validate()?;
        Ok(Self {
            reply,
            store,
            clock,
            limit_config,
            limiters: Mutex::new(HashMap::new()),
        })
    }

    /// Opens a session. The business-hours gate is evaluated here, at
    /// this instant, and the resulting mode is fixed for the session.
    pub async fn start_session(&self, language: &str) -> anyhow::Result<SessionStart> {
        let now = self.clock.now();
        let mode = hours::session_mode(now);
        let session = ChatSessionRecord {
            session_id: session::new_session_id(),
            mode,
            language: language.to_owned(),
            started_at: now,
            closed_at: None,
        };
        self.store.create_session(session.clone()).await?;
        info!(session_id = %session.session_id, mode = mode.as_str(), "chat session started");

        let welcome = self.transient_message(&session, welcome_text(mode, language));
        Ok(SessionStart { session, welcome })
    }

    /// Handles one visitor message: rate gate, persist, then either a
    /// generated reply (AI mode) or a queued acknowledgment (human
    /// mode).
    pub async fn handle_message(
        &self,
        session_id: &str,
        content: &str,
    ) -> anyhow::Result<SendOutcome> {
        let Some(chat_session) = self.store.get_session(session_id).await? else {
            return Ok(SendOutcome::Rejected {
                reason: "unknown session".to_owned(),
            });
        };
        if chat_session.is_closed() {
            return Ok(SendOutcome::Rejected {
                reason: "session is closed".to_owned(),
            });
        }

        if let Some(retry_after) = self.try_record_attempt(session_id).await? {
            warn!(%session_id, %retry_after, "message rate limited");
            return Ok(SendOutcome::RateLimited { retry_after });
        }

        let visitor = ChatMessage {
            id: session::new_message_id(),
            session_id: session_id.to_owned(),
            role: ChatRole::User,
            origin: MessageOrigin::Visitor,
            content: content.to_owned(),
            timestamp: self.clock.now(),
        };
        self.store.append_message(visitor).await?;

        match chat_session.mode {
            SessionMode::Human => {
                let acknowledgment =
                    self.transient_message(&chat_session, queued_ack_text(&chat_session.language));
                Ok(SendOutcome::Queued { acknowledgment })
            }
            SessionMode::Ai => self.generate_reply(&chat_session).await,
        }
    }

    /// Appends a human-operator reply; the store pushes it to any open
    /// client. `None` when the session is unknown or closed.
    pub async fn staff_reply(
        &self,
        session_id: &str,
        content: &str,
    ) -> anyhow::Result<Option<ChatMessage>> {
        let Some(chat_session) = self.store.get_session(session_id).await? else {
            return Ok(None);
        };
        if chat_session.is_closed() {
            return Ok(None);
        }

        let message = ChatMessage {
            id: session::new_message_id(),
            session_id: session_id.to_owned(),
            role: ChatRole::Assistant,
            origin: MessageOrigin::HumanOperator,
            content: content.to_owned(),
            timestamp: self.clock.now(),
        };
        self.store.append_message(message.clone()).await?;
        info!(%session_id, "staff reply recorded");
        Ok(Some(message))
    }

    pub async fn close_session(&self, session_id: &str) -> anyhow::Result<bool> {
        let closed = self.store.close_session(session_id).await?;
        if closed {
            self.limiters.lock().await.remove(session_id);
        }
        Ok(closed)
    }

    /// Advisory probe for the session's limiter.
    pub async fn limit_status(&self, session_id: &str) -> LimitStatus {
        let mut limiters = self.limiters.lock().await;
        match limiters.get_mut(session_id) {
            Some(limiter) => LimitStatus {
                allowed: limiter.check_limit(),
                remaining_attempts: limiter.remaining_attempts(),
                retry_after: limiter
                    .time_until_reset()
                    .map(|left| format_time_remaining(left.as_millis() as u64)),
            },
            None => LimitStatus {
                allowed: true,
                remaining_attempts: self.limit_config.max_attempts,
                retry_after: None,
            },
        }
    }

    // Ok(None) when the attempt may proceed; Ok(Some(retry_after)) when
    // rate limited.
    async fn try_record_attempt(&self, session_id: &str) -> anyhow::Result<Option<String>> {
        let mut limiters = self.limiters.lock().await;
        let limiter = match limiters.entry(session_id.to_owned()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(RateLimiter::new(
                self.limit_config.clone(),
                self.clock.clone(),
            )?),
        };
        if limiter.record_attempt() {
            return Ok(None);
        }
        let left = limiter
            .time_until_reset()
            .unwrap_or(self.limit_config.cooldown);
        Ok(Some(format_time_remaining(left.as_millis() as u64)))
    }

    async fn generate_reply(&self, chat_session: &ChatSessionRecord) -> anyhow::Result<SendOutcome> {
        let history = self
            .store
            .list_messages(&chat_session.session_id, HISTORY_LIMIT)
            .await?;
        let mut transcript = Transcript::new();
        for message in history {
            transcript.push(message);
        }

        let request = ReplyRequest {
            messages: transcript
                .messages()
                .iter()
                .map(|message| ReplyMessage {
                    role: message.role,
                    content: message.content.clone(),
                })
                .collect(),
            language: chat_session.language.clone(),
            session_id: chat_session.session_id.clone(),
        };

        let text = match self.reply.generate(request).await {
            Ok(text) => text,
            Err(error) if error.is_recoverable() => {
                warn!(session_id = %chat_session.session_id, %error, "reply service failed, using fallback");
                fallback_text(&chat_session.language)
            }
            Err(error) => {
                warn!(session_id = %chat_session.session_id, %error, "reply request rejected");
                return Ok(SendOutcome::Rejected {
                    reason: error.to_string(),
                });
            }
        };

        let message = ChatMessage {
            id: session::new_message_id(),
            session_id: chat_session.session_id.clone(),
            role: ChatRole::Assistant,
            origin: MessageOrigin::GeneratedReply,
            content: text,
            timestamp: self.clock.now(),
        };
        self.store.append_message(message.clone()).await?;
        Ok(SendOutcome::Replied { message })
    }

    // Welcome and acknowledgment texts never reach the store; they get
    // local ids so a client transcript can still dedup them.
    fn transient_message(&self, chat_session: &ChatSessionRecord, content: String) -> ChatMessage {
        ChatMessage {
            id: session::new_transient_id(),
            session_id: chat_session.session_id.clone(),
            role: ChatRole::Assistant,
            origin: match chat_session.mode {
                SessionMode::Human => MessageOrigin::HumanOperator,
                SessionMode::Ai => MessageOrigin::GeneratedReply,
            },
            content,
            timestamp: self.clock.now(),
        }
    }
}

fn is_chinese(language: &str) -> bool {
    language.starts_with("zh")
}

fn welcome_text(mode: SessionMode, language: &str) -> String {
    match (mode, is_chinese(language)) {
        (SessionMode::Human, true) => "您好！欢迎咨询，客服在线，请问有什么可以帮您？".to_owned(),
        (SessionMode::Human, false) => {
            "Hello! Our support team is online. How can we help you today?".to_owned()
        }
        (SessionMode::Ai, true) => {
            "您好！现在是非工作时间，智能助手为您服务，请问有什么可以帮您？".to_owned()
        }
        (SessionMode::Ai, false) => {
            "Hello! Our team is currently offline, but our assistant is here to help. What can we do for you?"
                .to_owned()
        }
    }
}

fn queued_ack_text(language: &str) -> String {
    if is_chinese(language) {
        "已收到您的消息，客服人员会尽快回复您。".to_owned()
    } else {
        "Thanks for your message. An operator will respond shortly.".to_owned()
    }
}

fn fallback_text(language: &str) -> String {
    if is_chinese(language) {
        "抱歉，智能助手暂时无法回复，请稍后再试或留下您的联系方式。".to_owned()
    } else {
        "Sorry, our assistant is temporarily unavailable. Please try again shortly or leave your contact details."
            .to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    use crate::clock::ManualClock;
    use crate::reply::{MockReplyProvider, ReplyError};
    use crate::store::InMemoryMessageStore;

    use super::*;

    // Monday 09:30 +08.
    fn business_hours_instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 1, 30, 0)
            .single()
            .expect("valid test instant")
    }

    // Saturday 12:00 +08.
    fn weekend_instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 7, 4, 0, 0)
            .single()
            .expect("valid test instant")
    }

    fn limit_config() -> RateLimitConfig {
        RateLimitConfig {
            max_attempts: 3,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(300),
        }
    }

    struct Harness {
        orchestrator: ChatOrchestrator,
        store: Arc<InMemoryMessageStore>,
        clock: Arc<ManualClock>,
    }

    fn harness_with(reply: Arc<dyn ReplyProvider>, at: DateTime<Utc>) -> Harness {
        let store = Arc::new(InMemoryMessageStore::default());
        let clock = Arc::new(ManualClock::starting_at(at));
        let orchestrator = ChatOrchestrator::new(
            reply,
            store.clone(),
            clock.clone(),
            limit_config(),
        )
        .expect("valid config");
        Harness {
            orchestrator,
            store,
            clock,
        }
    }

    fn harness(at: DateTime<Utc>) -> Harness {
        harness_with(Arc::new(MockReplyProvider), at)
    }

    struct FailingProvider;

    #[async_trait]
    impl ReplyProvider for FailingProvider {
        async fn generate(&self, _request: ReplyRequest) -> Result<String, ReplyError> {
            Err(ReplyError::Upstream("connection refused".to_owned()))
        }
    }

    struct RejectingProvider;

    #[async_trait]
    impl ReplyProvider for RejectingProvider {
        async fn generate(&self, _request: ReplyRequest) -> Result<String, ReplyError> {
            Err(ReplyError::SessionRejected("session closed".to_owned()))
        }
    }

    #[tokio::test]
    async fn session_mode_is_human_during_business_hours() {
        let h = harness(business_hours_instant());
        let start = h
            .orchestrator
            .start_session("en")
            .await
            .expect("start session");
        assert_eq!(start.session.mode, SessionMode::Human);
        assert!(start.welcome.id.starts_with("local-"));
        assert!(start.welcome.content.contains("online"));
    }

    #[tokio::test]
    async fn session_mode_is_ai_on_weekends() {
        let h = harness(weekend_instant());
        let start = h
            .orchestrator
            .start_session("zh-CN")
            .await
            .expect("start session");
        assert_eq!(start.session.mode, SessionMode::Ai);
        assert!(start.welcome.content.contains("智能助手"));
    }

    #[tokio::test]
    async fn ai_mode_replies_and_persists_both_sides() {
        let h = harness(weekend_instant());
        let start = h.orchestrator.start_session("en").await.expect("start");
        let session_id = start.session.session_id.clone();

        let outcome = h
            .orchestrator
            .handle_message(&session_id, "do you ship to Europe?")
            .await
            .expect("handle");

        let SendOutcome::Replied { message } = outcome else {
            panic!("expected a generated reply, got {outcome:?}");
        };
        assert_eq!(message.origin, MessageOrigin::GeneratedReply);
        assert!(message.content.contains("do you ship to Europe?"));

        let stored = h.store.list_messages(&session_id, 10).await.expect("list");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].origin, MessageOrigin::Visitor);
        assert_eq!(stored[1].origin, MessageOrigin::GeneratedReply);
    }

    #[tokio::test]
    async fn human_mode_queues_without_calling_the_service() {
        let h = harness(business_hours_instant());
        let start = h.orchestrator.start_session("en").await.expect("start");
        let session_id = start.session.session_id.clone();

        let outcome = h
            .orchestrator
            .handle_message(&session_id, "hello?")
            .await
            .expect("handle");

        let SendOutcome::Queued { acknowledgment } = outcome else {
            panic!("expected a queued acknowledgment, got {outcome:?}");
        };
        assert!(acknowledgment.content.contains("operator"));
        assert!(acknowledgment.id.starts_with("local-"));

        // Only the visitor message is persisted.
        let stored = h.store.list_messages(&session_id, 10).await.expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].origin, MessageOrigin::Visitor);
    }

    #[tokio::test]
    async fn messages_are_rate_limited_per_session() {
        let h = harness(weekend_instant());
        let start = h.orchestrator.start_session("en").await.expect("start");
        let session_id = start.session.session_id.clone();

        for _ in 0..3 {
            let outcome = h
                .orchestrator
                .handle_message(&session_id, "hi")
                .await
                .expect("handle");
            assert!(matches!(outcome, SendOutcome::Replied { .. }));
        }

        let outcome = h
            .orchestrator
            .handle_message(&session_id, "hi again")
            .await
            .expect("handle");
        let SendOutcome::RateLimited { retry_after } = outcome else {
            panic!("expected rate limiting, got {outcome:?}");
        };
        assert_eq!(retry_after, "5m 0s");

        let status = h.orchestrator.limit_status(&session_id).await;
        assert!(!status.allowed);
        assert_eq!(status.remaining_attempts, 0);

        // A second session is unaffected.
        let other = h.orchestrator.start_session("en").await.expect("start");
        let outcome = h
            .orchestrator
            .handle_message(&other.session.session_id, "hi")
            .await
            .expect("handle");
        assert!(matches!(outcome, SendOutcome::Replied { .. }));

        // The cooldown clears on its own.
        h.clock.advance(Duration::from_secs(301));
        let outcome = h
            .orchestrator
            .handle_message(&session_id, "back again")
            .await
            .expect("handle");
        assert!(matches!(outcome, SendOutcome::Replied { .. }));
    }

    #[tokio::test]
    async fn unknown_and_closed_sessions_are_rejected() {
        let h = harness(weekend_instant());
        let outcome = h
            .orchestrator
            .handle_message("nope", "hi")
            .await
            .expect("handle");
        assert!(matches!(outcome, SendOutcome::Rejected { .. }));

        let start = h.orchestrator.start_session("en").await.expect("start");
        let session_id = start.session.session_id.clone();
        assert!(h.orchestrator.close_session(&session_id).await.expect("close"));

        let outcome = h
            .orchestrator
            .handle_message(&session_id, "hi")
            .await
            .expect("handle");
        assert!(matches!(outcome, SendOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn transient_failures_fall_back_and_continue() {
        let h = harness_with(Arc::new(FailingProvider), weekend_instant());
        let start = h.orchestrator.start_session("en").await.expect("start");
        let session_id = start.session.session_id.clone();

        let outcome = h
            .orchestrator
            .handle_message(&session_id, "hello")
            .await
            .expect("handle");
        let SendOutcome::Replied { message } = outcome else {
            panic!("expected a fallback reply, got {outcome:?}");
        };
        assert!(message.content.contains("temporarily unavailable"));

        // The fallback is part of the canonical transcript.
        let stored = h.store.list_messages(&session_id, 10).await.expect("list");
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn session_rejection_is_surfaced_not_retried() {
        let h = harness_with(Arc::new(RejectingProvider), weekend_instant());
        let start = h.orchestrator.start_session("en").await.expect("start");
        let session_id = start.session.session_id.clone();

        let outcome = h
            .orchestrator
            .handle_message(&session_id, "hello")
            .await
            .expect("handle");
        let SendOutcome::Rejected { reason } = outcome else {
            panic!("expected rejection, got {outcome:?}");
        };
        assert!(reason.contains("session closed"));
    }

    #[tokio::test]
    async fn staff_replies_are_pushed_to_subscribers() {
        let h = harness(business_hours_instant());
        let start = h.orchestrator.start_session("en").await.expect("start");
        let session_id = start.session.session_id.clone();
        let mut subscription = h.store.subscribe_staff_replies(&session_id);

        let reply = h
            .orchestrator
            .staff_reply(&session_id, "operator checking in")
            .await
            .expect("staff reply")
            .expect("session exists");
        assert_eq!(reply.origin, MessageOrigin::HumanOperator);

        let pushed = subscription.recv().await.expect("push");
        assert_eq!(pushed.id, reply.id);

        assert!(h
            .orchestrator
            .staff_reply("missing", "anyone?")
            .await
            .expect("staff reply")
            .is_none());
    }
}

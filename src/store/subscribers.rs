use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_stream::Stream;

use crate::types::ChatMessage;

type SubscriberMap = HashMap<String, Vec<(u64, mpsc::UnboundedSender<ChatMessage>)>>;

/// Fan-out of staff replies to open clients, keyed by session id. A
/// plain observer: subscribing registers a channel, dropping the
/// subscription deregisters it, and notify prunes any sender whose
/// receiver is gone.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    inner: Mutex<SubscriberMap>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn subscribe(self: &Arc<Self>, session_id: &str) -> StaffReplySubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .entry(session_id.to_owned())
            .or_default()
            .push((id, sender));

        StaffReplySubscription {
            receiver,
            _guard: SubscriptionGuard {
                registry: self.clone(),
                session_id: session_id.to_owned(),
                id,
            },
        }
    }

    /// Deliver a staff reply to every subscriber of its session.
    pub fn notify(&self, message: &ChatMessage) {
        let mut map = self.lock();
        if let Some(subscribers) = map.get_mut(&message.session_id) {
            subscribers.retain(|(_, sender)| sender.send(message.clone()).is_ok());
            if subscribers.is_empty() {
                map.remove(&message.session_id);
            }
        }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.lock().get(session_id).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, SubscriberMap> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn unsubscribe(&self, session_id: &str, id: u64) {
        let mut map = self.lock();
        if let Some(subscribers) = map.get_mut(session_id) {
            subscribers.retain(|(entry_id, _)| *entry_id != id);
            if subscribers.is_empty() {
                map.remove(session_id);
            }
        }
    }
}

/// Live feed of staff replies for one session. Dropping it
/// unsubscribes.
#[derive(Debug)]
pub struct StaffReplySubscription {
    receiver: mpsc::UnboundedReceiver<ChatMessage>,
    _guard: SubscriptionGuard,
}

impl StaffReplySubscription {
    pub async fn recv(&mut self) -> Option<ChatMessage> {
        self.receiver.recv().await
    }
}

impl Stream for StaffReplySubscription {
    type Item = ChatMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[derive(Debug)]
struct SubscriptionGuard {
    registry: Arc<SubscriberRegistry>,
    session_id: String,
    id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.session_id, self.id);
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use wetalk_directory::UserId;

use crate::message::Message;

/// Registration handle for one store subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Notification published after one append becomes visible to readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreUpdate {
    pub peer: UserId,
    pub message: Message,
}

type Subscriber = Arc<dyn Fn(&StoreUpdate) + Send + Sync>;

#[derive(Default)]
struct StoreInner {
    conversations: HashMap<UserId, Vec<Message>>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription_id: u64,
}

/// Conversation-keyed message state shared by the reconciler, the send
/// pipeline, and the view projection.
///
/// Cloning clones the handle, not the state. Sequences are append-only and
/// never reorder; duplicate message ids are kept as-is. Subscribers are
/// invoked outside the internal lock, so a callback may re-enter the store.
#[derive(Clone, Default)]
pub struct ConversationStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Nothing runs user code while the lock is held, so a poisoned lock can
    // only carry a map that is still structurally sound.
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Messages for `peer` in append order; empty if the peer is unknown.
    pub fn get(&self, peer: UserId) -> Vec<Message> {
        self.lock()
            .conversations
            .get(&peer)
            .cloned()
            .unwrap_or_default()
    }

    /// Peers that currently have a conversation entry.
    pub fn peers(&self) -> Vec<UserId> {
        let mut peers: Vec<UserId> = self.lock().conversations.keys().copied().collect();
        peers.sort_unstable();
        peers
    }

    /// Appends at the tail of `peer`'s sequence, creating it if absent, then
    /// notifies every live subscriber.
    pub fn append(&self, peer: UserId, message: Message) {
        let (update, subscribers) = {
            let mut inner = self.lock();
            inner
                .conversations
                .entry(peer)
                .or_default()
                .push(message.clone());
            let subscribers: Vec<Subscriber> = inner
                .subscribers
                .iter()
                .map(|(_, subscriber)| Arc::clone(subscriber))
                .collect();
            (StoreUpdate { peer, message }, subscribers)
        };

        for subscriber in subscribers {
            subscriber(&update);
        }
    }

    /// Registers a callback fired once per append, after the mutation is
    /// visible.
    pub fn subscribe(
        &self,
        callback: impl Fn(&StoreUpdate) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut inner = self.lock();
        let id = SubscriptionId(inner.next_subscription_id);
        inner.next_subscription_id += 1;
        inner.subscribers.push((id, Arc::new(callback)));
        id
    }

    /// Removes a subscription; returns whether it was still registered.
    ///
    /// The callback never fires for appends that start after removal.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(existing, _)| *existing != id);
        inner.subscribers.len() != before
    }
}

use futures::StreamExt;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use wetalk_directory::UserId;
use wetalk_transport::{
    EVENT_MESSAGE, Frame, MessagePayload, PayloadKind, TransportEvent, TransportEventStream,
};

use crate::message::{Message, MessageId, MessageKind};
use crate::store::ConversationStore;

/// Connectivity as observed through the inbound stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

/// Translates inbound transport events into store appends.
///
/// Malformed events are dropped with a warning; the worker itself only ends
/// on [`ReconcilerHandle::stop`] or when the transport stream is gone.
pub struct Reconciler {
    store: ConversationStore,
    local_user: UserId,
}

impl Reconciler {
    pub fn new(store: ConversationStore, local_user: UserId) -> Self {
        Self { store, local_user }
    }

    /// Consumes the inbound stream and spawns the reconcile worker.
    ///
    /// The transport arrives already connected, so link status starts out
    /// [`LinkStatus::Connected`].
    pub fn start(self, events: TransportEventStream) -> ReconcilerHandle {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (status_tx, status_rx) = watch::channel(LinkStatus::Connected);
        let worker = tokio::spawn(Self::run_worker(
            self.store,
            self.local_user,
            events,
            status_tx,
            cancel_rx,
        ));

        ReconcilerHandle {
            cancel: Some(cancel_tx),
            status: status_rx,
            worker: Some(worker),
        }
    }

    async fn run_worker(
        store: ConversationStore,
        local_user: UserId,
        mut events: TransportEventStream,
        status_tx: watch::Sender<LinkStatus>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                // Stop must win over queued events, so poll order matters.
                biased;
                _ = &mut cancel_rx => {
                    tracing::debug!(user = %local_user, "reconciler stopped");
                    break;
                }
                next_event = events.next() => {
                    match next_event {
                        Some(event) => Self::apply_event(&store, local_user, event, &status_tx),
                        None => {
                            tracing::debug!(user = %local_user, "inbound stream ended");
                            let _ = status_tx.send(LinkStatus::Disconnected);
                            break;
                        }
                    }
                }
            }
        }
    }

    fn apply_event(
        store: &ConversationStore,
        local_user: UserId,
        event: TransportEvent,
        status_tx: &watch::Sender<LinkStatus>,
    ) {
        match event {
            TransportEvent::Connected => {
                let _ = status_tx.send(LinkStatus::Connected);
            }
            TransportEvent::Disconnected { reason } => {
                // The transport owns reconnection; reconciliation just resumes
                // once events flow again.
                tracing::warn!(reason = %reason, "transport link lost");
                let _ = status_tx.send(LinkStatus::Disconnected);
            }
            TransportEvent::Frame(frame) => Self::apply_frame(store, local_user, frame),
        }
    }

    fn apply_frame(store: &ConversationStore, local_user: UserId, frame: Frame) {
        if frame.event != EVENT_MESSAGE {
            tracing::debug!(event = %frame.event, "ignoring frame with unhandled event kind");
            return;
        }

        let payload = match serde_json::from_value::<MessagePayload>(frame.payload) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(error = %error, "dropping malformed message payload");
                return;
            }
        };

        let message = message_from_payload(&payload);
        if message.from != local_user && message.to != local_user {
            tracing::debug!(
                from = %message.from,
                to = %message.to,
                "message names neither side as this user; keying by sender"
            );
        }

        store.append(message.peer_for(local_user), message);
    }
}

/// Scoped handle for the reconcile worker. Dropping it stops the worker.
pub struct ReconcilerHandle {
    cancel: Option<oneshot::Sender<()>>,
    status: watch::Receiver<LinkStatus>,
    worker: Option<JoinHandle<()>>,
}

impl ReconcilerHandle {
    /// Watch side of the link status republished from transport events.
    pub fn link_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    /// Signals the worker to stop and waits for it to finish.
    ///
    /// Once this returns, no further event reaches the store.
    pub async fn stop(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

fn message_from_payload(payload: &MessagePayload) -> Message {
    Message::new(
        MessageId::new(payload.id),
        UserId::new(payload.from),
        UserId::new(payload.to),
        kind_from_wire(payload.kind),
        payload.content.clone(),
    )
}

// Wire kinds map one-to-one onto domain kinds; keeping the conversion
// explicit here keeps transport types out of the domain model.
fn kind_from_wire(kind: PayloadKind) -> MessageKind {
    match kind {
        PayloadKind::PlainText => MessageKind::PlainText,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use wetalk_transport::ChannelTransport;

    use super::*;
    use crate::store::StoreUpdate;

    const WAIT: Duration = Duration::from_secs(2);

    fn payload(id: u64, from: u64, to: u64, content: &str) -> MessagePayload {
        MessagePayload {
            id,
            from,
            to,
            kind: PayloadKind::PlainText,
            content: content.to_string(),
        }
    }

    fn updates(store: &ConversationStore) -> mpsc::UnboundedReceiver<StoreUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        store.subscribe(move |update| {
            let _ = tx.send(update.clone());
        });
        rx
    }

    async fn next_update(rx: &mut mpsc::UnboundedReceiver<StoreUpdate>) -> StoreUpdate {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("append within deadline")
            .expect("store subscription alive")
    }

    #[tokio::test]
    async fn inbound_message_lands_under_the_sender_key() {
        let store = ConversationStore::new();
        let mut appended = updates(&store);
        let (_transport, events, remote) = ChannelTransport::pair();
        let handle = Reconciler::new(store.clone(), UserId::new(3)).start(events);

        remote
            .deliver_message(&payload(1, 7, 3, "hi"))
            .expect("deliver");
        let update = next_update(&mut appended).await;

        assert_eq!(update.peer, UserId::new(7));
        let stored = store.get(UserId::new(7));
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "hi");
        assert_eq!(stored[0].id, MessageId::new(1));

        handle.stop().await;
    }

    #[tokio::test]
    async fn echo_of_own_message_lands_under_the_recipient_key() {
        let store = ConversationStore::new();
        let mut appended = updates(&store);
        let (_transport, events, remote) = ChannelTransport::pair();
        let handle = Reconciler::new(store.clone(), UserId::new(3)).start(events);

        remote
            .deliver_message(&payload(5, 3, 7, "sent from here"))
            .expect("deliver");
        let update = next_update(&mut appended).await;

        assert_eq!(update.peer, UserId::new(7));
        assert!(store.get(UserId::new(3)).is_empty());

        handle.stop().await;
    }

    #[tokio::test]
    async fn malformed_payloads_are_dropped_and_the_worker_survives() {
        let store = ConversationStore::new();
        let mut appended = updates(&store);
        let (_transport, events, remote) = ChannelTransport::pair();
        let handle = Reconciler::new(store.clone(), UserId::new(3)).start(events);

        // Missing `content`, wrong payload shape, and an unknown event kind.
        remote
            .deliver(TransportEvent::Frame(Frame::new(
                EVENT_MESSAGE,
                serde_json::json!({ "id": 1, "from": 7, "to": 3, "kind": "plain_text" }),
            )))
            .expect("deliver");
        remote
            .deliver(TransportEvent::Frame(Frame::new(
                EVENT_MESSAGE,
                serde_json::json!("not an object"),
            )))
            .expect("deliver");
        remote
            .deliver(TransportEvent::Frame(Frame::new(
                "typing",
                serde_json::json!({ "from": 7 }),
            )))
            .expect("deliver");
        remote
            .deliver_message(&payload(2, 7, 3, "still alive"))
            .expect("deliver");

        let update = next_update(&mut appended).await;
        assert_eq!(update.message.content, "still alive");
        assert_eq!(store.get(UserId::new(7)).len(), 1);

        handle.stop().await;
    }

    #[tokio::test]
    async fn no_append_happens_after_stop_returns() {
        let store = ConversationStore::new();
        let mut appended = updates(&store);
        let (_transport, events, remote) = ChannelTransport::pair();
        let handle = Reconciler::new(store.clone(), UserId::new(3)).start(events);

        remote
            .deliver_message(&payload(1, 7, 3, "before stop"))
            .expect("deliver");
        next_update(&mut appended).await;

        handle.stop().await;

        // Stop releases the subscription: the worker dropped the inbound
        // stream, so the remote cannot reach this client anymore.
        assert!(remote.deliver_message(&payload(2, 7, 3, "after stop")).is_err());

        let stored = store.get(UserId::new(7));
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "before stop");
    }

    #[tokio::test]
    async fn link_status_follows_transport_connectivity() {
        let store = ConversationStore::new();
        let (_transport, events, remote) = ChannelTransport::pair();
        let handle = Reconciler::new(store, UserId::new(3)).start(events);
        let mut status = handle.link_status();

        assert_eq!(*status.borrow(), LinkStatus::Connected);

        remote
            .deliver(TransportEvent::Disconnected {
                reason: "server went away".to_string(),
            })
            .expect("deliver");
        tokio::time::timeout(WAIT, status.changed())
            .await
            .expect("status change within deadline")
            .expect("status channel alive");
        assert_eq!(*status.borrow(), LinkStatus::Disconnected);

        remote
            .deliver(TransportEvent::Connected)
            .expect("deliver");
        tokio::time::timeout(WAIT, status.changed())
            .await
            .expect("status change within deadline")
            .expect("status channel alive");
        assert_eq!(*status.borrow(), LinkStatus::Connected);

        handle.stop().await;
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_the_worker() {
        let store = ConversationStore::new();
        let mut appended = updates(&store);
        let (_transport, events, remote) = ChannelTransport::pair();
        let handle = Reconciler::new(store.clone(), UserId::new(3)).start(events);

        remote
            .deliver_message(&payload(1, 7, 3, "first"))
            .expect("deliver");
        next_update(&mut appended).await;

        drop(handle);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Cancellation polls first, so even a racing delivery never lands.
        let _ = remote.deliver_message(&payload(2, 7, 3, "second"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.get(UserId::new(7)).len(), 1);
    }
}

use tokio::sync::mpsc;

use crate::link::{
    ChannelClosedSnafu, Transport, TransportEvent, TransportEventStream, TransportResult,
};
use crate::wire::{Frame, MessagePayload};

/// Client half of an in-process transport link.
///
/// Stands in for the socket collaborator in tests and demos: outbound frames
/// land at the paired [`RemoteEnd`], inbound events come from it.
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<Frame>,
}

impl ChannelTransport {
    /// Builds a connected client/remote pair plus the client's inbound stream.
    pub fn pair() -> (Self, TransportEventStream, RemoteEnd) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let transport = Self {
            outbound: outbound_tx,
        };
        let events = TransportEventStream::new(inbound_rx);
        let remote = RemoteEnd {
            inbound: inbound_tx,
            sent: outbound_rx,
        };

        (transport, events, remote)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: Frame) -> TransportResult<()> {
        self.outbound.send(frame).map_err(|_| {
            ChannelClosedSnafu {
                stage: "channel-send",
            }
            .build()
        })
    }
}

/// Server side of the in-process link: injects inbound events and captures
/// outbound frames.
pub struct RemoteEnd {
    inbound: mpsc::UnboundedSender<TransportEvent>,
    sent: mpsc::UnboundedReceiver<Frame>,
}

impl RemoteEnd {
    /// Delivers a raw transport event to the client's inbound stream.
    pub fn deliver(&self, event: TransportEvent) -> TransportResult<()> {
        self.inbound.send(event).map_err(|_| {
            ChannelClosedSnafu {
                stage: "channel-deliver",
            }
            .build()
        })
    }

    /// Delivers one chat message frame.
    pub fn deliver_message(&self, payload: &MessagePayload) -> TransportResult<()> {
        let frame = Frame::encode_message(payload)?;
        self.deliver(TransportEvent::Frame(frame))
    }

    /// Next frame the client emitted, in send order.
    pub async fn next_sent(&mut self) -> Option<Frame> {
        self.sent.recv().await
    }

    /// Next emitted frame if one is already queued.
    pub fn try_next_sent(&mut self) -> Option<Frame> {
        self.sent.try_recv().ok()
    }
}

impl Drop for RemoteEnd {
    fn drop(&mut self) {
        tracing::debug!("remote end of channel transport dropped; link is gone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::TransportError;
    use crate::wire::{PayloadKind, SendPayload};

    fn message(id: u64, from: u64, to: u64, content: &str) -> MessagePayload {
        MessagePayload {
            id,
            from,
            to,
            kind: PayloadKind::PlainText,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn inbound_events_arrive_in_delivery_order() {
        let (_transport, mut events, remote) = ChannelTransport::pair();

        remote
            .deliver_message(&message(1, 7, 3, "first"))
            .expect("deliver first");
        remote
            .deliver_message(&message(2, 7, 3, "second"))
            .expect("deliver second");

        let first = events.recv().await.expect("first event");
        let second = events.recv().await.expect("second event");
        match (first, second) {
            (TransportEvent::Frame(first), TransportEvent::Frame(second)) => {
                assert_eq!(first.payload["content"], "first");
                assert_eq!(second.payload["content"], "second");
            }
            other => panic!("expected two message frames, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn outbound_frames_are_captured_at_the_remote() {
        let (transport, _events, mut remote) = ChannelTransport::pair();

        let frame = Frame::encode_send(&SendPayload {
            to: 7,
            kind: PayloadKind::PlainText,
            content: "hello".to_string(),
        })
        .expect("encode send");
        transport.send(frame.clone()).expect("send frame");

        assert_eq!(remote.next_sent().await, Some(frame));
        assert!(remote.try_next_sent().is_none());
    }

    #[tokio::test]
    async fn send_after_remote_drop_reports_channel_closed() {
        let (transport, _events, remote) = ChannelTransport::pair();
        drop(remote);

        let frame = Frame::new("send", serde_json::json!({}));
        let error = transport.send(frame).expect_err("link is gone");
        assert!(matches!(error, TransportError::ChannelClosed { .. }));
    }

    #[tokio::test]
    async fn stream_ends_once_the_remote_is_gone() {
        let (_transport, mut events, remote) = ChannelTransport::pair();
        remote.deliver(TransportEvent::Connected).expect("deliver");
        drop(remote);

        assert_eq!(events.recv().await, Some(TransportEvent::Connected));
        assert_eq!(events.recv().await, None);
    }
}

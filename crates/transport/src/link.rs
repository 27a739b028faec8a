use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use snafu::Snafu;
use tokio::sync::mpsc;

use crate::wire::Frame;

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("transport channel closed on `{stage}`"))]
    ChannelClosed { stage: &'static str },
    #[snafu(display("failed to encode outbound payload on `{stage}`: {source}"))]
    EncodePayload {
        stage: &'static str,
        source: serde_json::Error,
    },
}

/// Connectivity and delivery events observed on the inbound side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(Frame),
    Connected,
    Disconnected { reason: String },
}

/// Fire-and-forget send primitive over the persistent channel.
///
/// Implementations own their delivery policy while disconnected (drop or
/// queue); callers never await an acknowledgement.
pub trait Transport: Send + Sync {
    fn send(&self, frame: Frame) -> TransportResult<()>;
}

/// Owned inbound half of the channel.
///
/// Yields events in delivery order and ends when the producing side goes
/// away for good.
pub struct TransportEventStream {
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportEventStream {
    pub(crate) fn new(events: mpsc::UnboundedReceiver<TransportEvent>) -> Self {
        Self { events }
    }

    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.events.try_recv().ok()
    }
}

impl Stream for TransportEventStream {
    type Item = TransportEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

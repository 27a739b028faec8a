/// In-process channel-backed transport pair for tests and demos.
pub mod channel;
/// Send primitive, inbound event stream, and transport errors.
pub mod link;
/// Wire frame and payload contracts.
pub mod wire;

pub use channel::{ChannelTransport, RemoteEnd};
pub use link::{Transport, TransportError, TransportEvent, TransportEventStream, TransportResult};
pub use wire::{EVENT_MESSAGE, EVENT_SEND, Frame, MessagePayload, PayloadKind, SendPayload};

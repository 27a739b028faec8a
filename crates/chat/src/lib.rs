#![deny(unsafe_code)]

//! Client-side message synchronization core for one-to-one chat.
//!
//! The pipeline is transport → [`reconciler`] → [`store`] → [`projection`] →
//! presentation, with [`composer`] as the outbound path. [`session`] wires the
//! pieces together the way a host application would.

/// Outbound send pipeline: draft, validation, emission.
pub mod composer;
/// Immutable message entity and typed identifiers.
pub mod message;
/// Read-only derivation of presentation rows plus the scroll cue.
pub mod projection;
/// Inbound event reconciliation into the store.
pub mod reconciler;
pub mod session;
pub mod settings;
/// Conversation-keyed observable message state.
pub mod store;

pub use composer::{ComposeError, ComposeResult, DraftComposer};
pub use message::{Message, MessageId, MessageKind};
pub use projection::{ProjectedMessage, ScrollCue, project_messages};
pub use reconciler::{LinkStatus, Reconciler, ReconcilerHandle};
pub use session::{ChatSession, ConversationSnapshot};
pub use settings::{ClientSettings, SettingsError, SettingsStore};
pub use store::{ConversationStore, StoreUpdate, SubscriptionId};

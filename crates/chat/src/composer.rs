use std::sync::Arc;

use snafu::Snafu;
use wetalk_directory::UserId;
use wetalk_transport::{Frame, PayloadKind, SendPayload, Transport};

use crate::message::{Message, MessageId};
use crate::store::ConversationStore;

pub type ComposeResult<T> = Result<T, ComposeError>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum ComposeError {
    #[snafu(display("message content must not be empty"))]
    EmptyDraft,
    #[snafu(display("no conversation is selected"))]
    NoPeerSelected,
}

/// Outbound send pipeline bound to one target peer.
///
/// Owns the transient draft. A submit either emits exactly one `send` frame
/// and resets the draft, or rejects validation and leaves the draft alone.
/// Emission is fire-and-forget: transport failures are logged, never
/// surfaced, and never retried.
pub struct DraftComposer {
    transport: Arc<dyn Transport>,
    store: ConversationStore,
    local_user: UserId,
    peer: UserId,
    draft: String,
    validation_error: Option<ComposeError>,
    local_echo: bool,
    next_echo_sequence: u64,
}

impl DraftComposer {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: ConversationStore,
        local_user: UserId,
        peer: UserId,
    ) -> Self {
        Self {
            transport,
            store,
            local_user,
            peer,
            draft: String::new(),
            validation_error: None,
            local_echo: false,
            next_echo_sequence: 0,
        }
    }

    /// Enables the optimistic local-echo append after each emission.
    pub fn with_local_echo(mut self, enabled: bool) -> Self {
        self.local_echo = enabled;
        self
    }

    /// The peer this composer was bound to at selection time.
    pub fn peer(&self) -> UserId {
        self.peer
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, content: impl Into<String>) {
        self.draft = content.into();
    }

    /// Validation outcome of the most recent submit, if it was rejected.
    pub fn validation_error(&self) -> Option<&ComposeError> {
        self.validation_error.as_ref()
    }

    /// Validates and emits the current draft.
    ///
    /// Whitespace-only drafts are rejected and preserved. Accepted drafts are
    /// trimmed, emitted once, and reset to empty before any delivery outcome
    /// is known.
    pub fn submit(&mut self) -> ComposeResult<()> {
        let content = self.draft.trim();
        if content.is_empty() {
            self.validation_error = Some(ComposeError::EmptyDraft);
            return Err(ComposeError::EmptyDraft);
        }
        let content = content.to_string();

        let payload = SendPayload {
            to: self.peer.0,
            kind: PayloadKind::PlainText,
            content: content.clone(),
        };
        if let Err(error) =
            Frame::encode_send(&payload).and_then(|frame| self.transport.send(frame))
        {
            // Indistinguishable, from here, from a message the network
            // dropped after emission.
            tracing::warn!(peer = %self.peer, error = %error, "fire-and-forget send failed");
        }

        if self.local_echo {
            let echo = Message::plain_text(
                MessageId::local_echo(self.next_echo_sequence),
                self.local_user,
                self.peer,
                content,
            );
            self.next_echo_sequence += 1;
            self.store.append(self.peer, echo);
        }

        self.draft.clear();
        self.validation_error = None;
        Ok(())
    }
}

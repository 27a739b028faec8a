use wetalk_directory::UserId;

/// High bit reserved for ids minted locally by the send pipeline.
///
/// Transport-assigned ids never carry this bit, so the two ranges cannot
/// collide.
pub const LOCAL_ECHO_ID_BIT: u64 = 1 << 63;

/// Stable identifier for one message, assigned by the server/transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Creates a typed message identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Mints an id for an optimistic local-echo copy.
    pub const fn local_echo(sequence: u64) -> Self {
        Self(LOCAL_ECHO_ID_BIT | sequence)
    }

    /// Whether this id came from the local-echo range.
    pub const fn is_local_echo(&self) -> bool {
        self.0 & LOCAL_ECHO_ID_BIT != 0
    }
}

/// Message content kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    PlainText,
}

/// Core immutable message entity.
///
/// Created when received from the transport or constructed locally for
/// sending; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub from: UserId,
    pub to: UserId,
    pub kind: MessageKind,
    pub content: String,
}

impl Message {
    /// Creates a message with an explicit kind.
    pub fn new(
        id: MessageId,
        from: UserId,
        to: UserId,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            from,
            to,
            kind,
            content: content.into(),
        }
    }

    /// Creates a plain-text message.
    pub fn plain_text(
        id: MessageId,
        from: UserId,
        to: UserId,
        content: impl Into<String>,
    ) -> Self {
        Self::new(id, from, to, MessageKind::PlainText, content)
    }

    /// Conversation key for this message as seen by `local_user`.
    ///
    /// A message sent by the local user (an echo) files under its recipient;
    /// anything else files under its sender.
    pub fn peer_for(&self, local_user: UserId) -> UserId {
        if self.from == local_user {
            self.to
        } else {
            self.from
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_of_own_message_files_under_recipient() {
        let me = UserId::new(3);
        let peer = UserId::new(7);
        let echoed = Message::plain_text(MessageId::new(1), me, peer, "hi");

        assert_eq!(echoed.peer_for(me), peer);
    }

    #[test]
    fn inbound_message_files_under_sender() {
        let me = UserId::new(3);
        let peer = UserId::new(7);
        let inbound = Message::plain_text(MessageId::new(1), peer, me, "hi");

        assert_eq!(inbound.peer_for(me), peer);
    }

    #[test]
    fn local_echo_ids_stay_out_of_the_transport_range() {
        let minted = MessageId::local_echo(5);

        assert!(minted.is_local_echo());
        assert_ne!(minted, MessageId::new(5));
        assert!(!MessageId::new(5).is_local_echo());
    }
}

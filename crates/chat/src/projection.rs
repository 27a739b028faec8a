use wetalk_directory::{ContactDirectory, UserId, UserProfile};

use crate::message::{Message, MessageId};

/// One presentation row: the message plus its resolved sender.
///
/// `receive` is true when the session user authored the message, i.e. the
/// row renders on the "my messages" side. `profile` may be empty when the
/// directory cannot resolve the sender; the presentation substitutes a
/// placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedMessage {
    pub message: Message,
    pub profile: Option<UserProfile>,
    pub receive: bool,
}

/// Derives the presentation rows for one peer's sequence, in store order.
///
/// Read-only: neither the store nor the directory is mutated.
pub fn project_messages(
    messages: &[Message],
    directory: &dyn ContactDirectory,
) -> Vec<ProjectedMessage> {
    let current_user = directory.current_user();

    messages
        .iter()
        .map(|message| {
            let sent_by_session_user = current_user
                .as_ref()
                .is_some_and(|user| user.id == message.from);
            let profile = if sent_by_session_user {
                current_user.clone()
            } else {
                directory.contact(message.from)
            };

            ProjectedMessage {
                message: message.clone(),
                profile,
                receive: sent_by_session_user,
            }
        })
        .collect()
}

/// Fires the scroll-to-latest signal exactly once per list change.
///
/// A change is a different selected peer or a different tail; the tail is
/// tracked as (last id, length) so a redelivered duplicate id still counts.
#[derive(Debug, Clone, Default)]
pub struct ScrollCue {
    last_observed: Option<(UserId, Option<MessageId>, usize)>,
}

impl ScrollCue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes the currently projected list; true means "scroll now".
    pub fn observe(&mut self, peer: UserId, messages: &[Message]) -> bool {
        let observed = (peer, messages.last().map(|message| message.id), messages.len());
        if self.last_observed == Some(observed) {
            return false;
        }

        self.last_observed = Some(observed);
        true
    }

    /// Forgets tracking state, e.g. when the view goes away.
    pub fn reset(&mut self) {
        self.last_observed = None;
    }
}

#[cfg(test)]
mod tests {
    use wetalk_directory::InMemoryDirectory;

    use super::*;

    fn message(id: u64, from: u64, to: u64, content: &str) -> Message {
        Message::plain_text(
            MessageId::new(id),
            UserId::new(from),
            UserId::new(to),
            content,
        )
    }

    fn directory() -> InMemoryDirectory {
        InMemoryDirectory::new()
            .with_current_user(UserProfile::new(UserId::new(3), "me"))
            .with_contact(UserProfile::new(UserId::new(7), "friend"))
    }

    #[test]
    fn receive_flag_follows_the_sender() {
        let directory = directory();
        let messages = [message(1, 7, 3, "from peer"), message(2, 3, 7, "from me")];

        let projected = project_messages(&messages, &directory);

        assert!(!projected[0].receive);
        assert_eq!(projected[0].profile.as_ref().map(|p| p.nickname.as_str()), Some("friend"));
        assert!(projected[1].receive);
        assert_eq!(projected[1].profile.as_ref().map(|p| p.nickname.as_str()), Some("me"));
    }

    #[test]
    fn unknown_sender_projects_without_a_profile() {
        let directory = directory();
        let messages = [message(1, 99, 3, "who?")];

        let projected = project_messages(&messages, &directory);

        assert!(!projected[0].receive);
        assert!(projected[0].profile.is_none());
        assert_eq!(projected[0].message.content, "who?");
    }

    #[test]
    fn missing_session_user_marks_every_row_as_peer_sent() {
        let directory = InMemoryDirectory::new();
        let messages = [message(1, 3, 7, "mine, but nobody is logged in")];

        let projected = project_messages(&messages, &directory);

        assert!(!projected[0].receive);
        assert!(projected[0].profile.is_none());
    }

    #[test]
    fn scroll_cue_fires_once_per_tail_change() {
        let mut cue = ScrollCue::new();
        let peer = UserId::new(7);
        let mut messages = vec![message(1, 7, 3, "one")];

        assert!(cue.observe(peer, &messages));
        assert!(!cue.observe(peer, &messages));

        messages.push(message(2, 7, 3, "two"));
        assert!(cue.observe(peer, &messages));
        assert!(!cue.observe(peer, &messages));
    }

    #[test]
    fn scroll_cue_fires_on_peer_switch_even_with_equal_tails() {
        let mut cue = ScrollCue::new();
        let shared = [message(1, 9, 3, "same tail")];

        assert!(cue.observe(UserId::new(7), &shared));
        assert!(cue.observe(UserId::new(8), &shared));
        assert!(cue.observe(UserId::new(7), &shared));
        assert!(!cue.observe(UserId::new(7), &shared));
    }

    #[test]
    fn scroll_cue_counts_duplicate_tail_ids_by_length() {
        let mut cue = ScrollCue::new();
        let peer = UserId::new(7);
        let mut messages = vec![message(1, 7, 3, "dup")];

        assert!(cue.observe(peer, &messages));
        messages.push(message(1, 7, 3, "dup"));
        assert!(cue.observe(peer, &messages));
    }
}

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier for one user account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Creates a typed user identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Displayable shape a user id resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub nickname: String,
    pub avatar: String,
}

impl UserProfile {
    /// Creates a profile with an empty avatar.
    pub fn new(id: UserId, nickname: impl Into<String>) -> Self {
        Self {
            id,
            nickname: nickname.into(),
            avatar: String::new(),
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = avatar.into();
        self
    }
}

/// Read-only lookup from user ids to displayable profiles.
///
/// Unknown ids resolve to `None`; callers substitute a placeholder instead of
/// treating the gap as an error.
pub trait ContactDirectory: Send + Sync {
    /// Profile of the authenticated session user, when one is known.
    fn current_user(&self) -> Option<UserProfile>;
    /// Profile of a contact by user id.
    fn contact(&self, user_id: UserId) -> Option<UserProfile>;
}

/// Directory backed by a fixed in-memory contact set.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    current: Option<UserProfile>,
    contacts: HashMap<UserId, UserProfile>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_current_user(mut self, profile: UserProfile) -> Self {
        self.current = Some(profile);
        self
    }

    pub fn with_contact(mut self, profile: UserProfile) -> Self {
        self.contacts.insert(profile.id, profile);
        self
    }
}

impl ContactDirectory for InMemoryDirectory {
    fn current_user(&self) -> Option<UserProfile> {
        self.current.clone()
    }

    fn contact(&self, user_id: UserId) -> Option<UserProfile> {
        self.contacts.get(&user_id).cloned()
    }
}

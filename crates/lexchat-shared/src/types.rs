use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DuplicateParticipant;

/// Authenticated user identifier. Opaque; supplied by the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two members of a direct conversation.
///
/// Membership checks are unordered: `{a, b}` and `{b, a}` are the same pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "[UserId; 2]")]
pub struct Participants([UserId; 2]);

impl Participants {
    /// Returns `None` when both sides are the same user.
    pub fn new(a: UserId, b: UserId) -> Option<Self> {
        if a == b {
            return None;
        }
        Some(Self([a, b]))
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.0.iter().any(|p| p == user)
    }

    pub fn is_pair(&self, a: &UserId, b: &UserId) -> bool {
        a != b && self.contains(a) && self.contains(b)
    }

    /// The participant that is not `user`, if `user` is a member.
    pub fn other(&self, user: &UserId) -> Option<&UserId> {
        if !self.contains(user) {
            return None;
        }
        self.0.iter().find(|p| *p != user)
    }

    pub fn as_slice(&self) -> &[UserId; 2] {
        &self.0
    }
}

impl TryFrom<[UserId; 2]> for Participants {
    type Error = DuplicateParticipant;

    fn try_from([a, b]: [UserId; 2]) -> Result<Self, Self::Error> {
        Self::new(a, b).ok_or(DuplicateParticipant)
    }
}

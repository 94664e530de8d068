//! Domain records persisted in the local database.
//!
//! Rows are decoded in a single validating step: a row that does not form a
//! valid record is rejected with [`StoreError::MalformedRecord`] instead of
//! being handed on with placeholder fields.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use lexchat_shared::{ConversationId, MessageId, Participants, UserId};

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A direct-message thread between exactly two users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub participants: Participants,
    /// Base64-encoded 32-byte conversation key. Immutable once written.
    pub secure_key: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Envelope of the most recent message, or empty.
    pub last_message: String,
    pub last_message_sender_id: Option<UserId>,
    pub last_message_timestamp: Option<DateTime<Utc>>,
    pub last_message_was_read: bool,
}

impl ConversationRecord {
    /// A fresh record with empty preview fields.
    pub fn new(
        id: ConversationId,
        participants: Participants,
        secure_key: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            participants,
            secure_key,
            created_at,
            last_message: String::new(),
            last_message_sender_id: None,
            last_message_timestamp: None,
            last_message_was_read: false,
        }
    }

    /// Unread for `user` when someone else wrote the last message and it has
    /// not been seen.
    pub fn is_unread_for(&self, user: &UserId) -> bool {
        match &self.last_message_sender_id {
            Some(sender) => sender != user && !self.last_message_was_read,
            None => false,
        }
    }
}

/// Denormalized "last message" fields written by the sender after each send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationPreview {
    pub last_message: String,
    pub sender_id: Option<UserId>,
    pub timestamp: Option<DateTime<Utc>>,
    pub was_read: bool,
}

impl ConversationPreview {
    pub fn empty() -> Self {
        Self {
            last_message: String::new(),
            sender_id: None,
            timestamp: None,
            was_read: false,
        }
    }

    /// Preview for a message just written by `sender`; unread for the
    /// recipient.
    pub fn for_message(message: &MessageRecord) -> Self {
        Self {
            last_message: message.text.clone(),
            sender_id: Some(message.sender_id.clone()),
            timestamp: Some(message.timestamp),
            was_read: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat turn. `text` is an envelope unless written by the
/// unencrypted fallback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub text: String,
    /// Assigned by the store on insert.
    pub timestamp: DateTime<Utc>,
    pub was_read: bool,
}

/// A message about to be written; the store assigns the timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

// ---------------------------------------------------------------------------
// Row decoding helpers
// ---------------------------------------------------------------------------

/// Fixed-width RFC 3339 so that text ordering equals time ordering.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(id: &str, field: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::MalformedRecord {
            id: id.to_string(),
            reason: format!("{field}: {e}"),
        })
}

/// Conversation row as read from SQLite, before validation.
pub(crate) struct ConversationRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub secure_key: Option<String>,
    pub created_at: String,
    pub last_message: String,
    pub last_message_sender_id: Option<String>,
    pub last_message_timestamp: Option<String>,
    pub last_message_was_read: bool,
}

impl ConversationRow {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            participant_a: row.get(1)?,
            participant_b: row.get(2)?,
            secure_key: row.get(3)?,
            created_at: row.get(4)?,
            last_message: row.get(5)?,
            last_message_sender_id: row.get(6)?,
            last_message_timestamp: row.get(7)?,
            last_message_was_read: row.get(8)?,
        })
    }
}

impl TryFrom<ConversationRow> for ConversationRecord {
    type Error = StoreError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        let malformed = |reason: &str| StoreError::MalformedRecord {
            id: row.id.clone(),
            reason: reason.to_string(),
        };

        if row.participant_a.is_empty() || row.participant_b.is_empty() {
            return Err(malformed("empty participant id"));
        }
        let participants = Participants::new(
            UserId(row.participant_a.clone()),
            UserId(row.participant_b.clone()),
        )
        .ok_or_else(|| malformed("participants are not two distinct users"))?;

        if matches!(&row.secure_key, Some(k) if k.trim().is_empty()) {
            return Err(malformed("empty secure key"));
        }

        let created_at = parse_timestamp(&row.id, "created_at", &row.created_at)?;
        let last_message_timestamp = row
            .last_message_timestamp
            .as_deref()
            .map(|raw| parse_timestamp(&row.id, "last_message_timestamp", raw))
            .transpose()?;

        Ok(Self {
            id: ConversationId(row.id),
            participants,
            secure_key: row.secure_key,
            created_at,
            last_message: row.last_message,
            last_message_sender_id: row.last_message_sender_id.map(UserId),
            last_message_timestamp,
            last_message_was_read: row.last_message_was_read,
        })
    }
}

/// Message row as read from SQLite, before validation.
pub(crate) struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp: String,
    pub was_read: bool,
}

impl MessageRow {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            sender_id: row.get(2)?,
            text: row.get(3)?,
            timestamp: row.get(4)?,
            was_read: row.get(5)?,
        })
    }
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        if row.sender_id.is_empty() {
            return Err(StoreError::MalformedRecord {
                id: row.id,
                reason: "empty sender id".to_string(),
            });
        }
        let timestamp = parse_timestamp(&row.id, "timestamp", &row.timestamp)?;

        Ok(Self {
            id: MessageId(row.id),
            conversation_id: ConversationId(row.conversation_id),
            sender_id: UserId(row.sender_id),
            text: row.text,
            timestamp,
            was_read: row.was_read,
        })
    }
}

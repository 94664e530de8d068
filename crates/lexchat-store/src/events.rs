//! Change feed backing live queries.
//!
//! Every committed mutation publishes one or more [`StoreEvent`]s on a
//! `tokio::sync::broadcast` channel. Subscribers re-run their query when an
//! event concerns them; events carry identifiers only, never record data.

use lexchat_shared::ConversationId;

/// Capacity of the broadcast ring. Slow subscribers see `Lagged` and
/// re-query from scratch.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A conversation record was created or its preview fields changed.
    ConversationChanged(ConversationId),
    /// A conversation record was removed.
    ConversationDeleted(ConversationId),
    /// Messages of a conversation were added or removed.
    MessagesChanged(ConversationId),
}

impl StoreEvent {
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            StoreEvent::ConversationChanged(id)
            | StoreEvent::ConversationDeleted(id)
            | StoreEvent::MessagesChanged(id) => id,
        }
    }

    /// Whether a conversation listing could be affected by this event.
    pub fn affects_listing(&self) -> bool {
        matches!(
            self,
            StoreEvent::ConversationChanged(_) | StoreEvent::ConversationDeleted(_)
        )
    }
}

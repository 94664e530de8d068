use thiserror::Error;

use lexchat_shared::{ConversationId, CryptoError};
use lexchat_store::StoreError;

/// Errors surfaced to the caller of a client operation.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The store read or write failed. Not retried automatically.
    #[error("Transport error: {0}")]
    Transport(#[from] StoreError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("A message is already being sent in this conversation")]
    SendInFlight,

    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    #[error("Invalid participants: {0}")]
    InvalidParticipants(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

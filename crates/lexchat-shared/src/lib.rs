//! # lexchat-shared
//!
//! Types shared by every Lexchat crate: identifiers, constants, error types
//! and the conversation envelope cipher.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod types;

pub use crypto::ConversationKey;
pub use error::{CryptoError, DuplicateParticipant};
pub use types::{ConversationId, MessageId, Participants, UserId};

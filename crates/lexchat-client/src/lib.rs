//! # lexchat-client
//!
//! End-to-end encrypted direct messaging on top of `lexchat-store`.
//!
//! - [`keys`] resolves and provisions per-conversation keys.
//! - [`legacy_keys`] is the cached resolution path used by listings.
//! - [`channel`] is the live, decrypted view of one conversation and its
//!   send path.
//! - [`directory`] lists a user's conversations with decrypted previews.
//! - [`session`] wires them together for one user.

pub mod channel;
pub mod composer;
pub mod config;
pub mod content;
pub mod directory;
pub mod error;
pub mod key_cache;
pub mod keys;
pub mod legacy_keys;
pub mod logging;
pub mod session;
pub mod store;
pub mod subscription;

pub use channel::{DecryptedMessage, MessageChannel, SendOutcome};
pub use composer::MessageComposer;
pub use config::ClientConfig;
pub use content::ContentState;
pub use directory::{ConversationDirectory, ConversationSummary};
pub use error::{ClientError, Result};
pub use logging::{init_tracing, DEFAULT_LOG_FILTER};
pub use session::ChatSession;
pub use store::StoreHandle;
pub use subscription::{Snapshot, Subscription};

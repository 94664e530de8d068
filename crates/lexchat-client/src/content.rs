//! Turning stored message text back into something displayable.

use serde::Serialize;

use lexchat_shared::crypto::{self, looks_like_envelope};
use lexchat_shared::{ConversationKey, CryptoError};

/// How the displayed text of a message was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentState {
    /// Opened with the conversation key.
    Decrypted,
    /// Written in clear by the no-key fallback.
    Unencrypted,
    /// Could not be opened; the text is a placeholder.
    Undecryptable,
}

pub(crate) enum Opened {
    Decrypted(String),
    Unencrypted(String),
    /// `None` when there was ciphertext but no key to try.
    Failed(Option<CryptoError>),
}

/// Open one stored text. Never fails: errors become [`Opened::Failed`] so a
/// bad message cannot abort a batch.
pub(crate) fn open_stored_text(key: Option<&ConversationKey>, stored: &str) -> Opened {
    match key {
        Some(key) => match crypto::decrypt(key, stored) {
            Ok(text) => Opened::Decrypted(text),
            Err(e) => Opened::Failed(Some(e)),
        },
        None if looks_like_envelope(stored) => Opened::Failed(None),
        None => Opened::Unencrypted(stored.to_string()),
    }
}

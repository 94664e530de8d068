//! Cached key resolution for conversation listings.
//!
//! Older clients wrote conversation keys with URL-safe or unpadded base64.
//! This path accepts every variant and remembers the outcome in an injected
//! [`KeyCache`], including conversations known to have no key.

use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use tracing::debug;

use lexchat_shared::{ConversationId, ConversationKey, CryptoError};

use crate::error::Result;
use crate::key_cache::{CachedKey, KeyCache};
use crate::store::StoreHandle;

#[derive(Clone)]
pub struct LegacyKeyResolver {
    store: StoreHandle,
    cache: Arc<KeyCache>,
}

impl LegacyKeyResolver {
    pub fn new(store: StoreHandle, cache: Arc<KeyCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<KeyCache> {
        &self.cache
    }

    /// Resolve a conversation key, serving repeated lookups from the cache.
    ///
    /// Store failures are returned and not cached.
    pub async fn resolve(&self, id: &ConversationId) -> Result<Option<ConversationKey>> {
        if let Some(hit) = self.cache.get(id).await {
            debug!(conversation = %id, "Conversation key served from cache");
            return Ok(hit.into_option());
        }

        let record = self.store.lock().await.get_conversation(id)?;
        let key = match record.and_then(|r| r.secure_key) {
            Some(encoded) => Some(decode_legacy_key(&encoded)?),
            None => None,
        };

        self.cache
            .insert(id.clone(), CachedKey::from(key.clone()))
            .await;
        Ok(key)
    }

    /// Forget a conversation, e.g. after it was deleted.
    pub async fn invalidate(&self, id: &ConversationId) {
        self.cache.invalidate(id).await;
    }
}

/// Decode a stored key written by any client generation.
pub fn decode_legacy_key(encoded: &str) -> std::result::Result<ConversationKey, CryptoError> {
    let encoded = encoded.trim();
    let mut first_error = None;

    for engine in [&STANDARD, &URL_SAFE, &STANDARD_NO_PAD, &URL_SAFE_NO_PAD] {
        match engine.decode(encoded) {
            Ok(bytes) => return ConversationKey::from_slice(&bytes),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    Err(first_error.map_or(CryptoError::Format, CryptoError::Decode))
}

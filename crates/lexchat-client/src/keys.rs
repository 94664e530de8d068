//! Conversation key store.
//!
//! Keys live base64-encoded on the conversation record. Lookups always
//! re-read the record; see [`crate::legacy_keys`] for the cached path.

use chrono::Utc;
use tracing::info;

use lexchat_shared::{ConversationId, ConversationKey, Participants};
use lexchat_store::ConversationRecord;

use crate::error::Result;
use crate::store::StoreHandle;

#[derive(Clone)]
pub struct ConversationKeyStore {
    store: StoreHandle,
}

impl ConversationKeyStore {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// The conversation's key, or `None` when the record is absent or has
    /// no key. Never creates one.
    ///
    /// A key field that does not decode to 32 bytes is an error, not `None`.
    pub async fn get_key(&self, id: &ConversationId) -> Result<Option<ConversationKey>> {
        let record = self.store.lock().await.get_conversation(id)?;

        match record.and_then(|r| r.secure_key) {
            Some(encoded) => Ok(Some(ConversationKey::from_base64(&encoded)?)),
            None => Ok(None),
        }
    }

    /// Create a conversation with a freshly generated key and return its id.
    ///
    /// Does not deduplicate: callers check for an existing conversation
    /// between the same pair first.
    pub async fn create_conversation_with_key(
        &self,
        participants: Participants,
    ) -> Result<ConversationId> {
        let key = ConversationKey::generate();
        let record = ConversationRecord::new(
            ConversationId::new(),
            participants,
            Some(key.to_base64()),
            Utc::now(),
        );

        self.store.lock().await.insert_conversation(&record)?;

        info!(conversation = %record.id, "Conversation created");
        Ok(record.id)
    }
}

#[cfg(test)]
mod tests {
    use lexchat_store::Database;

    use super::*;
    use crate::error::ClientError;

    fn key_store() -> (ConversationKeyStore, StoreHandle) {
        let store = StoreHandle::new(Database::open_in_memory().unwrap());
        (ConversationKeyStore::new(store.clone()), store)
    }

    fn pair() -> Participants {
        Participants::new("alice".into(), "bob".into()).unwrap()
    }

    #[tokio::test]
    async fn test_created_conversation_has_key() {
        let (keys, _) = key_store();
        let id = keys.create_conversation_with_key(pair()).await.unwrap();

        let key = keys.get_key(&id).await.unwrap();
        assert!(key.is_some());
        // Stable across reads.
        assert_eq!(key, keys.get_key(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_conversation_has_no_key() {
        let (keys, _) = key_store();
        assert!(keys.get_key(&"nope".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keyless_record_has_no_key() {
        let (keys, store) = key_store();
        let record = ConversationRecord::new("legacy".into(), pair(), None, Utc::now());
        store.lock().await.insert_conversation(&record).unwrap();

        assert!(keys.get_key(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_key_is_an_error() {
        let (keys, store) = key_store();
        let record = ConversationRecord::new(
            "broken".into(),
            pair(),
            Some("dG9vLXNob3J0".into()),
            Utc::now(),
        );
        store.lock().await.insert_conversation(&record).unwrap();

        assert!(matches!(
            keys.get_key(&record.id).await,
            Err(ClientError::Crypto(_))
        ));
    }

    #[tokio::test]
    async fn test_each_conversation_gets_its_own_key() {
        let (keys, _) = key_store();
        let a = keys.create_conversation_with_key(pair()).await.unwrap();
        let b = keys.create_conversation_with_key(pair()).await.unwrap();

        assert_ne!(a, b);
        assert_ne!(
            keys.get_key(&a).await.unwrap(),
            keys.get_key(&b).await.unwrap()
        );
    }
}

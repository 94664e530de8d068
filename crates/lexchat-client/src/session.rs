//! One authenticated user's view of the store.
//!
//! A [`ChatSession`] wires the configuration, the shared store handle and
//! the legacy key cache together and hands out the per-view components.

use std::sync::Arc;

use tracing::info;

use lexchat_shared::{ConversationId, UserId};
use lexchat_store::{ConversationRecord, Database};

use crate::channel::MessageChannel;
use crate::composer::MessageComposer;
use crate::config::ClientConfig;
use crate::directory::ConversationDirectory;
use crate::error::{ClientError, Result};
use crate::key_cache::KeyCache;
use crate::keys::ConversationKeyStore;
use crate::legacy_keys::LegacyKeyResolver;
use crate::store::StoreHandle;

pub struct ChatSession {
    user: UserId,
    config: ClientConfig,
    store: StoreHandle,
    directory: ConversationDirectory,
}

impl ChatSession {
    /// Open the configured database and start a session for `user`.
    pub fn open(config: ClientConfig, user: UserId) -> Result<Self> {
        let db = match &config.db_path {
            Some(path) => {
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir).map_err(lexchat_store::StoreError::from)?;
                }
                Database::open_at(path)?
            }
            None => Database::open_default()?,
        };
        Ok(Self::with_store(StoreHandle::new(db), config, user))
    }

    /// Start a session on an existing store handle. Sessions of different
    /// users may share one handle.
    pub fn with_store(store: StoreHandle, config: ClientConfig, user: UserId) -> Self {
        let cache = Arc::new(KeyCache::new(config.key_cache_capacity));
        let resolver = LegacyKeyResolver::new(store.clone(), cache);
        let directory = ConversationDirectory::new(
            user.clone(),
            store.clone(),
            resolver,
            config.subscription_buffer,
        );

        info!(user = %user, "Session started");

        Self {
            user,
            config,
            store,
            directory,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn keys(&self) -> ConversationKeyStore {
        ConversationKeyStore::new(self.store.clone())
    }

    /// The session's directory. Clones share the loaded listing.
    pub fn directory(&self) -> ConversationDirectory {
        self.directory.clone()
    }

    /// Look up a conversation the session's user takes part in.
    pub async fn conversation(&self, id: &ConversationId) -> Result<ConversationRecord> {
        self.store
            .lock()
            .await
            .get_conversation(id)?
            .filter(|record| record.participants.contains(&self.user))
            .ok_or_else(|| ClientError::ConversationNotFound(id.clone()))
    }

    /// The user's view of a conversation they take part in.
    pub async fn channel(&self, id: ConversationId) -> Result<MessageChannel> {
        self.conversation(&id).await?;
        Ok(MessageChannel::new(
            id,
            self.user.clone(),
            self.store.clone(),
            self.config.message_order,
            self.config.subscription_buffer,
        ))
    }

    pub async fn composer(&self, id: ConversationId) -> Result<MessageComposer> {
        Ok(MessageComposer::new(self.channel(id).await?))
    }
}

//! Conversation directory: the list of a user's conversations with
//! decrypted previews, plus the destructive operations on them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use lexchat_shared::constants::PREVIEW_DECRYPTION_FAILED_TEXT;
use lexchat_shared::{ConversationId, Participants, UserId};
use lexchat_store::{ConversationRecord, Database};

use crate::content::{open_stored_text, Opened};
use crate::error::{ClientError, Result};
use crate::keys::ConversationKeyStore;
use crate::legacy_keys::LegacyKeyResolver;
use crate::store::StoreHandle;
use crate::subscription::{Snapshot, Subscription};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub participants: Participants,
    pub other_participant: Option<UserId>,
    /// Decrypted last message, empty when there is none.
    pub preview: String,
    pub last_message_sender_id: Option<UserId>,
    pub last_message_timestamp: Option<DateTime<Utc>>,
    pub unread: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ConversationDirectory {
    user: UserId,
    store: StoreHandle,
    keys: ConversationKeyStore,
    resolver: LegacyKeyResolver,
    loaded: Arc<RwLock<Vec<ConversationSummary>>>,
    starting: Arc<Mutex<()>>,
    buffer: usize,
}

impl ConversationDirectory {
    pub fn new(user: UserId, store: StoreHandle, resolver: LegacyKeyResolver, buffer: usize) -> Self {
        Self {
            user,
            keys: ConversationKeyStore::new(store.clone()),
            store,
            resolver,
            loaded: Arc::new(RwLock::new(Vec::new())),
            starting: Arc::new(Mutex::new(())),
            buffer,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// The most recently loaded listing.
    pub async fn loaded(&self) -> Vec<ConversationSummary> {
        self.loaded.read().await.clone()
    }

    /// Query, decrypt and remember the listing.
    ///
    /// On failure the remembered listing is emptied: a failed load shows
    /// nothing rather than stale or partial data.
    pub async fn load(&self) -> Result<Vec<ConversationSummary>> {
        let result = self.fetch().await;
        let mut loaded = self.loaded.write().await;
        match &result {
            Ok(summaries) => *loaded = summaries.clone(),
            Err(_) => loaded.clear(),
        }
        result
    }

    async fn fetch(&self) -> Result<Vec<ConversationSummary>> {
        let records = self
            .store
            .lock()
            .await
            .list_conversations_for_user(&self.user)?;

        let mut summaries = Vec::with_capacity(records.len());
        for record in records {
            let preview = self.preview_text(&record).await;
            summaries.push(summarize(record, &self.user, preview));
        }
        Ok(summaries)
    }

    async fn preview_text(&self, record: &ConversationRecord) -> String {
        if record.last_message.is_empty() {
            return String::new();
        }

        let key = match self.resolver.resolve(&record.id).await {
            Ok(key) => key,
            Err(e) => {
                warn!(conversation = %record.id, error = %e, "Could not resolve conversation key");
                return PREVIEW_DECRYPTION_FAILED_TEXT.to_string();
            }
        };

        match open_stored_text(key.as_ref(), &record.last_message) {
            Opened::Decrypted(text) | Opened::Unencrypted(text) => text,
            Opened::Failed(e) => {
                debug!(
                    conversation = %record.id,
                    error = ?e,
                    "Conversation preview could not be decrypted"
                );
                PREVIEW_DECRYPTION_FAILED_TEXT.to_string()
            }
        }
    }

    /// Live listing of the user's conversations.
    pub fn list_conversations(&self) -> Subscription<ConversationSummary> {
        let events = self.store.subscribe();
        let directory = self.clone();

        debug!(user = %self.user, "Subscribing to conversation list");

        Subscription::spawn(
            events,
            self.buffer,
            |event| event.affects_listing(),
            move || {
                let directory = directory.clone();
                async move {
                    match directory.load().await {
                        Ok(summaries) => Snapshot::ok(summaries),
                        Err(e) => {
                            warn!(user = %directory.user, error = %e, "Failed to load conversations");
                            Snapshot::failed(e)
                        }
                    }
                }
            },
        )
    }

    /// Remove a conversation and, with it, its messages and key.
    pub async fn delete_conversation(&self, id: &ConversationId) -> Result<()> {
        {
            let db = self.store.lock().await;
            self.ensure_member(&db, id)?;
            db.delete_conversation(id)?;
        }
        self.resolver.invalidate(id).await;
        self.loaded.write().await.retain(|c| &c.id != id);

        info!(conversation = %id, "Conversation deleted");
        Ok(())
    }

    /// Delete every message but keep the conversation and its key.
    pub async fn clear_conversation(&self, id: &ConversationId) -> Result<usize> {
        let removed = {
            let db = self.store.lock().await;
            self.ensure_member(&db, id)?;
            db.clear_conversation(id)?
        };
        info!(conversation = %id, removed, "Conversation cleared");
        Ok(removed)
    }

    /// Checked under the same lock as the mutation that follows it.
    fn ensure_member(&self, db: &Database, id: &ConversationId) -> Result<()> {
        match db.get_conversation(id)? {
            Some(record) if record.participants.contains(&self.user) => Ok(()),
            _ => Err(ClientError::ConversationNotFound(id.clone())),
        }
    }

    /// Return the conversation with `friend`, creating it (with a fresh
    /// key) only when none exists.
    pub async fn start_or_reuse_conversation(&self, friend: &UserId) -> Result<ConversationId> {
        let participants =
            Participants::new(self.user.clone(), friend.clone()).ok_or_else(|| {
                ClientError::InvalidParticipants("cannot start a conversation with yourself".into())
            })?;

        // Serialize so two quick calls cannot both miss and both create.
        let _starting = self.starting.lock().await;

        if let Some(id) = self.find_loaded(friend).await {
            // The remembered listing can be stale: the peer may have deleted
            // the conversation since it was loaded.
            if self.store.lock().await.get_conversation(&id)?.is_some() {
                return Ok(id);
            }
            debug!(conversation = %id, "Remembered conversation is gone");
            self.resolver.invalidate(&id).await;
        }

        // The listing may not have been loaded yet, or may be behind.
        self.load().await?;
        if let Some(id) = self.find_loaded(friend).await {
            return Ok(id);
        }

        let id = self.keys.create_conversation_with_key(participants).await?;
        self.load().await?;
        Ok(id)
    }

    async fn find_loaded(&self, friend: &UserId) -> Option<ConversationId> {
        self.loaded
            .read()
            .await
            .iter()
            .find(|c| c.participants.is_pair(&self.user, friend))
            .map(|c| c.id.clone())
    }
}

fn summarize(record: ConversationRecord, user: &UserId, preview: String) -> ConversationSummary {
    ConversationSummary {
        unread: record.is_unread_for(user),
        other_participant: record.participants.other(user).cloned(),
        id: record.id,
        participants: record.participants,
        preview,
        last_message_sender_id: record.last_message_sender_id,
        last_message_timestamp: record.last_message_timestamp,
        created_at: record.created_at,
    }
}

//! Live, decrypted view of one conversation, and the send path.
//!
//! A channel belongs to one member of the conversation. Every operation
//! re-checks that membership against the stored record, so a channel never
//! reads from or writes to a conversation its member is not part of.
//!
//! Every snapshot re-reads the conversation key and decrypts each message
//! independently; a message that fails to open is replaced by a placeholder
//! and the rest of the batch is unaffected.
//!
//! Sending is a two-phase write: the message record first, then the
//! conversation's preview fields. The two are not atomic. If the second
//! write fails the message is still delivered and the preview stays stale
//! until the next send; [`SendOutcome::preview_updated`] reports this.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use lexchat_shared::constants::{DECRYPTION_FAILED_TEXT, MAX_MESSAGE_SIZE, MISSING_KEY_TEXT};
use lexchat_shared::crypto;
use lexchat_shared::{ConversationId, ConversationKey, MessageId, UserId};
use lexchat_store::{
    ConversationPreview, ConversationRecord, MessageOrder, MessageRecord, NewMessage, StoreEvent,
};

use crate::content::{open_stored_text, ContentState, Opened};
use crate::error::{ClientError, Result};
use crate::store::StoreHandle;
use crate::subscription::{Snapshot, Subscription};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    /// Plaintext, or a placeholder when `state` is `Undecryptable`.
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub was_read: bool,
    pub state: ContentState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub message_id: MessageId,
    pub timestamp: DateTime<Utc>,
    /// `false` when the conversation had no key and the text went out in clear.
    pub encrypted: bool,
    /// `false` when the message was stored but the preview write failed.
    pub preview_updated: bool,
}

#[derive(Clone)]
pub struct MessageChannel {
    conversation_id: ConversationId,
    member: UserId,
    store: StoreHandle,
    order: MessageOrder,
    buffer: usize,
    sending: Arc<AtomicBool>,
}

impl MessageChannel {
    pub fn new(
        conversation_id: ConversationId,
        member: UserId,
        store: StoreHandle,
        order: MessageOrder,
        buffer: usize,
    ) -> Self {
        Self {
            conversation_id,
            member,
            store,
            order,
            buffer,
            sending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// The user this channel reads and sends as.
    pub fn member(&self) -> &UserId {
        &self.member
    }

    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::Acquire)
    }

    /// The conversation record, provided the channel's member takes part.
    async fn member_record(&self) -> Result<ConversationRecord> {
        self.store
            .lock()
            .await
            .get_conversation(&self.conversation_id)?
            .filter(|record| record.participants.contains(&self.member))
            .ok_or_else(|| ClientError::ConversationNotFound(self.conversation_id.clone()))
    }

    async fn member_key(&self) -> Result<Option<ConversationKey>> {
        let record = self.member_record().await?;
        Ok(record
            .secure_key
            .as_deref()
            .map(ConversationKey::from_base64)
            .transpose()?)
    }

    /// One snapshot of the conversation, decrypted.
    ///
    /// Fails with `ConversationNotFound` once the conversation is gone or
    /// when the member does not take part in it.
    pub async fn load(&self) -> Result<Vec<DecryptedMessage>> {
        let key = match self.member_key().await {
            Ok(key) => key,
            Err(ClientError::Crypto(e)) => {
                warn!(
                    conversation = %self.conversation_id,
                    error = %e,
                    "Stored conversation key is unusable"
                );
                None
            }
            Err(e) => return Err(e),
        };

        let records = self
            .store
            .lock()
            .await
            .messages_for_conversation(&self.conversation_id, self.order)?;

        Ok(records
            .into_iter()
            .map(|record| open_message(key.as_ref(), record))
            .collect())
    }

    /// Live view of the conversation. The first snapshot is delivered
    /// immediately; later ones follow every message write or removal.
    pub fn subscribe(&self) -> Subscription<DecryptedMessage> {
        let events = self.store.subscribe();
        let id = self.conversation_id.clone();
        let channel = self.clone();

        debug!(conversation = %self.conversation_id, "Subscribing to messages");

        Subscription::spawn(
            events,
            self.buffer,
            move |event| {
                event.conversation_id() == &id
                    && !matches!(event, StoreEvent::ConversationChanged(_))
            },
            move || {
                let channel = channel.clone();
                async move {
                    match channel.load().await {
                        Ok(messages) => Snapshot::ok(messages),
                        Err(e) => {
                            warn!(
                                conversation = %channel.conversation_id,
                                error = %e,
                                "Failed to refresh messages"
                            );
                            Snapshot::failed(e)
                        }
                    }
                }
            },
        )
    }

    /// Encrypt and send a message as the channel's member.
    ///
    /// Rejects blank text and a second send while one is in flight on this
    /// channel. Without a conversation key the text is written in clear.
    pub async fn send_message(&self, plaintext: &str) -> Result<SendOutcome> {
        let text = plaintext.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(ClientError::MessageTooLarge {
                size: text.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let _guard = SendGuard::acquire(&self.sending).ok_or(ClientError::SendInFlight)?;

        let key = self.member_key().await?;
        let body = match &key {
            Some(key) => crypto::encrypt(key, text)?,
            None => {
                warn!(
                    conversation = %self.conversation_id,
                    "Conversation has no key, sending unencrypted"
                );
                text.to_string()
            }
        };

        let new_message = NewMessage {
            id: MessageId::new(),
            conversation_id: self.conversation_id.clone(),
            sender_id: self.member.clone(),
            text: body,
        };

        // Phase 1: the message itself.
        let record = self
            .store
            .lock()
            .await
            .insert_message(&new_message)
            .map_err(|e| {
                error!(
                    conversation = %self.conversation_id,
                    error = %e,
                    "Failed to store message"
                );
                e
            })?;

        // Phase 2: the denormalized preview.
        let preview = ConversationPreview::for_message(&record);
        let preview_updated = match self
            .store
            .lock()
            .await
            .update_preview(&self.conversation_id, &preview)
        {
            Ok(true) => true,
            Ok(false) => {
                debug!(
                    conversation = %self.conversation_id,
                    msg_id = %record.id,
                    "Newer preview already in place"
                );
                true
            }
            Err(e) => {
                warn!(
                    conversation = %self.conversation_id,
                    msg_id = %record.id,
                    error = %e,
                    "Message stored but conversation preview is stale"
                );
                false
            }
        };

        info!(
            msg_id = %record.id,
            conversation = %self.conversation_id,
            encrypted = key.is_some(),
            "Message sent"
        );

        Ok(SendOutcome {
            message_id: record.id,
            timestamp: record.timestamp,
            encrypted: key.is_some(),
            preview_updated,
        })
    }

    /// Mark the conversation read by the channel's member. Returns whether
    /// the unread flag changed.
    pub async fn mark_read(&self) -> Result<bool> {
        self.member_record().await?;
        let changed = self
            .store
            .lock()
            .await
            .mark_preview_read(&self.conversation_id, &self.member)?;
        if changed {
            debug!(
                conversation = %self.conversation_id,
                reader = %self.member,
                "Conversation marked read"
            );
        }
        Ok(changed)
    }
}

/// Holds the channel's in-flight flag for the duration of one send.
struct SendGuard<'a>(&'a AtomicBool);

impl<'a> SendGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn open_message(key: Option<&ConversationKey>, record: MessageRecord) -> DecryptedMessage {
    let (text, state) = match open_stored_text(key, &record.text) {
        Opened::Decrypted(text) => (text, ContentState::Decrypted),
        Opened::Unencrypted(text) => (text, ContentState::Unencrypted),
        Opened::Failed(Some(e)) => {
            debug!(msg_id = %record.id, error = %e, "Message could not be decrypted");
            (DECRYPTION_FAILED_TEXT.to_string(), ContentState::Undecryptable)
        }
        Opened::Failed(None) => (MISSING_KEY_TEXT.to_string(), ContentState::Undecryptable),
    };

    DecryptedMessage {
        id: record.id,
        sender_id: record.sender_id,
        text,
        timestamp: record.timestamp,
        was_read: record.was_read,
        state,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use lexchat_shared::Participants;
    use lexchat_store::{ConversationRecord, Database};

    use super::*;
    use crate::keys::ConversationKeyStore;

    async fn setup() -> (MessageChannel, StoreHandle) {
        let store = StoreHandle::new(Database::open_in_memory().unwrap());
        let keys = ConversationKeyStore::new(store.clone());
        let id = keys
            .create_conversation_with_key(Participants::new("alice".into(), "bob".into()).unwrap())
            .await
            .unwrap();
        let channel = channel_for("alice", id, &store);
        (channel, store)
    }

    fn channel_for(member: &str, id: ConversationId, store: &StoreHandle) -> MessageChannel {
        MessageChannel::new(id, member.into(), store.clone(), MessageOrder::OldestFirst, 8)
    }

    fn peer(channel: &MessageChannel, member: &str, store: &StoreHandle) -> MessageChannel {
        channel_for(member, channel.conversation_id().clone(), store)
    }

    async fn next_snapshot(sub: &mut Subscription<DecryptedMessage>) -> Snapshot<DecryptedMessage> {
        tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .expect("snapshot should arrive")
            .expect("subscription should be open")
    }

    #[tokio::test]
    async fn test_send_stores_ciphertext_only() {
        let (channel, store) = setup().await;
        let outcome = channel.send_message("Hello").await.unwrap();
        assert!(outcome.encrypted);
        assert!(outcome.preview_updated);

        let stored = store
            .lock()
            .await
            .messages_for_conversation(channel.conversation_id(), MessageOrder::OldestFirst)
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_ne!(stored[0].text, "Hello");
        assert!(!stored[0].text.contains("Hello"));

        let record = store
            .lock()
            .await
            .get_conversation(channel.conversation_id())
            .unwrap()
            .unwrap();
        assert_eq!(record.last_message, stored[0].text);
        assert_eq!(record.last_message_sender_id, Some("alice".into()));
        assert!(!record.last_message_was_read);
    }

    #[tokio::test]
    async fn test_load_decrypts_in_order() {
        let (channel, store) = setup().await;
        channel.send_message("one").await.unwrap();
        peer(&channel, "bob", &store).send_message("two").await.unwrap();

        let messages = channel.load().await.unwrap();
        let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["one", "two"]);
        assert!(messages.iter().all(|m| m.state == ContentState::Decrypted));
    }

    #[tokio::test]
    async fn test_newest_first_order() {
        let (channel, store) = setup().await;
        channel.send_message("one").await.unwrap();
        peer(&channel, "bob", &store).send_message("two").await.unwrap();

        let newest = MessageChannel::new(
            channel.conversation_id().clone(),
            "bob".into(),
            store,
            MessageOrder::NewestFirst,
            8,
        );
        let texts: Vec<_> = newest
            .load()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["two", "one"]);
    }

    #[tokio::test]
    async fn test_rejects_blank_and_trims() {
        let (channel, _) = setup().await;
        assert!(matches!(
            channel.send_message("   \n").await,
            Err(ClientError::EmptyMessage)
        ));

        channel.send_message("  hi  ").await.unwrap();
        assert_eq!(channel.load().await.unwrap()[0].text, "hi");
    }

    #[tokio::test]
    async fn test_rejects_oversized_message() {
        let (channel, _) = setup().await;
        let huge = "x".repeat(MAX_MESSAGE_SIZE + 1);
        assert!(matches!(
            channel.send_message(&huge).await,
            Err(ClientError::MessageTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_message_is_isolated() {
        let (channel, store) = setup().await;
        channel.send_message("before").await.unwrap();
        store
            .lock()
            .await
            .insert_message(&NewMessage {
                id: MessageId::new(),
                conversation_id: channel.conversation_id().clone(),
                sender_id: "mallory".into(),
                text: "AAAA:AAAA".into(),
            })
            .unwrap();
        peer(&channel, "bob", &store).send_message("after").await.unwrap();

        let messages = channel.load().await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].text, "before");
        assert_eq!(messages[1].text, DECRYPTION_FAILED_TEXT);
        assert_eq!(messages[1].state, ContentState::Undecryptable);
        assert_eq!(messages[2].text, "after");
    }

    #[tokio::test]
    async fn test_keyless_conversation_falls_back_to_plaintext() {
        let store = StoreHandle::new(Database::open_in_memory().unwrap());
        let record = ConversationRecord::new(
            "legacy".into(),
            Participants::new("alice".into(), "bob".into()).unwrap(),
            None,
            Utc::now(),
        );
        store.lock().await.insert_conversation(&record).unwrap();
        let channel = channel_for("alice", record.id, &store);

        let outcome = channel.send_message("in clear").await.unwrap();
        assert!(!outcome.encrypted);

        let messages = channel.load().await.unwrap();
        assert_eq!(messages[0].text, "in clear");
        assert_eq!(messages[0].state, ContentState::Unencrypted);
    }

    #[tokio::test]
    async fn test_send_to_missing_conversation_is_rejected() {
        let store = StoreHandle::new(Database::open_in_memory().unwrap());
        let channel = channel_for("alice", "gone".into(), &store);

        assert!(matches!(
            channel.send_message("hello?").await,
            Err(ClientError::ConversationNotFound(_))
        ));
        assert!(!channel.is_sending());
    }

    #[tokio::test]
    async fn test_concurrent_send_is_rejected() {
        let (channel, store) = setup().await;

        let lock = store.lock().await;
        let first = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.send_message("first").await })
        };
        while !channel.is_sending() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            channel.send_message("second").await,
            Err(ClientError::SendInFlight)
        ));

        drop(lock);
        first.await.unwrap().unwrap();
        assert!(!channel.is_sending());
        assert_eq!(channel.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscription_sees_new_messages() {
        let (channel, _) = setup().await;
        let mut sub = channel.subscribe();
        assert!(next_snapshot(&mut sub).await.items.is_empty());

        channel.send_message("Hello").await.unwrap();

        let snapshot = next_snapshot(&mut sub).await;
        assert!(snapshot.is_ok());
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].text, "Hello");
    }

    #[tokio::test]
    async fn test_mark_read_only_for_recipient() {
        let (channel, store) = setup().await;
        channel.send_message("ping").await.unwrap();

        assert!(!channel.mark_read().await.unwrap());
        assert!(peer(&channel, "bob", &store).mark_read().await.unwrap());
        assert!(channel.load().await.unwrap()[0].was_read);
    }

    #[tokio::test]
    async fn test_outsider_cannot_use_channel() {
        let (channel, store) = setup().await;
        peer(&channel, "bob", &store).send_message("for alice only").await.unwrap();
        let carol = peer(&channel, "carol", &store);

        assert!(matches!(
            carol.load().await,
            Err(ClientError::ConversationNotFound(_))
        ));
        assert!(matches!(
            carol.send_message("let me in").await,
            Err(ClientError::ConversationNotFound(_))
        ));
        assert!(matches!(
            carol.mark_read().await,
            Err(ClientError::ConversationNotFound(_))
        ));

        let messages = channel.load().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].was_read);
        let record = store
            .lock()
            .await
            .get_conversation(channel.conversation_id())
            .unwrap()
            .unwrap();
        assert_eq!(record.last_message_sender_id, Some("bob".into()));
        assert!(!record.last_message_was_read);
    }

    #[tokio::test]
    async fn test_outsider_subscription_gets_error_snapshot() {
        let (channel, store) = setup().await;
        let mut sub = peer(&channel, "carol", &store).subscribe();

        let snapshot = next_snapshot(&mut sub).await;
        assert!(snapshot.items.is_empty());
        assert!(snapshot.error.is_some());
    }

    #[tokio::test]
    async fn test_subscription_reports_deleted_conversation() {
        let (channel, store) = setup().await;
        channel.send_message("soon gone").await.unwrap();

        let mut sub = peer(&channel, "bob", &store).subscribe();
        let first = next_snapshot(&mut sub).await;
        assert!(first.is_ok());
        assert_eq!(first.items.len(), 1);

        store
            .lock()
            .await
            .delete_conversation(channel.conversation_id())
            .unwrap();

        let snapshot = next_snapshot(&mut sub).await;
        assert!(snapshot.items.is_empty());
        assert!(snapshot.error.is_some());
    }
}

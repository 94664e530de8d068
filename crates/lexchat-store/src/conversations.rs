//! CRUD operations for [`ConversationRecord`]s.

use rusqlite::{params, OptionalExtension};

use lexchat_shared::{ConversationId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::events::StoreEvent;
use crate::models::{
    format_timestamp, ConversationPreview, ConversationRecord, ConversationRow,
};

const SELECT_COLUMNS: &str = "SELECT id, participant_a, participant_b, secure_key, created_at,
            last_message, last_message_sender_id, last_message_timestamp,
            last_message_was_read
     FROM conversations";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new conversation. The store does not deduplicate pairs;
    /// callers look for an existing conversation first.
    pub fn insert_conversation(&self, record: &ConversationRecord) -> Result<()> {
        let [a, b] = record.participants.as_slice();
        self.conn().execute(
            "INSERT INTO conversations (id, participant_a, participant_b, secure_key, created_at,
                 last_message, last_message_sender_id, last_message_timestamp,
                 last_message_was_read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id.as_str(),
                a.as_str(),
                b.as_str(),
                record.secure_key,
                format_timestamp(&record.created_at),
                record.last_message,
                record.last_message_sender_id.as_ref().map(UserId::as_str),
                record.last_message_timestamp.as_ref().map(format_timestamp),
                record.last_message_was_read,
            ],
        )?;

        tracing::debug!(conversation = %record.id, "conversation inserted");
        self.publish(StoreEvent::ConversationChanged(record.id.clone()));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Point read. `Ok(None)` when the record does not exist.
    pub fn get_conversation(&self, id: &ConversationId) -> Result<Option<ConversationRecord>> {
        let row = self
            .conn()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id.as_str()],
                ConversationRow::from_row,
            )
            .optional()?;

        row.map(ConversationRecord::try_from).transpose()
    }

    /// Conversations whose participant set contains `user`, most recent
    /// activity first.
    ///
    /// Fails closed: one malformed record fails the whole listing rather
    /// than returning a partial view.
    pub fn list_conversations_for_user(&self, user: &UserId) -> Result<Vec<ConversationRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_COLUMNS}
             WHERE participant_a = ?1 OR participant_b = ?1
             ORDER BY COALESCE(last_message_timestamp, created_at) DESC, id ASC"
        ))?;

        let rows = stmt.query_map(params![user.as_str()], ConversationRow::from_row)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(ConversationRecord::try_from(row?)?);
        }
        Ok(conversations)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrite the denormalized preview fields, unless the preview of a
    /// newer message is already in place. A preview without a timestamp
    /// always applies.
    ///
    /// Returns `false` when the write was superseded.
    pub fn update_preview(&self, id: &ConversationId, preview: &ConversationPreview) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE conversations
             SET last_message = ?2,
                 last_message_sender_id = ?3,
                 last_message_timestamp = ?4,
                 last_message_was_read = ?5
             WHERE id = ?1
               AND (?4 IS NULL
                    OR last_message_timestamp IS NULL
                    OR last_message_timestamp < ?4)",
            params![
                id.as_str(),
                preview.last_message,
                preview.sender_id.as_ref().map(UserId::as_str),
                preview.timestamp.as_ref().map(format_timestamp),
                preview.was_read,
            ],
        )?;

        if affected > 0 {
            self.publish(StoreEvent::ConversationChanged(id.clone()));
            return Ok(true);
        }

        let exists = self
            .conn()
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?1",
                params![id.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(StoreError::NotFound);
        }
        Ok(false)
    }

    /// Flag the preview (and the other side's messages) as seen by `reader`.
    ///
    /// A no-op when `reader` is not a participant, wrote the last message,
    /// or it is already read. Returns whether anything changed.
    pub fn mark_preview_read(&self, id: &ConversationId, reader: &UserId) -> Result<bool> {
        let tx = self.conn().unchecked_transaction()?;

        let changed = tx.execute(
            "UPDATE conversations
             SET last_message_was_read = 1
             WHERE id = ?1
               AND ?2 IN (participant_a, participant_b)
               AND last_message_sender_id IS NOT NULL
               AND last_message_sender_id != ?2
               AND last_message_was_read = 0",
            params![id.as_str(), reader.as_str()],
        )?;
        tx.execute(
            "UPDATE messages SET was_read = 1
             WHERE conversation_id = ?1 AND sender_id != ?2 AND was_read = 0
               AND EXISTS (
                   SELECT 1 FROM conversations
                   WHERE id = ?1 AND ?2 IN (participant_a, participant_b)
               )",
            params![id.as_str(), reader.as_str()],
        )?;
        tx.commit()?;

        if changed > 0 {
            self.publish(StoreEvent::ConversationChanged(id.clone()));
        }
        Ok(changed > 0)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete every message of a conversation in one transaction and reset
    /// its preview. The record and its key are kept. Returns the number of
    /// messages removed.
    pub fn clear_conversation(&self, id: &ConversationId) -> Result<usize> {
        let tx = self.conn().unchecked_transaction()?;

        let removed = tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![id.as_str()],
        )?;
        let affected = tx.execute(
            "UPDATE conversations
             SET last_message = '',
                 last_message_sender_id = NULL,
                 last_message_timestamp = NULL,
                 last_message_was_read = 0
             WHERE id = ?1",
            params![id.as_str()],
        )?;
        if affected == 0 {
            // Dropping the transaction rolls back.
            return Err(StoreError::NotFound);
        }
        tx.commit()?;

        tracing::debug!(conversation = %id, removed, "conversation cleared");
        self.publish(StoreEvent::MessagesChanged(id.clone()));
        self.publish(StoreEvent::ConversationChanged(id.clone()));
        Ok(removed)
    }

    /// Delete a conversation. Its messages go with it (`ON DELETE CASCADE`).
    /// Returns `true` if a row was deleted.
    pub fn delete_conversation(&self, id: &ConversationId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM conversations WHERE id = ?1",
            params![id.as_str()],
        )?;

        if affected > 0 {
            self.publish(StoreEvent::ConversationDeleted(id.clone()));
            self.publish(StoreEvent::MessagesChanged(id.clone()));
        }
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use lexchat_shared::{MessageId, Participants};

    use super::*;
    use crate::models::{MessageOrder, NewMessage};

    fn conversation(id: &str, a: &str, b: &str) -> ConversationRecord {
        ConversationRecord::new(
            ConversationId::from(id),
            Participants::new(a.into(), b.into()).unwrap(),
            Some("c2VjcmV0".into()),
            Utc::now(),
        )
    }

    fn message(conversation: &str, sender: &str, text: &str) -> NewMessage {
        NewMessage {
            id: MessageId::new(),
            conversation_id: ConversationId::from(conversation),
            sender_id: sender.into(),
            text: text.into(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let db = Database::open_in_memory().unwrap();
        let record = conversation("c1", "alice", "bob");
        db.insert_conversation(&record).unwrap();

        let loaded = db.get_conversation(&record.id).unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.secure_key, record.secure_key);
        assert!(loaded.last_message.is_empty());
    }

    #[test]
    fn test_get_missing_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_conversation(&"nope".into()).unwrap().is_none());
    }

    #[test]
    fn test_membership_filter() {
        let db = Database::open_in_memory().unwrap();
        db.insert_conversation(&conversation("c1", "alice", "bob")).unwrap();
        db.insert_conversation(&conversation("c2", "carol", "alice")).unwrap();
        db.insert_conversation(&conversation("c3", "bob", "carol")).unwrap();

        let ids: Vec<String> = db
            .list_conversations_for_user(&"alice".into())
            .unwrap()
            .into_iter()
            .map(|c| c.id.0)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"c1".to_string()));
        assert!(ids.contains(&"c2".to_string()));
    }

    #[test]
    fn test_listing_orders_by_latest_activity() {
        let db = Database::open_in_memory().unwrap();
        let mut old = conversation("old", "alice", "bob");
        old.created_at = Utc::now() - chrono::Duration::hours(2);
        let mut new = conversation("new", "alice", "carol");
        new.created_at = Utc::now() - chrono::Duration::hours(1);
        db.insert_conversation(&old).unwrap();
        db.insert_conversation(&new).unwrap();

        let list = db.list_conversations_for_user(&"alice".into()).unwrap();
        assert_eq!(list[0].id.as_str(), "new");

        let msg = db.insert_message(&message("old", "bob", "n:c")).unwrap();
        db.update_preview(&"old".into(), &ConversationPreview::for_message(&msg))
            .unwrap();

        let list = db.list_conversations_for_user(&"alice".into()).unwrap();
        assert_eq!(list[0].id.as_str(), "old");
    }

    #[test]
    fn test_malformed_record_fails_listing() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO conversations (id, participant_a, participant_b, created_at)
                 VALUES ('bad', 'alice', 'alice', '2024-01-01T00:00:00.000000Z')",
                [],
            )
            .unwrap();

        assert!(matches!(
            db.list_conversations_for_user(&"alice".into()),
            Err(StoreError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_update_preview_missing_conversation() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.update_preview(&"nope".into(), &ConversationPreview::empty()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_mark_preview_read_only_for_recipient() {
        let db = Database::open_in_memory().unwrap();
        db.insert_conversation(&conversation("c1", "alice", "bob")).unwrap();
        let msg = db.insert_message(&message("c1", "alice", "n:c")).unwrap();
        db.update_preview(&"c1".into(), &ConversationPreview::for_message(&msg))
            .unwrap();

        assert!(!db.mark_preview_read(&"c1".into(), &"alice".into()).unwrap());
        assert!(db.mark_preview_read(&"c1".into(), &"bob".into()).unwrap());
        assert!(!db.mark_preview_read(&"c1".into(), &"bob".into()).unwrap());

        let record = db.get_conversation(&"c1".into()).unwrap().unwrap();
        assert!(record.last_message_was_read);
        let messages = db
            .messages_for_conversation(&"c1".into(), MessageOrder::OldestFirst)
            .unwrap();
        assert!(messages[0].was_read);
    }

    #[test]
    fn test_mark_preview_read_ignores_outsider() {
        let db = Database::open_in_memory().unwrap();
        db.insert_conversation(&conversation("c1", "alice", "bob")).unwrap();
        let msg = db.insert_message(&message("c1", "alice", "n:c")).unwrap();
        db.update_preview(&"c1".into(), &ConversationPreview::for_message(&msg))
            .unwrap();

        assert!(!db.mark_preview_read(&"c1".into(), &"carol".into()).unwrap());

        let record = db.get_conversation(&"c1".into()).unwrap().unwrap();
        assert!(!record.last_message_was_read);
        let messages = db
            .messages_for_conversation(&"c1".into(), MessageOrder::OldestFirst)
            .unwrap();
        assert!(!messages[0].was_read);
    }

    #[test]
    fn test_older_preview_does_not_replace_newer() {
        let db = Database::open_in_memory().unwrap();
        db.insert_conversation(&conversation("c1", "alice", "bob")).unwrap();
        let first = db.insert_message(&message("c1", "alice", "n:first")).unwrap();
        let second = db.insert_message(&message("c1", "bob", "n:second")).unwrap();

        // Second sender's preview lands before the first sender's.
        assert!(db
            .update_preview(&"c1".into(), &ConversationPreview::for_message(&second))
            .unwrap());
        assert!(!db
            .update_preview(&"c1".into(), &ConversationPreview::for_message(&first))
            .unwrap());

        let record = db.get_conversation(&"c1".into()).unwrap().unwrap();
        assert_eq!(record.last_message, "n:second");
        assert_eq!(record.last_message_sender_id, Some("bob".into()));
        assert_eq!(record.last_message_timestamp, Some(second.timestamp));
    }

    #[test]
    fn test_clear_keeps_record_and_key() {
        let db = Database::open_in_memory().unwrap();
        let record = conversation("c1", "alice", "bob");
        db.insert_conversation(&record).unwrap();
        for _ in 0..3 {
            let msg = db.insert_message(&message("c1", "alice", "n:c")).unwrap();
            db.update_preview(&record.id, &ConversationPreview::for_message(&msg))
                .unwrap();
        }

        assert_eq!(db.clear_conversation(&record.id).unwrap(), 3);

        let cleared = db.get_conversation(&record.id).unwrap().unwrap();
        assert_eq!(cleared.secure_key, record.secure_key);
        assert!(cleared.last_message.is_empty());
        assert!(cleared.last_message_sender_id.is_none());
        assert!(!cleared.last_message_was_read);
        assert!(db
            .messages_for_conversation(&record.id, MessageOrder::OldestFirst)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_clear_missing_conversation() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.clear_conversation(&"nope".into()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_delete_cascades_to_messages() {
        let db = Database::open_in_memory().unwrap();
        db.insert_conversation(&conversation("c1", "alice", "bob")).unwrap();
        db.insert_message(&message("c1", "alice", "n:c")).unwrap();

        assert!(db.delete_conversation(&"c1".into()).unwrap());
        assert!(!db.delete_conversation(&"c1".into()).unwrap());

        let orphans: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_mutations_publish_events() {
        let db = Database::open_in_memory().unwrap();
        let mut rx = db.subscribe();

        db.insert_conversation(&conversation("c1", "alice", "bob")).unwrap();
        db.delete_conversation(&"c1".into()).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            StoreEvent::ConversationChanged("c1".into())
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreEvent::ConversationDeleted("c1".into())
        );
    }
}

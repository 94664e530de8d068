use rusqlite::params;

use lexchat_shared::ConversationId;

use crate::database::Database;
use crate::error::Result;
use crate::events::StoreEvent;
use crate::models::{format_timestamp, MessageOrder, MessageRecord, MessageRow, NewMessage};

impl Database {
    /// Write a message, stamping it with the server clock.
    ///
    /// Fails if the conversation does not exist. The preview is not touched;
    /// that is a separate write by the sender.
    pub fn insert_message(&self, message: &NewMessage) -> Result<MessageRecord> {
        let timestamp = self.server_timestamp();

        self.conn().execute(
            "INSERT INTO messages (id, conversation_id, sender_id, text, timestamp, was_read)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![
                message.id.as_str(),
                message.conversation_id.as_str(),
                message.sender_id.as_str(),
                message.text,
                format_timestamp(&timestamp),
            ],
        )?;

        self.publish(StoreEvent::MessagesChanged(message.conversation_id.clone()));

        Ok(MessageRecord {
            id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            sender_id: message.sender_id.clone(),
            text: message.text.clone(),
            timestamp,
            was_read: false,
        })
    }

    /// All messages of a conversation ordered by server timestamp; ties are
    /// broken by message id.
    pub fn messages_for_conversation(
        &self,
        conversation_id: &ConversationId,
        order: MessageOrder,
    ) -> Result<Vec<MessageRecord>> {
        let sql = match order {
            MessageOrder::OldestFirst => {
                "SELECT id, conversation_id, sender_id, text, timestamp, was_read
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY timestamp ASC, id ASC"
            }
            MessageOrder::NewestFirst => {
                "SELECT id, conversation_id, sender_id, text, timestamp, was_read
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY timestamp DESC, id DESC"
            }
        };

        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params![conversation_id.as_str()], MessageRow::from_row)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(MessageRecord::try_from(row?)?);
        }
        Ok(messages)
    }
}

//! v001 -- Initial schema creation.
//!
//! Creates the `conversations` and `messages` tables.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Conversations (direct messages between two users)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id                     TEXT PRIMARY KEY NOT NULL,
    participant_a          TEXT NOT NULL,
    participant_b          TEXT NOT NULL,
    secure_key             TEXT,                       -- base64 32-byte key
    created_at             TEXT NOT NULL,              -- RFC-3339, micros
    last_message           TEXT NOT NULL DEFAULT '',   -- envelope
    last_message_sender_id TEXT,
    last_message_timestamp TEXT,
    last_message_was_read  INTEGER NOT NULL DEFAULT 0  -- boolean 0/1
);

CREATE INDEX IF NOT EXISTS idx_conversations_participant_a
    ON conversations(participant_a);
CREATE INDEX IF NOT EXISTS idx_conversations_participant_b
    ON conversations(participant_b);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,
    conversation_id TEXT NOT NULL,              -- FK -> conversations(id)
    sender_id       TEXT NOT NULL,
    text            TEXT NOT NULL,              -- envelope
    timestamp       TEXT NOT NULL,              -- server-assigned, RFC-3339
    was_read        INTEGER NOT NULL DEFAULT 0,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, timestamp);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

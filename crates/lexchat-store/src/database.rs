//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation. It also owns the server
//! clock and the change feed, so every write path can stamp records and
//! notify live queries.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::broadcast;

use crate::clock::ServerClock;
use crate::error::{Result, StoreError};
use crate::events::{StoreEvent, EVENT_CHANNEL_CAPACITY};
use crate::migrations;
use crate::models::parse_timestamp;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
    clock: ServerClock,
    events: broadcast::Sender<StoreEvent>,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/lexchat/lexchat.db`
    /// - macOS:   `~/Library/Application Support/com.lexchat.lexchat/lexchat.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\lexchat\lexchat\data\lexchat.db`
    pub fn open_default() -> Result<Self> {
        let path = default_path()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        Self::open_at(&path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open a private in-memory database. Nothing survives the handle.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;

        let latest: Option<String> = conn
            .query_row("SELECT MAX(timestamp) FROM messages", [], |row| row.get(0))
            .optional()?
            .flatten();
        let latest: Option<DateTime<Utc>> = latest
            .map(|raw| parse_timestamp("messages", "timestamp", &raw))
            .transpose()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            conn,
            clock: ServerClock::starting_after(latest),
            events,
        })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }

    /// Subscribe to the change feed. Only events published after this call
    /// are received.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// A sender handle that can create receivers without borrowing the
    /// database.
    pub fn event_sender(&self) -> broadcast::Sender<StoreEvent> {
        self.events.clone()
    }

    pub(crate) fn server_timestamp(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn publish(&self, event: StoreEvent) {
        // No receivers is not an error: nobody is watching.
        let _ = self.events.send(event);
    }
}

/// Location of the default database file.
pub fn default_path() -> Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("com", "lexchat", "lexchat").ok_or(StoreError::NoDataDir)?;
    Ok(project_dirs.data_dir().join("lexchat.db"))
}

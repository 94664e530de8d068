//! Shared handle to the document store.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, MutexGuard};

use lexchat_store::{Database, StoreEvent};

/// Cloneable handle shared by every component of a session.
///
/// The database sits behind an async mutex; the change-feed sender is kept
/// outside it so subscribing never waits on a write.
#[derive(Clone)]
pub struct StoreHandle {
    db: Arc<Mutex<Database>>,
    events: broadcast::Sender<StoreEvent>,
}

impl StoreHandle {
    pub fn new(db: Database) -> Self {
        let events = db.event_sender();
        Self {
            db: Arc::new(Mutex::new(db)),
            events,
        }
    }

    /// Lock the database. Keep the guard for a single store call; never
    /// hold it across other awaits.
    pub async fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

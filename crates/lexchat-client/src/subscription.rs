//! Cancellable live queries.
//!
//! A [`Subscription`] runs a background task that re-runs a query whenever
//! the store's change feed reports a relevant mutation and delivers the
//! result as a [`Snapshot`]. Dropping the subscription (or calling
//! [`Subscription::cancel`]) aborts the task; nothing is delivered after
//! that.

use std::future::Future;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use lexchat_store::StoreEvent;

/// One complete result of a live query.
///
/// A failed refresh is reported as an empty snapshot with `error` set, never
/// as a partial list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    pub error: Option<String>,
}

impl<T> Snapshot<T> {
    pub fn ok(items: Vec<T>) -> Self {
        Self { items, error: None }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            items: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Subscription<T> {
    rx: mpsc::Receiver<Snapshot<T>>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> Subscription<T> {
    /// Start a live query.
    ///
    /// `events` must be subscribed before the first `load` runs so no
    /// mutation between the initial load and the first `recv` is missed.
    pub(crate) fn spawn<R, L, Fut>(
        mut events: broadcast::Receiver<StoreEvent>,
        buffer: usize,
        relevant: R,
        load: L,
    ) -> Self
    where
        R: Fn(&StoreEvent) -> bool + Send + 'static,
        L: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Snapshot<T>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));

        let task = tokio::spawn(async move {
            if tx.send(load().await).await.is_err() {
                return;
            }

            loop {
                match events.recv().await {
                    Ok(event) if !relevant(&event) => continue,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Change feed lagged, reloading");
                    }
                    Err(RecvError::Closed) => break,
                }

                // Anything already queued is covered by the reload below.
                loop {
                    match events.try_recv() {
                        Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }

                if tx.send(load().await).await.is_err() {
                    break;
                }
            }
        });

        Self { rx, task }
    }
}

impl<T> Subscription<T> {
    /// Wait for the next snapshot. `None` once the store has shut down.
    pub async fn next(&mut self) -> Option<Snapshot<T>> {
        self.rx.recv().await
    }

    /// A snapshot that is already waiting, if any.
    pub fn try_next(&mut self) -> Option<Snapshot<T>> {
        self.rx.try_recv().ok()
    }

    /// Stop the live query. Buffered snapshots are discarded with it.
    pub fn cancel(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

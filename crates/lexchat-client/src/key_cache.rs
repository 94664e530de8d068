//! Bounded in-memory cache of conversation keys.
//!
//! Owned by whoever constructs the resolver and passed in explicitly, so its
//! lifetime and invalidation are under the caller's control. Absence is
//! cached as well ([`CachedKey::Absent`]) so keyless legacy conversations
//! are not looked up again on every refresh.

use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;
use tracing::debug;

use lexchat_shared::{ConversationId, ConversationKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedKey {
    Present(ConversationKey),
    Absent,
}

impl CachedKey {
    pub fn into_option(self) -> Option<ConversationKey> {
        match self {
            CachedKey::Present(key) => Some(key),
            CachedKey::Absent => None,
        }
    }
}

impl From<Option<ConversationKey>> for CachedKey {
    fn from(key: Option<ConversationKey>) -> Self {
        match key {
            Some(key) => CachedKey::Present(key),
            None => CachedKey::Absent,
        }
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<ConversationId, CachedKey>,
    /// Insertion order, oldest first.
    order: VecDeque<ConversationId>,
}

pub struct KeyCache {
    capacity: usize,
    inner: RwLock<CacheInner>,
}

impl KeyCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(CacheInner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn get(&self, id: &ConversationId) -> Option<CachedKey> {
        self.inner.read().await.entries.get(id).cloned()
    }

    /// Insert or replace an entry, evicting the oldest entries beyond
    /// capacity.
    pub async fn insert(&self, id: ConversationId, key: CachedKey) {
        if self.capacity == 0 {
            return;
        }

        let mut inner = self.inner.write().await;
        if inner.entries.insert(id.clone(), key).is_none() {
            inner.order.push_back(id);
        }

        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            debug!(conversation = %oldest, "Evicted conversation key from cache");
        }
    }

    /// Drop one entry. Returns whether it was cached.
    pub async fn invalidate(&self, id: &ConversationId) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner.entries.remove(id).is_some();
        if removed {
            inner.order.retain(|cached| cached != id);
        }
        removed
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.order.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

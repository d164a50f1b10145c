use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::api::ChatReply;

/// Maximum number of replies kept before the oldest insertion is evicted.
pub const CACHE_CAPACITY: usize = 100;

/// Session component of a key for requests sent without a session.
pub const ANONYMOUS_SESSION: &str = "anon";

/// Source tag reported on replies served from the cache.
pub const CACHE_SOURCE: &str = "cache";

pub type SharedResponseCache = Arc<Mutex<ResponseCache>>;

/// Lock a shared cache, recovering the data if a previous holder panicked.
pub fn lock(cache: &SharedResponseCache) -> MutexGuard<'_, ResponseCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exact `(session, message text)` pair; no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    session: String,
    message: String,
}

impl CacheKey {
    pub fn new(session_id: Option<&str>, message: &str) -> Self {
        Self {
            session: session_id.unwrap_or(ANONYMOUS_SESSION).to_string(),
            message: message.to_string(),
        }
    }
}

/// Bounded reply memo with insertion-order eviction.
///
/// Reads never refresh an entry: once an entry is the oldest insertion it is
/// the next to go, however often it was hit.
pub struct ResponseCache {
    entries: HashMap<CacheKey, ChatReply>,
    order: VecDeque<CacheKey>,
    capacity: usize,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn into_shared(self) -> SharedResponseCache {
        Arc::new(Mutex::new(self))
    }

    /// Cached reply for `key`, with latency zeroed and the source retagged.
    pub fn get(&self, key: &CacheKey) -> Option<ChatReply> {
        self.entries.get(key).map(|reply| {
            let mut hit = reply.clone();
            hit.metadata.response_time_ms = 0.0;
            hit.metadata.source = CACHE_SOURCE.to_string();
            hit
        })
    }

    pub fn put(&mut self, key: CacheKey, reply: ChatReply) {
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = reply;
            return;
        }

        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, reply);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

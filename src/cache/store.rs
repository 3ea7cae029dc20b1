//! In-process response store with per-entry expiry.

use std::sync::RwLock;
use std::time::Duration;

use bytes::Bytes;
use lru::LruCache;
use tokio::time::Instant;

use super::config::CacheConfig;
use super::keys::ResponseKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// Cached HTTP response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
struct Entry {
    response: CachedResponse,
    stored_at: Instant,
}

/// Result of a store lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    Hit(CachedResponse),
    Miss,
    /// The entry outlived its TTL and has been dropped.
    Expired,
}

/// LRU of rendered responses, each valid for `ttl` after insertion.
pub struct ResponseStore {
    ttl: Duration,
    responses: RwLock<LruCache<ResponseKey, Entry>>,
}

impl ResponseStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: config.response_ttl(),
            responses: RwLock::new(LruCache::new(config.max_entries_non_zero())),
        }
    }

    pub fn lookup(&self, key: &ResponseKey) -> Lookup {
        let now = Instant::now();
        let mut responses = rw_write(&self.responses, SOURCE, "lookup");
        let fresh = match responses.get(key) {
            None => return Lookup::Miss,
            Some(entry) => now.duration_since(entry.stored_at) < self.ttl,
        };

        if fresh {
            responses
                .peek(key)
                .map(|entry| Lookup::Hit(entry.response.clone()))
                .unwrap_or(Lookup::Miss)
        } else {
            responses.pop(key);
            Lookup::Expired
        }
    }

    pub fn get(&self, key: &ResponseKey) -> Option<CachedResponse> {
        match self.lookup(key) {
            Lookup::Hit(response) => Some(response),
            Lookup::Miss | Lookup::Expired => None,
        }
    }

    /// Store a response, returning the key evicted to make room, if any.
    pub fn insert(&self, key: ResponseKey, response: CachedResponse) -> Option<ResponseKey> {
        let entry = Entry {
            response,
            stored_at: Instant::now(),
        };
        rw_write(&self.responses, SOURCE, "insert")
            .push(key.clone(), entry)
            .and_then(|(evicted, _)| (evicted != key).then_some(evicted))
    }

    pub fn len(&self) -> usize {
        rw_read(&self.responses, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

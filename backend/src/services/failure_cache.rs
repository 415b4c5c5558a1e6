//! Cache of failed remote fetches.
//!
//! Keyed by `<remote id>:<remote path>`. Entries expire after the configured
//! TTL; the cache is bounded and evicts least recently used entries.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

const DEFAULT_CAPACITY: usize = 10_000;

/// Failure cache for remote URLs
pub struct UrlFailureCache {
    entries: Mutex<LruCache<String, Instant>>,
    ttl: Duration,
}

impl UrlFailureCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn key(remote_id: &str, path: &str) -> String {
        format!("{}:{}", remote_id, path.trim_start_matches('/'))
    }

    /// Record a failure for `key`, restarting its TTL.
    pub fn cache_failure(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(key.to_string(), Instant::now());
    }

    /// Whether a live failure is recorded for `key`. Expired entries are
    /// dropped on lookup.
    pub fn has_failed_before(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match entries.get(key) {
            Some(at) => at.elapsed() >= self.ttl,
            None => return false,
        };
        if expired {
            entries.pop(key);
        }
        !expired
    }

    pub fn remove(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.pop(key);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Get number of entries (including expired ones not yet looked up)
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

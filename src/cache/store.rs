//! Cache Store Module
//!
//! Resolved-media cache combining HashMap storage with LRU tracking and lazy TTL expiration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, LruTracker};
use crate::clock::{Clock, SystemClock};
use crate::media::ResolvedMedia;

// == Cache Miss ==
/// Why a `get` found nothing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheMiss {
    #[error("Key not found: {0}")]
    Absent(String),

    /// The entry existed but its TTL had passed; it has been removed
    #[error("Key expired: {0}")]
    Expired(String),
}

// == Cache Store ==
/// Bounded, time-expiring store of resolved media keyed by normalized link.
///
/// Not synchronized itself; callers share it behind a single mutex.
#[derive(Debug)]
pub struct CacheStore {
    entries: HashMap<String, CacheEntry>,
    lru: LruTracker,
    stats: CacheStats,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a store holding at most `max_entries` live entries.
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    /// Creates a store reading time from `clock`.
    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_entries,
            clock,
        }
    }

    // == Put ==
    /// Stores `value` under `key` for `ttl`, replacing any previous entry.
    ///
    /// Marks the key most recently used. When the store then holds more than
    /// `max_entries` entries, expired ones are dropped first and the least
    /// recently used live entries after that.
    pub fn put(&mut self, key: String, value: Arc<ResolvedMedia>, ttl: Duration) {
        let entry = CacheEntry::new(value, self.clock.now(), ttl);
        self.entries.insert(key.clone(), entry);
        self.lru.touch(&key);

        if self.entries.len() > self.max_entries {
            self.purge_expired();
        }
        while self.entries.len() > self.max_entries {
            match self.lru.evict_oldest() {
                Some(evicted) => {
                    self.entries.remove(&evicted);
                    self.stats.record_eviction();
                    debug!(key = %evicted, "Evicted least recently used cache entry");
                }
                None => break,
            }
        }

        self.stats.set_total_entries(self.entries.len());
    }

    // == Get ==
    /// Returns the live value for `key` and marks it most recently used.
    ///
    /// The returned `Arc` stays valid even if the entry is evicted or
    /// overwritten afterwards. Expired entries are removed on touch.
    pub fn get(&mut self, key: &str) -> Result<Arc<ResolvedMedia>, CacheMiss> {
        let now = self.clock.now();
        let Some(entry) = self.entries.get(key) else {
            self.stats.record_miss();
            return Err(CacheMiss::Absent(key.to_string()));
        };

        if entry.is_expired(now) {
            self.remove_entry(key);
            self.stats.record_expiration();
            self.stats.record_miss();
            return Err(CacheMiss::Expired(key.to_string()));
        }

        let value = Arc::clone(&entry.value);
        self.lru.touch(key);
        self.stats.record_hit();
        Ok(value)
    }

    // == Remove ==
    /// Removes an entry by key, returning whether it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        let existed = self.remove_entry(key);
        self.stats.set_total_entries(self.entries.len());
        existed
    }

    // == Purge Expired ==
    /// Removes every entry whose TTL has passed and returns how many.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_entry(key);
            self.stats.record_expiration();
        }

        self.stats.set_total_entries(self.entries.len());
        expired.len()
    }

    /// Drops every entry; counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.stats.set_total_entries(0);
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        self.lru.remove(key);
        let existed = self.entries.remove(key).is_some();
        self.stats.set_total_entries(self.entries.len());
        existed
    }
}

//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::media::ResolvedMedia;

/// Expiry used when `inserted_at + ttl` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

// == Cache Entry ==
/// A resolved lookup result with its lifetime.
///
/// Entries are never mutated after insertion; overwriting a key replaces
/// the whole entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored result, shared with readers
    pub value: Arc<ResolvedMedia>,
    pub inserted_at: Instant,
    /// `inserted_at + ttl`, saturating at a far-future instant
    pub expires_at: Instant,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry inserted at `now` living for `ttl`.
    pub fn new(value: Arc<ResolvedMedia>, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at: now,
            expires_at: expiry(now, ttl),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `now >= expires_at`, so
    /// a lookup exactly `ttl` after insertion already misses.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Remaining lifetime at `now`, zero once expired.
    pub fn ttl_remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

//! A single cache entry and its lifecycle bookkeeping.

use serde_json::Value;
use std::time::{Duration, Instant};

/// One cached value with TTL, access stats, and dependency tags.
///
/// Created on `set`, touched on every hit, destroyed by expiry cleanup,
/// LRU eviction, or dependency invalidation.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub created_at: Instant,
    pub ttl: Duration,
    pub access_count: u64,
    pub last_accessed: Instant,
    /// Dependency tags this entry is registered under.
    pub deps: Vec<String>,
}

impl CacheEntry {
    pub fn new(value: Value, ttl: Duration, deps: Vec<String>) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed: now,
            deps,
        }
    }

    /// Age of the entry at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.age(now) >= self.ttl
    }

    /// Stale means still live but past `staleness_threshold` of the TTL, at
    /// which point a background refresh is worthwhile.
    pub fn is_stale(&self, now: Instant, staleness_threshold: f64) -> bool {
        !self.is_expired(now) && self.age(now).as_secs_f64() > self.ttl.as_secs_f64() * staleness_threshold
    }

    /// Record a hit.
    pub fn touch(&mut self, now: Instant) {
        self.access_count += 1;
        self.last_accessed = now;
    }
}

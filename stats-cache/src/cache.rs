//! TTL + LRU cache with dependency-tag invalidation.
//!
//! One mutex guards the entry map, the dependency index, and the hit/miss
//! counters together, so reported statistics are always consistent with the
//! actual entries. Producer invocations never run under that mutex: a miss
//! releases the lock, computes, and re-acquires it only for the insert, so a
//! slow calculator never stalls unrelated cache traffic.

use crate::entry::CacheEntry;
use crate::key::cache_key;
use common::{CacheConfig, CacheResult, Producer};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One lookup in a batch: key parts plus the optional producer/ttl/deps used
/// when the key has to be computed.
#[derive(Clone)]
pub struct CacheRequest {
    pub key_parts: Vec<String>,
    pub producer: Option<Arc<dyn Producer>>,
    pub ttl: Option<Duration>,
    pub deps: Vec<String>,
}

impl CacheRequest {
    pub fn new(key_parts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            key_parts: key_parts.into_iter().map(Into::into).collect(),
            producer: None,
            ttl: None,
            deps: Vec::new(),
        }
    }

    pub fn with_producer(mut self, producer: Arc<dyn Producer>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_deps(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.deps = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// One insert in a batch.
pub struct SetRequest {
    pub key_parts: Vec<String>,
    pub value: Value,
    pub ttl: Option<Duration>,
    pub deps: Vec<String>,
}

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub entries: usize,
    pub hit_rate: f64,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    sets: u64,
    evictions: u64,
    expirations: u64,
    invalidations: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// dependency tag -> keys registered under it. Never references a key
    /// absent from `entries`.
    dep_index: HashMap<String, HashSet<String>>,
    /// Keys with a stale-refresh currently in flight.
    refreshing: HashSet<String>,
    counters: Counters,
}

/// Keyed, TTL-expiring, LRU-evicting store with dependency-tag invalidation.
pub struct StatsCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
}

impl StatsCache {
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                dep_index: HashMap::new(),
                refreshing: HashSet::new(),
                counters: Counters::default(),
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a key. Counts a hit or a miss; expired entries are removed
    /// lazily and reported as misses.
    pub fn get<S: AsRef<str>>(&self, key_parts: &[S]) -> Option<Value> {
        let key = cache_key(key_parts);
        let mut inner = self.inner.lock();
        Self::lookup_live(&mut inner, &key)
    }

    /// Look up a key, computing it through `producer` on a miss.
    ///
    /// The producer runs without the cache lock held. A producer error is
    /// logged and surfaced as a plain miss (`None`) — callers cannot
    /// distinguish "never cached" from "calculator failed" here; producers
    /// needing that distinction must signal through their own channel.
    ///
    /// If the entry is live but past the staleness threshold, one background
    /// refresh is spawned (deduplicated per key) and the current value is
    /// returned immediately (stale-while-revalidate).
    ///
    /// Concurrent misses on the same key each invoke their own producer; there
    /// is deliberately no single-flight coalescing, the last write wins.
    pub async fn get_or_compute<S: AsRef<str>>(
        self: &Arc<Self>,
        key_parts: &[S],
        producer: Arc<dyn Producer>,
        ttl: Option<Duration>,
        deps: &[String],
    ) -> Option<Value> {
        self.get_or_compute_traced(key_parts, producer, ttl, deps)
            .await
            .0
    }

    /// Same as [`get_or_compute`](Self::get_or_compute) but also reports
    /// whether the lookup was a hit. Used by the manager's profile updates.
    pub async fn get_or_compute_traced<S: AsRef<str>>(
        self: &Arc<Self>,
        key_parts: &[S],
        producer: Arc<dyn Producer>,
        ttl: Option<Duration>,
        deps: &[String],
    ) -> (Option<Value>, bool) {
        let key = cache_key(key_parts);
        let ttl = ttl.unwrap_or(self.config.default_ttl);

        {
            let mut inner = self.inner.lock();
            if let Some(value) = Self::lookup_live(&mut inner, &key) {
                if Self::should_refresh(&inner, &key, self.config.staleness_threshold)
                    && inner.refreshing.insert(key.clone())
                {
                    self.spawn_refresh(key, Arc::clone(&producer), ttl, deps.to_vec());
                }
                return (Some(value), true);
            }
        }

        match producer.compute().await {
            Ok(value) => {
                self.set_raw(key, value.clone(), ttl, deps);
                (Some(value), false)
            }
            Err(e) => {
                warn!(key = %cache_key(key_parts), error = %e, "producer failed; treating as miss");
                (None, false)
            }
        }
    }

    /// Insert or replace an entry, evicting least-recently-accessed entries
    /// first if at capacity.
    pub fn set<S: AsRef<str>>(
        &self,
        key_parts: &[S],
        value: Value,
        ttl: Option<Duration>,
        deps: &[String],
    ) {
        let key = cache_key(key_parts);
        self.set_raw(key, value, ttl.unwrap_or(self.config.default_ttl), deps);
    }

    /// Remove every entry registered under `tag`; returns the removed count.
    pub fn invalidate(&self, tag: &str) -> usize {
        let mut inner = self.inner.lock();
        let keys = match inner.dep_index.remove(tag) {
            Some(keys) => keys,
            None => return 0,
        };
        let mut removed = 0;
        for key in keys {
            if Self::remove_key(&mut inner, &key) {
                removed += 1;
            }
        }
        inner.counters.invalidations += removed as u64;
        debug!(tag, removed, "dependency invalidation");
        removed
    }

    /// Linear scan removing keys containing `pattern`. Slow path for ad-hoc
    /// cleanup only.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut inner = self.inner.lock();
        let matching: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| k.contains(pattern))
            .cloned()
            .collect();
        let mut removed = 0;
        for key in &matching {
            if Self::remove_key(&mut inner, key) {
                removed += 1;
            }
        }
        inner.counters.invalidations += removed as u64;
        removed
    }

    /// Resolve a batch of lookups. Hits (and stale-refresh spawns) are
    /// resolved in one pass under a single lock acquisition; misses with
    /// producers are computed in a second pass without the lock.
    pub async fn batch_get_or_compute(
        self: &Arc<Self>,
        requests: Vec<CacheRequest>,
    ) -> Vec<Option<Value>> {
        self.batch_get_or_compute_traced(requests).await.0
    }

    /// Same as [`batch_get_or_compute`](Self::batch_get_or_compute) but also
    /// reports the per-item hit flags for profile bookkeeping.
    pub async fn batch_get_or_compute_traced(
        self: &Arc<Self>,
        requests: Vec<CacheRequest>,
    ) -> (Vec<Option<Value>>, Vec<bool>) {
        let mut results: Vec<Option<Value>> = vec![None; requests.len()];
        let mut hits: Vec<bool> = vec![false; requests.len()];
        let mut misses: Vec<usize> = Vec::new();

        {
            let mut inner = self.inner.lock();
            for (i, req) in requests.iter().enumerate() {
                let key = cache_key(&req.key_parts);
                if let Some(value) = Self::lookup_live(&mut inner, &key) {
                    if let Some(producer) = &req.producer {
                        if Self::should_refresh(&inner, &key, self.config.staleness_threshold)
                            && inner.refreshing.insert(key.clone())
                        {
                            let ttl = req.ttl.unwrap_or(self.config.default_ttl);
                            self.spawn_refresh(key, Arc::clone(producer), ttl, req.deps.clone());
                        }
                    }
                    results[i] = Some(value);
                    hits[i] = true;
                } else {
                    misses.push(i);
                }
            }
        }

        for i in misses {
            let req = &requests[i];
            let Some(producer) = &req.producer else {
                continue;
            };
            match producer.compute().await {
                Ok(value) => {
                    self.set(
                        &req.key_parts,
                        value.clone(),
                        req.ttl,
                        &req.deps,
                    );
                    results[i] = Some(value);
                }
                Err(e) => {
                    warn!(key = %cache_key(&req.key_parts), error = %e, "batch producer failed; treating as miss");
                }
            }
        }

        (results, hits)
    }

    /// Plain batch lookup without producers.
    pub fn batch_get(&self, requests: &[Vec<String>]) -> Vec<Option<Value>> {
        let mut inner = self.inner.lock();
        requests
            .iter()
            .map(|parts| Self::lookup_live(&mut inner, &cache_key(parts)))
            .collect()
    }

    pub fn batch_set(&self, items: Vec<SetRequest>) {
        for item in items {
            self.set(&item.key_parts, item.value, item.ttl, &item.deps);
        }
    }

    /// Invalidate several tags; returns the total removed count.
    pub fn batch_invalidate(&self, tags: &[String]) -> usize {
        tags.iter().map(|tag| self.invalidate(tag)).sum()
    }

    /// Remove one key regardless of expiry. Returns whether it existed.
    pub fn remove<S: AsRef<str>>(&self, key_parts: &[S]) -> bool {
        let key = cache_key(key_parts);
        let mut inner = self.inner.lock();
        Self::remove_key(&mut inner, &key)
    }

    /// Drop everything, counters excluded.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.dep_index.clear();
    }

    /// Sweep expired entries; returns the number removed. Run periodically by
    /// the cache_cleanup maintenance task.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        let mut removed = 0;
        for key in &expired {
            if Self::remove_key(&mut inner, key) {
                removed += 1;
            }
        }
        inner.counters.expirations += removed as u64;
        if removed > 0 {
            debug!(removed, "expired entry sweep");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let c = &inner.counters;
        let requests = c.hits + c.misses;
        CacheStats {
            hits: c.hits,
            misses: c.misses,
            sets: c.sets,
            evictions: c.evictions,
            expirations: c.expirations,
            invalidations: c.invalidations,
            entries: inner.entries.len(),
            hit_rate: if requests == 0 {
                0.0
            } else {
                c.hits as f64 / requests as f64
            },
        }
    }

    // --- internals -------------------------------------------------------

    /// Live lookup with lazy expiry; counts exactly one hit or miss.
    fn lookup_live(inner: &mut CacheInner, key: &str) -> Option<Value> {
        let now = Instant::now();
        match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.touch(now);
                inner.counters.hits += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                Self::remove_key(inner, key);
                inner.counters.expirations += 1;
                inner.counters.misses += 1;
                None
            }
            None => {
                inner.counters.misses += 1;
                None
            }
        }
    }

    fn should_refresh(inner: &CacheInner, key: &str, staleness_threshold: f64) -> bool {
        inner
            .entries
            .get(key)
            .map(|e| e.is_stale(Instant::now(), staleness_threshold))
            .unwrap_or(false)
            && !inner.refreshing.contains(key)
    }

    fn spawn_refresh(
        self: &Arc<Self>,
        key: String,
        producer: Arc<dyn Producer>,
        ttl: Duration,
        deps: Vec<String>,
    ) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            match producer.compute().await {
                Ok(value) => {
                    cache.set_raw(key.clone(), value, ttl, &deps);
                    debug!(key = %key, "stale entry refreshed");
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "stale refresh failed; keeping current value");
                }
            }
            cache.inner.lock().refreshing.remove(&key);
        });
    }

    fn set_raw(&self, key: String, value: Value, ttl: Duration, deps: &[String]) {
        let mut inner = self.inner.lock();

        // Replacing an existing key must unregister its old tags first so the
        // dependency index never holds stale registrations.
        if inner.entries.contains_key(&key) {
            Self::remove_key(&mut inner, &key);
        } else if inner.entries.len() >= self.config.max_entries {
            let excess = inner.entries.len() + 1 - self.config.max_entries;
            Self::evict_lru(&mut inner, excess);
        }

        for tag in deps {
            inner
                .dep_index
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        inner
            .entries
            .insert(key, CacheEntry::new(value, ttl, deps.to_vec()));
        inner.counters.sets += 1;
    }

    /// Evict the `count` least-recently-accessed entries.
    fn evict_lru(inner: &mut CacheInner, count: usize) {
        let mut by_access: Vec<(Instant, String)> = inner
            .entries
            .iter()
            .map(|(k, e)| (e.last_accessed, k.clone()))
            .collect();
        by_access.sort_by_key(|(at, _)| *at);
        let mut evicted = 0;
        for (_, key) in by_access.into_iter().take(count) {
            if Self::remove_key(inner, &key) {
                evicted += 1;
            }
        }
        inner.counters.evictions += evicted as u64;
        debug!(evicted, "LRU eviction");
    }

    /// Remove an entry and scrub it from the dependency index.
    fn remove_key(inner: &mut CacheInner, key: &str) -> bool {
        match inner.entries.remove(key) {
            Some(entry) => {
                for tag in &entry.deps {
                    if let Some(bucket) = inner.dep_index.get_mut(tag) {
                        bucket.remove(key);
                        if bucket.is_empty() {
                            inner.dep_index.remove(tag);
                        }
                    }
                }
                true
            }
            None => false,
        }
    }
}

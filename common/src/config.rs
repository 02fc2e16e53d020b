//! Configuration structs with validated defaults.
//!
//! Every subsystem takes an explicit config struct at construction time and
//! validates it up front; no optional fields with implicit fallbacks deep in
//! the call path.

use crate::errors::ConfigError;
use std::time::Duration;

/// Configuration for [`StatsCache`](../../stats_cache/struct.StatsCache.html).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when `set`/`get_or_compute` are called without one.
    pub default_ttl: Duration,
    /// Hard cap on entry count; LRU eviction keeps the cache at or below it.
    pub max_entries: usize,
    /// Cadence of the expired-entry sweep run by maintenance.
    pub cleanup_interval: Duration,
    /// Fraction of the TTL after which an entry is considered stale and a
    /// background refresh may be triggered (stale-while-revalidate).
    pub staleness_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_entries: 1000,
            cleanup_interval: Duration::from_secs(60),
            staleness_threshold: 0.8,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError("max_entries must be > 0".to_string()));
        }
        if self.default_ttl.is_zero() {
            return Err(ConfigError("default_ttl must be > 0".to_string()));
        }
        if self.cleanup_interval.is_zero() {
            return Err(ConfigError("cleanup_interval must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.staleness_threshold) {
            return Err(ConfigError(format!(
                "staleness_threshold must be within [0, 1], got {}",
                self.staleness_threshold
            )));
        }
        Ok(())
    }
}

/// Configuration for the cache warming worker.
#[derive(Debug, Clone)]
pub struct WarmingConfig {
    /// How often the worker wakes to drain the queue.
    pub worker_interval: Duration,
    /// Max warming tasks popped (and executed) per wake.
    pub max_warming_workers: usize,
    /// Queue length cap; further enqueues are dropped with a warning.
    pub max_queue_len: usize,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            worker_interval: Duration::from_secs(1),
            max_warming_workers: 4,
            max_queue_len: 1024,
        }
    }
}

impl WarmingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_interval.is_zero() {
            return Err(ConfigError("worker_interval must be > 0".to_string()));
        }
        if self.max_warming_workers == 0 {
            return Err(ConfigError("max_warming_workers must be > 0".to_string()));
        }
        if self.max_queue_len == 0 {
            return Err(ConfigError("max_queue_len must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Configuration for the performance monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often the collection loop samples every metric source.
    pub collection_interval: Duration,
    /// Samples older than this are pruned from the time-series rings.
    pub retention_window: Duration,
    /// Minimum samples before trend detection produces a result.
    pub trend_min_samples: usize,
    /// Trends below this confidence are not surfaced in reports.
    pub trend_confidence_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(30),
            retention_window: Duration::from_secs(24 * 3600),
            trend_min_samples: 20,
            trend_confidence_threshold: 0.7,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection_interval.is_zero() {
            return Err(ConfigError("collection_interval must be > 0".to_string()));
        }
        if self.retention_window.is_zero() {
            return Err(ConfigError("retention_window must be > 0".to_string()));
        }
        if self.trend_min_samples < 2 {
            return Err(ConfigError("trend_min_samples must be >= 2".to_string()));
        }
        if !(0.0..=1.0).contains(&self.trend_confidence_threshold) {
            return Err(ConfigError(format!(
                "trend_confidence_threshold must be within [0, 1], got {}",
                self.trend_confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Configuration for the task scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Tick cadence of the scheduler loop.
    pub check_interval: Duration,
    /// Max tasks executing at once; due tasks beyond this wait for the next
    /// tick.
    pub max_concurrent_tasks: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(1),
            max_concurrent_tasks: 3,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval.is_zero() {
            return Err(ConfigError("check_interval must be > 0".to_string()));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError("max_concurrent_tasks must be > 0".to_string()));
        }
        Ok(())
    }
}

//! Common types and utilities shared across the caching/observability crates.
//!
//! This crate provides foundational types, error definitions, and the
//! capability traits that the cache, monitor, and scheduler crates build on.
//!
//! # Architecture
//!
//! The `common` crate sits at the bottom of the dependency hierarchy:
//! - Has NO dependencies on other workspace crates
//! - Provides shared types that all other crates can use
//! - Ensures type consistency across the entire system

pub mod batch;
pub mod config;
pub mod errors;
pub mod producer;

pub use batch::{BatchMetrics, BatchMetricsSource};
pub use config::{CacheConfig, MonitorConfig, SchedulerConfig, WarmingConfig};
pub use errors::{
    CacheError, CacheResult, ConfigError, MonitorError, MonitorResult, SchedulerError,
    SchedulerResult,
};
pub use producer::{producer_fn, Producer};

use serde::{Deserialize, Serialize};

/// Logical grouping of cached statistics (player stats, game stats,
/// leaderboards, opening stats, ...).
///
/// **Type Safety**: Using the newtype pattern instead of a bare `String`
/// prevents accidental mixing of categories with cache keys or dependency
/// tags at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheCategory(String);

impl CacheCategory {
    /// Create a new category from a string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CacheCategory {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CacheCategory {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(uuid::Uuid);

impl TaskId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner uuid.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for TaskId {
    fn from(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_category_roundtrip() {
        let cat = CacheCategory::new("player-stats");
        assert_eq!(cat.as_str(), "player-stats");
        assert_eq!(cat.to_string(), "player-stats");
        assert_eq!(CacheCategory::from("player-stats"), cat);
        assert_eq!(cat.into_inner(), "player-stats");
    }

    #[test]
    fn test_task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }
}

//! In-process result cache for the statistics backend.
//!
//! Two layers live here:
//!
//! - [`StatsCache`] — a keyed, TTL-expiring, LRU-evicting store with
//!   dependency-tag invalidation and stale-while-revalidate refresh.
//! - [`CacheManager`] — wraps the cache with access-pattern tracking, a
//!   priority-ordered background warming worker, per-category performance
//!   profiles, and rule-based optimization suggestions.
//!
//! Everything is single-process and memory-resident; nothing survives a
//! restart.

pub mod cache;
pub mod entry;
pub mod key;
pub mod manager;
pub mod profile;
pub mod warming;

pub use cache::{CacheRequest, CacheStats, StatsCache};
pub use entry::CacheEntry;
pub use key::cache_key;
pub use manager::{CacheManager, OptimizationSuggestion, PerformanceReport};
pub use profile::PerformanceProfile;
pub use warming::{WarmingStrategy, WarmingTask};

//! Performance monitoring for the caching runtime.
//!
//! [`PerformanceMonitor`] polls the cache, the cache manager, process
//! resource usage, and the external batch-processing collaborator on a fixed
//! interval; stores bounded metric time-series; detects trends; raises
//! threshold alerts; and computes a weighted 0-100 system health score.
//!
//! A failure in any metric source is counted and skipped; the collection
//! loop itself never aborts.

pub mod alerts;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod trend;

pub use alerts::{Alert, AlertSeverity, AlertThresholds};
pub use health::HealthScores;
pub use metrics::{MetricSample, MetricType};
pub use monitor::{HealthReport, MonitorStats, PerformanceMonitor};
pub use trend::{Trend, TrendDirection};

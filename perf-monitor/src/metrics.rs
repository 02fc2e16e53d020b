//! Metric types and time-series samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything the monitor tracks. Units per metric:
/// hit rate / eviction rate / CPU / batch error rate in percent (0-100),
/// cache size in entries, memory in MB, batch processing time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    CacheHitRate,
    CacheSize,
    CacheEvictionRate,
    MemoryUsage,
    CpuUsage,
    BatchProcessingTime,
    BatchErrorRate,
}

impl MetricType {
    pub const ALL: [MetricType; 7] = [
        MetricType::CacheHitRate,
        MetricType::CacheSize,
        MetricType::CacheEvictionRate,
        MetricType::MemoryUsage,
        MetricType::CpuUsage,
        MetricType::BatchProcessingTime,
        MetricType::BatchErrorRate,
    ];

    /// Breach direction: hit-rate-type metrics alert when the value drops
    /// BELOW a threshold; everything else alerts when ABOVE.
    pub fn alerts_when_below(&self) -> bool {
        matches!(self, MetricType::CacheHitRate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::CacheHitRate => "cache_hit_rate",
            MetricType::CacheSize => "cache_size",
            MetricType::CacheEvictionRate => "cache_eviction_rate",
            MetricType::MemoryUsage => "memory_usage",
            MetricType::CpuUsage => "cpu_usage",
            MetricType::BatchProcessingTime => "batch_processing_time",
            MetricType::BatchErrorRate => "batch_error_rate",
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One point in a metric time-series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl MetricSample {
    pub fn new(value: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            value,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breach_direction() {
        assert!(MetricType::CacheHitRate.alerts_when_below());
        assert!(!MetricType::CpuUsage.alerts_when_below());
        assert!(!MetricType::BatchErrorRate.alerts_when_below());
    }

    #[test]
    fn test_metric_serializes_snake_case() {
        let s = serde_json::to_string(&MetricType::BatchProcessingTime).unwrap();
        assert_eq!(s, "\"batch_processing_time\"");
    }
}

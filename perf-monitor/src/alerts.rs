//! Threshold alerts.

use crate::metrics::MetricType;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Per-metric breach thresholds. Whether a value breaches above or below is
/// decided by [`MetricType::alerts_when_below`].
#[derive(Debug, Clone, Copy)]
pub struct AlertThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl AlertThresholds {
    /// Default thresholds per metric, in the metric's own unit.
    pub fn default_for(metric: MetricType) -> Self {
        match metric {
            MetricType::CacheHitRate => Self {
                medium: 60.0,
                high: 45.0,
                critical: 30.0,
            },
            MetricType::CacheSize => Self {
                medium: 800.0,
                high: 950.0,
                critical: 1000.0,
            },
            MetricType::CacheEvictionRate => Self {
                medium: 10.0,
                high: 30.0,
                critical: 50.0,
            },
            MetricType::MemoryUsage => Self {
                medium: 512.0,
                high: 1024.0,
                critical: 2048.0,
            },
            MetricType::CpuUsage => Self {
                medium: 60.0,
                high: 80.0,
                critical: 95.0,
            },
            MetricType::BatchProcessingTime => Self {
                medium: 1.0,
                high: 5.0,
                critical: 15.0,
            },
            MetricType::BatchErrorRate => Self {
                medium: 5.0,
                high: 10.0,
                critical: 25.0,
            },
        }
    }

    pub fn threshold_for(&self, severity: AlertSeverity) -> f64 {
        match severity {
            AlertSeverity::Low | AlertSeverity::Medium => self.medium,
            AlertSeverity::High => self.high,
            AlertSeverity::Critical => self.critical,
        }
    }

    /// Highest severity breached by `value`, if any.
    pub fn breached_severity(&self, metric: MetricType, value: f64) -> Option<AlertSeverity> {
        let breaches = |threshold: f64| {
            if metric.alerts_when_below() {
                value < threshold
            } else {
                value > threshold
            }
        };
        for severity in [
            AlertSeverity::Critical,
            AlertSeverity::High,
            AlertSeverity::Medium,
        ] {
            if breaches(self.threshold_for(severity)) {
                return Some(severity);
            }
        }
        None
    }
}

/// An alert stays active until explicitly acknowledged or cleared.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: Uuid,
    pub metric: MetricType,
    pub severity: AlertSeverity,
    pub message: String,
    pub current_value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
    pub resolution_notes: Option<String>,
}

impl Alert {
    pub fn new(metric: MetricType, severity: AlertSeverity, value: f64, threshold: f64) -> Self {
        let direction = if metric.alerts_when_below() {
            "below"
        } else {
            "above"
        };
        Self {
            id: Uuid::new_v4(),
            metric,
            severity,
            message: format!(
                "{} is {:.2}, {} the {:?} threshold of {:.2}",
                metric, value, direction, severity, threshold
            ),
            current_value: value,
            threshold,
            timestamp: Utc::now(),
            acknowledged: false,
            resolution_notes: None,
        }
    }
}

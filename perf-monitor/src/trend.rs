//! Half-window trend detection over metric time-series.

use crate::metrics::MetricType;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Detected trend for one metric.
#[derive(Debug, Clone, Serialize)]
pub struct Trend {
    pub metric: MetricType,
    pub direction: TrendDirection,
    /// Percent change between the first and second half of the window.
    pub change_percentage: f64,
    /// |change| / 50, capped at 1.
    pub strength: f64,
    /// 1 − stdev/mean over the window, floored at 0.
    pub confidence: f64,
    /// Number of samples the detection ran over.
    pub window: usize,
}

/// Detect a trend over `values` (oldest first).
///
/// Requires at least `min_samples` points. The window is split in half and
/// the means compared: `change = (second − first) / first × 100`. Direction
/// is stable inside a ±5% band. Returns `None` for short series or a
/// first-half mean of zero (change undefined).
pub fn detect(metric: MetricType, values: &[f64], min_samples: usize) -> Option<Trend> {
    if values.len() < min_samples {
        return None;
    }
    let mid = values.len() / 2;
    let first_avg = mean(&values[..mid]);
    let second_avg = mean(&values[mid..]);
    if first_avg.abs() < f64::EPSILON {
        return None;
    }

    let change_percentage = (second_avg - first_avg) / first_avg * 100.0;
    let direction = if change_percentage.abs() < 5.0 {
        TrendDirection::Stable
    } else if change_percentage > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    };

    let overall_mean = mean(values);
    let confidence = if overall_mean.abs() < f64::EPSILON {
        0.0
    } else {
        (1.0 - stdev(values, overall_mean) / overall_mean).max(0.0)
    };

    Some(Trend {
        metric,
        direction,
        change_percentage,
        strength: (change_percentage.abs() / 50.0).min(1.0),
        confidence,
        window: values.len(),
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn stdev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_increase_detected() {
        // 25 samples: 100, 105, ..., 220.
        let values: Vec<f64> = (0..25).map(|i| 100.0 + 5.0 * i as f64).collect();
        let trend = detect(MetricType::CpuUsage, &values, 20).unwrap();
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!(trend.change_percentage > 5.0);
        assert!(trend.strength > 0.0);
    }

    #[test]
    fn test_flat_series_is_stable() {
        let values = vec![50.0; 30];
        let trend = detect(MetricType::CacheHitRate, &values, 20).unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
        // No spread at all: fully confident.
        assert!((trend.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_too_few_samples() {
        let values = vec![1.0; 10];
        assert!(detect(MetricType::CpuUsage, &values, 20).is_none());
    }

    #[test]
    fn test_decreasing_direction() {
        let values: Vec<f64> = (0..25).map(|i| 200.0 - 5.0 * i as f64).collect();
        let trend = detect(MetricType::MemoryUsage, &values, 20).unwrap();
        assert_eq!(trend.direction, TrendDirection::Decreasing);
        assert!(trend.change_percentage < -5.0);
    }
}

//! Per-category performance profiles, recomputed as running averages.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Continuously updated performance picture of one cache category.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceProfile {
    /// Running hit rate in [0, 1].
    pub hit_rate: f64,
    /// Running mean response time in seconds.
    pub average_response_time: f64,
    pub cache_size: usize,
    /// Evictions per set, from the cache-wide counters.
    pub eviction_rate: f64,
    /// Successful warms per attempted warm for this category.
    pub warming_efficiency: f64,
    pub total_requests: u64,
    pub last_updated: DateTime<Utc>,
}

impl Default for PerformanceProfile {
    fn default() -> Self {
        Self {
            hit_rate: 0.0,
            average_response_time: 0.0,
            cache_size: 0,
            eviction_rate: 0.0,
            warming_efficiency: 0.0,
            total_requests: 0,
            last_updated: Utc::now(),
        }
    }
}

impl PerformanceProfile {
    /// Fold one request into the running averages:
    /// `avg = avg*(n-1)/n + sample/n`.
    pub fn record_request(&mut self, hit: bool, response_time_secs: f64) {
        let n = (self.total_requests + 1) as f64;
        let hit_sample = if hit { 1.0 } else { 0.0 };
        self.hit_rate = self.hit_rate * (n - 1.0) / n + hit_sample / n;
        self.average_response_time =
            self.average_response_time * (n - 1.0) / n + response_time_secs / n;
        self.total_requests += 1;
        self.last_updated = Utc::now();
    }

    /// Fold one warming attempt into the efficiency average.
    pub fn record_warming(&mut self, attempted: u64, succeeded: bool) {
        let n = attempted as f64;
        let sample = if succeeded { 1.0 } else { 0.0 };
        self.warming_efficiency = self.warming_efficiency * (n - 1.0) / n + sample / n;
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_running_average() {
        let mut profile = PerformanceProfile::default();
        // 3 hits, 1 miss => 0.75
        profile.record_request(true, 0.1);
        profile.record_request(true, 0.1);
        profile.record_request(false, 0.1);
        profile.record_request(true, 0.1);

        assert!((profile.hit_rate - 0.75).abs() < 1e-9);
        assert_eq!(profile.total_requests, 4);
    }

    #[test]
    fn test_response_time_running_average() {
        let mut profile = PerformanceProfile::default();
        profile.record_request(true, 0.2);
        profile.record_request(true, 0.4);
        assert!((profile.average_response_time - 0.3).abs() < 1e-9);
    }
}

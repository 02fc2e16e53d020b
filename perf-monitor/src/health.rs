//! Weighted system health scoring.
//!
//! Each sub-score starts at 100 and loses fixed penalties when the recent
//! (last-10-sample) average crosses a threshold. The penalty table:
//!
//! | sub-score  | condition            | penalty |
//! |------------|----------------------|---------|
//! | cache      | hit_rate < 50        | −30     |
//! | cache      | 50 ≤ hit_rate < 70   | −15     |
//! | resource   | cpu > 80             | −30     |
//! | resource   | 60 < cpu ≤ 80        | −15     |
//! | error      | error_rate > 10      | −50     |
//! | error      | 5 < error_rate ≤ 10  | −25     |
//! | error      | 1 < error_rate ≤ 5   | −10     |
//!
//! `overall = cache·0.5 + resource·0.3 + error·0.2`. A metric with no
//! samples yet contributes its unpenalized 100.

use serde::Serialize;

/// Number of most-recent samples averaged for scoring.
pub const HEALTH_WINDOW: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct HealthScores {
    pub overall: f64,
    pub cache: f64,
    pub resource: f64,
    pub error: f64,
}

impl HealthScores {
    pub fn compute(
        recent_hit_rate: Option<f64>,
        recent_cpu: Option<f64>,
        recent_error_rate: Option<f64>,
    ) -> Self {
        let cache = cache_score(recent_hit_rate);
        let resource = resource_score(recent_cpu);
        let error = error_score(recent_error_rate);
        Self {
            overall: cache * 0.5 + resource * 0.3 + error * 0.2,
            cache,
            resource,
            error,
        }
    }
}

fn cache_score(hit_rate_percent: Option<f64>) -> f64 {
    match hit_rate_percent {
        Some(rate) if rate < 50.0 => 70.0,
        Some(rate) if rate < 70.0 => 85.0,
        _ => 100.0,
    }
}

fn resource_score(cpu_percent: Option<f64>) -> f64 {
    match cpu_percent {
        Some(cpu) if cpu > 80.0 => 70.0,
        Some(cpu) if cpu > 60.0 => 85.0,
        _ => 100.0,
    }
}

fn error_score(error_rate_percent: Option<f64>) -> f64 {
    match error_rate_percent {
        Some(rate) if rate > 10.0 => 50.0,
        Some(rate) if rate > 5.0 => 75.0,
        Some(rate) if rate > 1.0 => 90.0,
        _ => 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_system_scores_100() {
        let scores = HealthScores::compute(Some(95.0), Some(20.0), Some(0.5));
        assert_eq!(scores.overall, 100.0);
    }

    #[test]
    fn test_cache_penalties() {
        assert_eq!(HealthScores::compute(Some(40.0), None, None).cache, 70.0);
        assert_eq!(HealthScores::compute(Some(60.0), None, None).cache, 85.0);
        assert_eq!(HealthScores::compute(Some(70.0), None, None).cache, 100.0);
    }

    #[test]
    fn test_error_penalties() {
        assert_eq!(HealthScores::compute(None, None, Some(15.0)).error, 50.0);
        assert_eq!(HealthScores::compute(None, None, Some(7.0)).error, 75.0);
        assert_eq!(HealthScores::compute(None, None, Some(3.0)).error, 90.0);
    }

    #[test]
    fn test_weighted_overall() {
        // cache 70, resource 70, error 50 -> 35 + 21 + 10 = 66.
        let scores = HealthScores::compute(Some(40.0), Some(90.0), Some(20.0));
        assert!((scores.overall - 66.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_samples_is_unpenalized() {
        let scores = HealthScores::compute(None, None, None);
        assert_eq!(scores.overall, 100.0);
    }
}

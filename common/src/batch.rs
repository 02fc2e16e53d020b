//! Contract for the external batch-processing collaborator.
//!
//! The monitor polls this source every collection cycle; it is implemented
//! elsewhere (the batch job runner) and injected at construction time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Aggregate metrics reported by the batch processor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchMetrics {
    pub total_jobs: u64,
    pub successful_jobs: u64,
    pub failed_jobs: u64,
    /// Mean wall-clock seconds per job.
    pub average_processing_time: f64,
}

impl BatchMetrics {
    /// Failed fraction of all jobs, 0.0 when no jobs have run.
    pub fn error_rate(&self) -> f64 {
        if self.total_jobs == 0 {
            0.0
        } else {
            self.failed_jobs as f64 / self.total_jobs as f64
        }
    }
}

/// Anything that can report batch-processing metrics on demand.
#[async_trait]
pub trait BatchMetricsSource: Send + Sync {
    async fn get_performance_metrics(&self) -> anyhow::Result<BatchMetrics>;
}

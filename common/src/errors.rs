//! Error types for the caching and observability subsystems.
//!
//! Each subsystem gets its own error enum and `Result` alias, following the
//! one-enum-per-crate-boundary convention used across the workspace. Failures
//! never cross subsystem boundaries implicitly: a producer error becomes a
//! cache miss, a task error drives the retry state machine, a collection
//! error is counted and the loop continues.

use thiserror::Error;

/// Invalid configuration detected at construction time.
#[derive(Debug, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Error types for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Configuration rejected at construction.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A caller-supplied producer failed. Callers never see this through
    /// `get_or_compute` (it is logged and surfaced as a miss); it exists for
    /// internal warming paths that need to count failures.
    #[error("Producer error: {0}")]
    Producer(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The warming worker or cache is shutting down.
    #[error("Shutdown in progress: {0}")]
    Shutdown(String),
}

/// Error types for the performance monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration rejected at construction.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Unknown export format requested.
    #[error("Invalid export format: {0}")]
    InvalidFormat(String),

    /// A metric source failed during collection.
    #[error("Collection error: {0}")]
    Collection(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Monitor is already running or already stopped.
    #[error("Invalid monitor state: {0}")]
    InvalidState(String),
}

/// Error types for the task scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration rejected at construction.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No task registered under the given id.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// The task is currently executing.
    #[error("Task already running: {0}")]
    AlreadyRunning(String),

    /// A task function returned an error.
    #[error("Task execution failed: {0}")]
    Execution(String),

    /// A task exceeded its timeout.
    #[error("Task timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Scheduler is already running or already stopped.
    #[error("Invalid scheduler state: {0}")]
    InvalidState(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Result type for monitor operations.
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

/// Result type for scheduler operations.
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::Producer("boom".to_string());
        assert_eq!(format!("{}", err), "Producer error: boom");

        let err = SchedulerError::TaskNotFound("cache_cleanup".to_string());
        assert_eq!(format!("{}", err), "Task not found: cache_cleanup");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: CacheError = ConfigError("max_entries must be > 0".to_string()).into();
        assert!(matches!(err, CacheError::Config(_)));
    }
}

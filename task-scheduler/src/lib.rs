//! Background task scheduler for cache and monitoring maintenance.
//!
//! Tasks are registered with a priority, an optional recurrence interval,
//! a hard timeout, and a retry budget. Each scheduler tick selects due
//! tasks by priority, launches up to a concurrency limit, and drives the
//! retry/backoff state machine:
//!
//! ```text
//! PENDING → RUNNING → COMPLETED (re-armed when recurring)
//!                   → SCHEDULED (retry, exponential backoff) → RUNNING
//!                   → FAILED (terminal after max_retries)
//! CANCELLED on unregister or disable while running
//! ```
//!
//! # Example
//!
//! ```no_run
//! use task_scheduler::{ScheduledTask, TaskPriority, TaskScheduler, task_fn};
//! use common::SchedulerConfig;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let scheduler = TaskScheduler::new(SchedulerConfig::default())?;
//! scheduler.register_task(
//!     ScheduledTask::new("nightly_rollup", task_fn(|| async { Ok(()) }))
//!         .with_priority(TaskPriority::Low)
//!         .with_interval(Duration::from_secs(24 * 3600)),
//! );
//! scheduler.start_scheduler();
//! # Ok(())
//! # }
//! ```

pub mod maintenance;
pub mod scheduler;
pub mod task;

pub use maintenance::{register_maintenance_tasks, MaintenanceContext};
pub use scheduler::{SchedulerStats, TaskScheduler};
pub use task::{task_fn, ScheduledTask, TaskFn, TaskPriority, TaskSnapshot, TaskStatus};

//! Task definitions and per-task state.

use common::TaskId;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// The future a task function produces for one execution.
pub type TaskFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A task body: invoked once per execution, cheap to clone.
pub type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Wrap an async closure into a [`TaskFn`].
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Scheduled,
}

/// A registered task and all its scheduling state.
///
/// Built with [`ScheduledTask::new`] plus the `with_*` builders; the
/// scheduler owns it after [`register_task`](crate::TaskScheduler::register_task).
pub struct ScheduledTask {
    pub id: TaskId,
    pub name: String,
    pub(crate) func: TaskFn,
    pub priority: TaskPriority,
    /// `None` means one-shot.
    pub interval: Option<Duration>,
    /// Armed by `register_task` when unset; `None` after a terminal failure.
    pub(crate) next_run: Option<Instant>,
    pub(crate) last_run: Option<Instant>,
    pub status: TaskStatus,
    pub execution_count: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout: Duration,
    pub enabled: bool,
    pub error_message: Option<String>,
    pub(crate) avg_execution_secs: f64,
}

impl ScheduledTask {
    pub fn new(name: impl Into<String>, func: TaskFn) -> Self {
        Self {
            id: TaskId::new(),
            name: name.into(),
            func,
            priority: TaskPriority::Normal,
            interval: None,
            next_run: None,
            last_run: None,
            status: TaskStatus::Pending,
            execution_count: 0,
            retry_count: 0,
            max_retries: 3,
            timeout: Duration::from_secs(60),
            enabled: true,
            error_message: None,
            avg_execution_secs: 0.0,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Explicit first run time; otherwise `register_task` arms it.
    pub fn with_next_run(mut self, at: Instant) -> Self {
        self.next_run = Some(at);
        self
    }

    pub(crate) fn snapshot(&self) -> TaskSnapshot {
        let now = Instant::now();
        TaskSnapshot {
            id: self.id,
            name: self.name.clone(),
            priority: self.priority,
            status: self.status,
            enabled: self.enabled,
            execution_count: self.execution_count,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            interval_secs: self.interval.map(|d| d.as_secs_f64()),
            timeout_secs: self.timeout.as_secs_f64(),
            next_run_in_secs: self
                .next_run
                .map(|at| at.saturating_duration_since(now).as_secs_f64()),
            avg_execution_secs: self.avg_execution_secs,
            error_message: self.error_message.clone(),
        }
    }
}

/// Serializable view of one task's state.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub enabled: bool,
    pub execution_count: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub interval_secs: Option<f64>,
    pub timeout_secs: f64,
    pub next_run_in_secs: Option<f64>,
    pub avg_execution_secs: f64,
    pub error_message: Option<String>,
}

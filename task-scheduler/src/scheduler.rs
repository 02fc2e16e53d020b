//! The scheduler loop and task lifecycle management.

use crate::task::{ScheduledTask, TaskPriority, TaskSnapshot, TaskStatus};
use common::{SchedulerConfig, SchedulerError, SchedulerResult, TaskId};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Retry backoff: 30s, 60s, 120s, 240s, capped at 300s.
fn retry_backoff(retry_count: u32) -> Duration {
    let exp = retry_count.saturating_sub(1).min(10);
    Duration::from_secs((30u64 << exp).min(300))
}

/// How long `stop_scheduler` waits for the loop to drain before aborting.
const LOOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Aggregate counters exposed by [`TaskScheduler::get_scheduler_stats`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub registered_tasks: usize,
    pub running_tasks: usize,
    pub total_executions: u64,
    pub total_failures: u64,
    pub total_timeouts: u64,
    pub is_running: bool,
}

#[derive(Default)]
struct Counters {
    total_executions: u64,
    total_failures: u64,
    total_timeouts: u64,
}

struct LoopHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Priority-aware periodic task runner.
///
/// Tasks are picked up on a fixed tick: every due, enabled, non-running task
/// is sorted by priority (highest first) and launched until the concurrency
/// cap is reached. Failures retry with exponential backoff until
/// `max_retries` is exhausted.
pub struct TaskScheduler {
    config: SchedulerConfig,
    tasks: Arc<DashMap<TaskId, ScheduledTask>>,
    running: Arc<DashMap<TaskId, JoinHandle<()>>>,
    counters: Arc<Mutex<Counters>>,
    scheduler_loop: Mutex<Option<LoopHandle>>,
}

impl TaskScheduler {
    pub fn new(config: SchedulerConfig) -> SchedulerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tasks: Arc::new(DashMap::new()),
            running: Arc::new(DashMap::new()),
            counters: Arc::new(Mutex::new(Counters::default())),
            scheduler_loop: Mutex::new(None),
        })
    }

    /// Register a task. Recurring tasks are armed one interval out; one-shot
    /// tasks become due immediately unless `with_next_run` set a time.
    pub fn register_task(&self, mut task: ScheduledTask) -> TaskId {
        if task.next_run.is_none() {
            task.next_run = Some(match task.interval {
                Some(interval) => Instant::now() + interval,
                None => Instant::now(),
            });
        }
        let id = task.id;
        debug!(
            task = %task.name,
            priority = ?task.priority,
            interval_secs = task.interval.map(|d| d.as_secs()),
            "registered task"
        );
        self.tasks.insert(id, task);
        id
    }

    /// Remove a task entirely, aborting it if it is mid-execution.
    pub fn unregister_task(&self, id: TaskId) -> SchedulerResult<()> {
        if let Some((_, handle)) = self.running.remove(&id) {
            handle.abort();
        }
        self.tasks
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))
    }

    pub fn enable_task(&self, id: TaskId) -> SchedulerResult<()> {
        let mut task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;
        task.enabled = true;
        if task.status == TaskStatus::Cancelled {
            task.status = TaskStatus::Pending;
            task.next_run = Some(match task.interval {
                Some(interval) => Instant::now() + interval,
                None => Instant::now(),
            });
        }
        Ok(())
    }

    /// Disable a task. An in-flight execution is aborted and the task is
    /// marked `CANCELLED`.
    pub fn disable_task(&self, id: TaskId) -> SchedulerResult<()> {
        let mut task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;
        task.enabled = false;
        if let Some((_, handle)) = self.running.remove(&id) {
            handle.abort();
            task.status = TaskStatus::Cancelled;
        }
        Ok(())
    }

    /// Run a task immediately, bypassing the schedule and the concurrency
    /// cap. The execution still counts toward stats and retries.
    pub fn execute_task_now(&self, id: TaskId) -> SchedulerResult<()> {
        if self.running.contains_key(&id) {
            let name = self
                .tasks
                .get(&id)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| id.to_string());
            return Err(SchedulerError::AlreadyRunning(name));
        }
        if !self.tasks.contains_key(&id) {
            return Err(SchedulerError::TaskNotFound(id.to_string()));
        }
        launch_task(&self.tasks, &self.running, &self.counters, id);
        Ok(())
    }

    pub fn get_task_status(&self, id: TaskId) -> SchedulerResult<TaskSnapshot> {
        self.tasks
            .get(&id)
            .map(|t| t.snapshot())
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))
    }

    pub fn get_all_tasks_status(&self) -> Vec<TaskSnapshot> {
        let mut out: Vec<TaskSnapshot> = self.tasks.iter().map(|t| t.snapshot()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn get_scheduler_stats(&self) -> SchedulerStats {
        // Map sizes are read before taking the counters lock so this never
        // holds both the mutex and a dashmap shard at once.
        let registered_tasks = self.tasks.len();
        let running_tasks = self.running.len();
        let counters = self.counters.lock();
        SchedulerStats {
            registered_tasks,
            running_tasks,
            total_executions: counters.total_executions,
            total_failures: counters.total_failures,
            total_timeouts: counters.total_timeouts,
            is_running: self.scheduler_loop.lock().is_some(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler_loop.lock().is_some()
    }

    /// Start the scheduler loop. Idempotent.
    pub fn start_scheduler(&self) {
        let mut guard = self.scheduler_loop.lock();
        if guard.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let handle = tokio::spawn(scheduler_loop(
            self.config.clone(),
            Arc::clone(&self.tasks),
            Arc::clone(&self.running),
            Arc::clone(&self.counters),
            token.clone(),
        ));
        *guard = Some(LoopHandle { token, handle });
        info!(
            check_interval_secs = self.config.check_interval.as_secs_f64(),
            max_concurrent = self.config.max_concurrent_tasks,
            "task scheduler started"
        );
    }

    /// Stop the loop and abort in-flight tasks, marking them `CANCELLED`.
    pub async fn stop_scheduler(&self) {
        let Some(LoopHandle { token, handle }) = self.scheduler_loop.lock().take() else {
            return;
        };
        token.cancel();
        if tokio::time::timeout(LOOP_JOIN_TIMEOUT, handle).await.is_err() {
            warn!("scheduler loop did not stop in time, aborting");
        }
        let in_flight: Vec<TaskId> = self.running.iter().map(|e| *e.key()).collect();
        for id in in_flight {
            if let Some((_, handle)) = self.running.remove(&id) {
                handle.abort();
            }
            if let Some(mut task) = self.tasks.get_mut(&id) {
                task.status = TaskStatus::Cancelled;
            }
        }
        info!("task scheduler stopped");
    }
}

async fn scheduler_loop(
    config: SchedulerConfig,
    tasks: Arc<DashMap<TaskId, ScheduledTask>>,
    running: Arc<DashMap<TaskId, JoinHandle<()>>>,
    counters: Arc<Mutex<Counters>>,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.check_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("scheduler loop cancelled");
                return;
            }
            _ = ticker.tick() => {
                tick(&config, &tasks, &running, &counters);
            }
        }
    }
}

fn tick(
    config: &SchedulerConfig,
    tasks: &Arc<DashMap<TaskId, ScheduledTask>>,
    running: &Arc<DashMap<TaskId, JoinHandle<()>>>,
    counters: &Arc<Mutex<Counters>>,
) {
    running.retain(|_, handle| !handle.is_finished());

    let now = Instant::now();
    let mut due: Vec<(TaskId, TaskPriority)> = tasks
        .iter()
        .filter(|t| {
            t.enabled
                && t.status != TaskStatus::Running
                && !running.contains_key(&t.id)
                && t.next_run.is_some_and(|at| at <= now)
        })
        .map(|t| (t.id, t.priority))
        .collect();
    due.sort_by(|a, b| b.1.cmp(&a.1));

    let slots = config.max_concurrent_tasks.saturating_sub(running.len());
    for (id, _) in due.into_iter().take(slots) {
        launch_task(tasks, running, counters, id);
    }
}

fn launch_task(
    tasks: &Arc<DashMap<TaskId, ScheduledTask>>,
    running: &Arc<DashMap<TaskId, JoinHandle<()>>>,
    counters: &Arc<Mutex<Counters>>,
    id: TaskId,
) {
    let (func, name, timeout) = {
        let Some(mut task) = tasks.get_mut(&id) else {
            return;
        };
        task.status = TaskStatus::Running;
        task.execution_count += 1;
        task.last_run = Some(Instant::now());
        (Arc::clone(&task.func), task.name.clone(), task.timeout)
    };
    counters.lock().total_executions += 1;
    debug!(task = %name, "launching task");

    let tasks = Arc::clone(tasks);
    let counters = Arc::clone(counters);
    let handle = tokio::spawn(async move {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, func()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(SchedulerError::Execution(err.to_string())),
            Err(_) => Err(SchedulerError::Timeout(timeout)),
        };
        complete_task(&tasks, &counters, id, &name, started.elapsed(), outcome);
    });
    running.insert(id, handle);
}

fn complete_task(
    tasks: &DashMap<TaskId, ScheduledTask>,
    counters: &Mutex<Counters>,
    id: TaskId,
    name: &str,
    elapsed: Duration,
    outcome: SchedulerResult<()>,
) {
    let Some(mut task) = tasks.get_mut(&id) else {
        return;
    };
    let n = task.execution_count.max(1) as f64;
    task.avg_execution_secs =
        task.avg_execution_secs * (n - 1.0) / n + elapsed.as_secs_f64() / n;

    match outcome {
        Ok(()) => {
            task.retry_count = 0;
            task.error_message = None;
            match task.interval {
                Some(interval) => {
                    task.status = TaskStatus::Scheduled;
                    task.next_run = Some(Instant::now() + interval);
                }
                None => {
                    task.status = TaskStatus::Completed;
                    task.next_run = None;
                }
            }
            debug!(task = %name, elapsed_secs = elapsed.as_secs_f64(), "task completed");
        }
        Err(err) => {
            {
                let mut counters = counters.lock();
                counters.total_failures += 1;
                if matches!(err, SchedulerError::Timeout(_)) {
                    counters.total_timeouts += 1;
                }
            }
            task.retry_count += 1;
            task.error_message = Some(err.to_string());
            if task.retry_count <= task.max_retries {
                let backoff = retry_backoff(task.retry_count);
                task.status = TaskStatus::Scheduled;
                task.next_run = Some(Instant::now() + backoff);
                warn!(
                    task = %name,
                    retry = task.retry_count,
                    backoff_secs = backoff.as_secs(),
                    error = %err,
                    "task failed, retrying"
                );
            } else {
                task.status = TaskStatus::Failed;
                task.next_run = None;
                error!(task = %name, error = %err, "task failed permanently");
            }
        }
    }
}

//! The stock maintenance schedule.
//!
//! [`register_maintenance_tasks`] wires the cache, warming manager and
//! performance monitor into seven recurring tasks covering cleanup, warming,
//! metric collection, optimization and health checks.

use crate::scheduler::TaskScheduler;
use crate::task::{task_fn, ScheduledTask, TaskPriority};
use common::{BatchMetricsSource, TaskId};
use perf_monitor::PerformanceMonitor;
use stats_cache::{CacheManager, StatsCache};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared services the maintenance tasks operate on.
#[derive(Clone)]
pub struct MaintenanceContext {
    pub cache: Arc<StatsCache>,
    pub manager: Arc<CacheManager>,
    pub monitor: Arc<PerformanceMonitor>,
    pub batch: Option<Arc<dyn BatchMetricsSource>>,
}

/// Register the default maintenance tasks and return their ids in
/// registration order.
pub fn register_maintenance_tasks(
    scheduler: &TaskScheduler,
    ctx: MaintenanceContext,
) -> Vec<TaskId> {
    let mut ids = Vec::with_capacity(7);

    let cache = Arc::clone(&ctx.cache);
    ids.push(scheduler.register_task(
        ScheduledTask::new(
            "cache_cleanup",
            task_fn(move || {
                let cache = Arc::clone(&cache);
                async move {
                    let removed = cache.cleanup_expired();
                    debug!(removed, "cache cleanup pass");
                    Ok(())
                }
            }),
        )
        .with_interval(Duration::from_secs(300))
        .with_timeout(Duration::from_secs(120)),
    ));

    let manager = Arc::clone(&ctx.manager);
    ids.push(scheduler.register_task(
        ScheduledTask::new(
            "cache_warming",
            task_fn(move || {
                let manager = Arc::clone(&manager);
                async move {
                    let queued = manager.warm_popular_data(10);
                    debug!(queued, "queued popular entries for warming");
                    Ok(())
                }
            }),
        )
        .with_interval(Duration::from_secs(900))
        .with_timeout(Duration::from_secs(300)),
    ));

    let monitor = Arc::clone(&ctx.monitor);
    ids.push(scheduler.register_task(
        ScheduledTask::new(
            "performance_monitoring",
            task_fn(move || {
                let monitor = Arc::clone(&monitor);
                async move {
                    monitor.collect_now().await;
                    Ok(())
                }
            }),
        )
        .with_priority(TaskPriority::High)
        .with_interval(Duration::from_secs(30))
        .with_timeout(Duration::from_secs(60)),
    ));

    let manager = Arc::clone(&ctx.manager);
    ids.push(scheduler.register_task(
        ScheduledTask::new(
            "cache_optimization",
            task_fn(move || {
                let manager = Arc::clone(&manager);
                async move {
                    let suggestions = manager.optimize_cache_performance();
                    if !suggestions.is_empty() {
                        info!(
                            count = suggestions.len(),
                            "cache optimization produced suggestions"
                        );
                    }
                    Ok(())
                }
            }),
        )
        .with_interval(Duration::from_secs(3600))
        .with_timeout(Duration::from_secs(300)),
    ));

    let monitor = Arc::clone(&ctx.monitor);
    ids.push(scheduler.register_task(
        ScheduledTask::new(
            "health_check",
            task_fn(move || {
                let monitor = Arc::clone(&monitor);
                async move {
                    let report = monitor.generate_health_report();
                    if report.scores.overall < 50.0 {
                        warn!(
                            overall = report.scores.overall,
                            active_alerts = report.active_alerts.len(),
                            "system health is degraded"
                        );
                    }
                    Ok(())
                }
            }),
        )
        .with_priority(TaskPriority::High)
        .with_interval(Duration::from_secs(120))
        .with_timeout(Duration::from_secs(60)),
    ));

    let manager = Arc::clone(&ctx.manager);
    ids.push(scheduler.register_task(
        ScheduledTask::new(
            "data_cleanup",
            task_fn(move || {
                let manager = Arc::clone(&manager);
                async move {
                    let removed = manager.cleanup_old_data(24);
                    let total: usize = removed.values().sum();
                    info!(total, "daily data cleanup finished");
                    Ok(())
                }
            }),
        )
        .with_interval(Duration::from_secs(86_400))
        .with_timeout(Duration::from_secs(600)),
    ));

    let batch = ctx.batch.clone();
    ids.push(scheduler.register_task(
        ScheduledTask::new(
            "batch_processing_optimization",
            task_fn(move || {
                let batch = batch.clone();
                async move {
                    let Some(source) = batch else {
                        return Ok(());
                    };
                    let metrics = source.get_performance_metrics().await?;
                    let error_rate = metrics.error_rate() * 100.0;
                    if error_rate > 10.0 {
                        warn!(
                            error_rate,
                            avg_secs = metrics.average_processing_time,
                            "batch pipeline error rate is high"
                        );
                    }
                    Ok(())
                }
            }),
        )
        .with_interval(Duration::from_secs(1800))
        .with_timeout(Duration::from_secs(180)),
    ));

    info!(count = ids.len(), "maintenance tasks registered");
    ids
}

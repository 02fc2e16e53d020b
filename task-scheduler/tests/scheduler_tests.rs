//! Scheduler lifecycle tests driven on tokio's paused clock so the 30s/60s
//! retry windows run instantly.

use common::{CacheConfig, MonitorConfig, SchedulerConfig, WarmingConfig};
use perf_monitor::PerformanceMonitor;
use parking_lot::Mutex;
use stats_cache::{CacheManager, StatsCache};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use task_scheduler::{
    register_maintenance_tasks, task_fn, MaintenanceContext, ScheduledTask, TaskPriority,
    TaskScheduler, TaskStatus,
};
use tokio::time::sleep;

fn scheduler() -> TaskScheduler {
    TaskScheduler::new(SchedulerConfig::default()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_retry_backoff_then_permanent_failure() {
    println!("\n🧪 Testing retry backoff and terminal failure...");

    let scheduler = scheduler();
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let id = scheduler.register_task(
        ScheduledTask::new(
            "always_fails",
            task_fn(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("simulated failure")
                }
            }),
        )
        .with_max_retries(2),
    );
    scheduler.start_scheduler();

    // First attempt, then retries at +30s and +60s.
    sleep(Duration::from_secs(2)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    sleep(Duration::from_secs(31)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    sleep(Duration::from_secs(61)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    // Retry budget exhausted, no further attempts even far in the future.
    sleep(Duration::from_secs(600)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    let snapshot = scheduler.get_task_status(id).unwrap();
    assert_eq!(snapshot.status, TaskStatus::Failed);
    assert_eq!(snapshot.retry_count, 3);
    assert!(snapshot.next_run_in_secs.is_none());
    assert!(snapshot.error_message.unwrap().contains("simulated failure"));

    let stats = scheduler.get_scheduler_stats();
    assert_eq!(stats.total_executions, 3);
    assert_eq!(stats.total_failures, 3);

    scheduler.stop_scheduler().await;
    println!("✅ Three attempts, exponential backoff, then FAILED");
}

#[tokio::test(start_paused = true)]
async fn test_higher_priority_launches_first() {
    println!("\n🧪 Testing priority ordering under a concurrency cap...");

    let scheduler = TaskScheduler::new(SchedulerConfig {
        max_concurrent_tasks: 1,
        ..Default::default()
    })
    .unwrap();

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    for (name, priority) in [
        ("low", TaskPriority::Low),
        ("critical", TaskPriority::Critical),
        ("normal", TaskPriority::Normal),
    ] {
        let order = Arc::clone(&order);
        scheduler.register_task(
            ScheduledTask::new(
                name,
                task_fn(move || {
                    let order = Arc::clone(&order);
                    async move {
                        order.lock().push(name);
                        Ok(())
                    }
                }),
            )
            .with_priority(priority),
        );
    }
    scheduler.start_scheduler();

    // One launch per tick with a cap of 1.
    sleep(Duration::from_secs(5)).await;
    scheduler.stop_scheduler().await;

    assert_eq!(*order.lock(), vec!["critical", "normal", "low"]);
    println!("✅ Launch order followed priority");
}

#[tokio::test(start_paused = true)]
async fn test_recurring_task_rearms_after_success() {
    println!("\n🧪 Testing recurring task re-arming...");

    let scheduler = scheduler();
    let runs = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&runs);

    let id = scheduler.register_task(
        ScheduledTask::new(
            "heartbeat",
            task_fn(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .with_interval(Duration::from_secs(10)),
    );
    scheduler.start_scheduler();

    sleep(Duration::from_secs(35)).await;
    scheduler.stop_scheduler().await;

    // Armed one interval out, then every 10s: runs at ~10s, ~20s, ~30s.
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    let snapshot = scheduler.get_task_status(id).unwrap();
    assert_eq!(snapshot.status, TaskStatus::Scheduled);
    assert_eq!(snapshot.execution_count, 3);
    println!("✅ Recurring task ran on its interval and stayed SCHEDULED");
}

#[tokio::test(start_paused = true)]
async fn test_execute_now_and_already_running() {
    println!("\n🧪 Testing manual execution and the running guard...");

    let scheduler = scheduler();
    let release = Arc::new(tokio::sync::Notify::new());
    let gate = Arc::clone(&release);

    let id = scheduler.register_task(ScheduledTask::new(
        "slow_manual",
        task_fn(move || {
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                Ok(())
            }
        }),
    ));

    scheduler.execute_task_now(id).unwrap();
    assert!(matches!(
        scheduler.execute_task_now(id),
        Err(common::SchedulerError::AlreadyRunning(_))
    ));

    release.notify_one();
    sleep(Duration::from_millis(100)).await;

    let snapshot = scheduler.get_task_status(id).unwrap();
    assert_eq!(snapshot.status, TaskStatus::Completed);
    assert_eq!(snapshot.execution_count, 1);
    println!("✅ Second manual run rejected while the first was in flight");
}

#[tokio::test(start_paused = true)]
async fn test_disabled_task_never_runs() {
    println!("\n🧪 Testing disable / enable...");

    let scheduler = scheduler();
    let runs = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&runs);

    let id = scheduler.register_task(
        ScheduledTask::new(
            "toggled",
            task_fn(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .with_interval(Duration::from_secs(5)),
    );
    scheduler.disable_task(id).unwrap();
    scheduler.start_scheduler();

    sleep(Duration::from_secs(20)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    scheduler.enable_task(id).unwrap();
    sleep(Duration::from_secs(20)).await;
    scheduler.stop_scheduler().await;

    assert!(runs.load(Ordering::SeqCst) >= 2);
    println!("✅ Disabled task stayed idle, ran again after enable");
}

#[tokio::test(start_paused = true)]
async fn test_task_timeout_counts_and_retries() {
    println!("\n🧪 Testing per-run timeout...");

    let scheduler = scheduler();
    let id = scheduler.register_task(
        ScheduledTask::new(
            "sleepy",
            task_fn(|| async {
                sleep(Duration::from_secs(3600)).await;
                Ok(())
            }),
        )
        .with_timeout(Duration::from_secs(5))
        .with_max_retries(0),
    );
    scheduler.start_scheduler();

    sleep(Duration::from_secs(10)).await;
    scheduler.stop_scheduler().await;

    let snapshot = scheduler.get_task_status(id).unwrap();
    assert_eq!(snapshot.status, TaskStatus::Failed);
    assert!(snapshot.error_message.unwrap().contains("timed out"));
    assert_eq!(scheduler.get_scheduler_stats().total_timeouts, 1);
    println!("✅ Long run was cut off and recorded as a timeout");
}

#[tokio::test]
async fn test_maintenance_schedule_registers_all_tasks() {
    println!("\n🧪 Testing the stock maintenance schedule...");

    let cache = Arc::new(StatsCache::new(CacheConfig::default()).unwrap());
    let manager = Arc::new(
        CacheManager::new(Arc::clone(&cache), WarmingConfig::default()).unwrap(),
    );
    let monitor = Arc::new(
        PerformanceMonitor::new(
            Arc::clone(&cache),
            Arc::clone(&manager),
            MonitorConfig::default(),
        )
        .unwrap(),
    );

    let scheduler = scheduler();
    let ids = register_maintenance_tasks(
        &scheduler,
        MaintenanceContext {
            cache,
            manager,
            monitor,
            batch: None,
        },
    );
    assert_eq!(ids.len(), 7);

    let snapshots = scheduler.get_all_tasks_status();
    let names: Vec<&str> = snapshots.iter().map(|s| s.name.as_str()).collect();
    for expected in [
        "batch_processing_optimization",
        "cache_cleanup",
        "cache_optimization",
        "cache_warming",
        "data_cleanup",
        "health_check",
        "performance_monitoring",
    ] {
        assert!(names.contains(&expected), "missing task {expected}");
    }

    let monitoring = snapshots
        .iter()
        .find(|s| s.name == "performance_monitoring")
        .unwrap();
    assert_eq!(monitoring.priority, TaskPriority::High);
    assert_eq!(monitoring.interval_secs, Some(30.0));
    assert_eq!(monitoring.max_retries, 3);

    // Every maintenance task can be driven manually as well.
    for id in &ids {
        scheduler.execute_task_now(*id).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = scheduler.get_scheduler_stats();
    assert_eq!(stats.total_executions, 7);
    assert_eq!(stats.total_failures, 0);
    println!("✅ All seven maintenance tasks registered and executable");
}

//! Integration tests for the monitor against a live cache and a fake batch
//! collaborator.

use async_trait::async_trait;
use common::{
    producer_fn, BatchMetrics, BatchMetricsSource, CacheCategory, CacheConfig, MonitorConfig,
    WarmingConfig,
};
use perf_monitor::{AlertSeverity, MetricType, PerformanceMonitor};
use serde_json::json;
use stats_cache::{CacheManager, StatsCache};
use std::sync::Arc;

struct FlakyBatchSource {
    fail: bool,
}

#[async_trait]
impl BatchMetricsSource for FlakyBatchSource {
    async fn get_performance_metrics(&self) -> anyhow::Result<BatchMetrics> {
        if self.fail {
            anyhow::bail!("batch runner unreachable");
        }
        Ok(BatchMetrics {
            total_jobs: 100,
            successful_jobs: 80,
            failed_jobs: 20,
            average_processing_time: 0.4,
        })
    }
}

fn stack() -> (Arc<StatsCache>, Arc<CacheManager>) {
    let cache = Arc::new(StatsCache::new(CacheConfig::default()).unwrap());
    let manager =
        Arc::new(CacheManager::new(Arc::clone(&cache), WarmingConfig::default()).unwrap());
    (cache, manager)
}

#[tokio::test]
async fn test_batch_error_rate_raises_alert() {
    println!("\n🧪 Testing batch error rate alerting...");

    let (cache, manager) = stack();
    let monitor = Arc::new(
        PerformanceMonitor::new(cache, manager, MonitorConfig::default())
            .unwrap()
            .with_batch_source(Arc::new(FlakyBatchSource { fail: false })),
    );

    monitor.collect_now().await;

    // 20% error rate is above the 10% HIGH threshold.
    let report = monitor.generate_health_report();
    let alert = report
        .active_alerts
        .iter()
        .find(|a| a.metric == MetricType::BatchErrorRate)
        .expect("error-rate alert raised");
    assert_eq!(alert.severity, AlertSeverity::High);

    println!("✅ Alert raised at the expected severity");
}

#[tokio::test]
async fn test_failing_batch_source_does_not_abort_collection() {
    println!("\n🧪 Testing collection resilience...");

    let (cache, manager) = stack();
    let monitor = Arc::new(
        PerformanceMonitor::new(cache, manager, MonitorConfig::default())
            .unwrap()
            .with_batch_source(Arc::new(FlakyBatchSource { fail: true })),
    );

    monitor.collect_now().await;

    let stats = monitor.get_performance_stats();
    assert_eq!(stats.collections, 1);
    assert!(stats.collection_errors >= 1);
    // Cache metrics still landed despite the batch failure.
    assert!(monitor
        .get_current_metrics()
        .contains_key(&MetricType::CacheHitRate));

    println!("✅ Loop survived a failing source");
}

#[tokio::test]
async fn test_metric_history_reflects_cache_traffic() {
    println!("\n🧪 Testing metric history over real traffic...");

    let (cache, manager) = stack();
    let category = CacheCategory::new("opening-stats");
    let producer = producer_fn(|| async { Ok(json!({"e4": 0.54})) });
    for _ in 0..4 {
        manager
            .get_with_warming(&category, &["opening", "e4"], Arc::clone(&producer), None, &[])
            .await;
    }

    let monitor = Arc::new(
        PerformanceMonitor::new(Arc::clone(&cache), Arc::clone(&manager), MonitorConfig::default())
            .unwrap(),
    );
    monitor.collect_now().await;

    let history = monitor.get_metric_history(MetricType::CacheHitRate, 1);
    assert_eq!(history.len(), 1);
    // 3 hits out of 4 requests.
    assert!((history[0].value - 75.0).abs() < 1e-9);

    manager.shutdown().await;
    println!("✅ History matches observed hit rate");
}

//! End-to-end tests for the cache layer against real clocks and real
//! producer functions.

use common::{producer_fn, CacheCategory, CacheConfig, WarmingConfig};
use serde_json::json;
use stats_cache::{CacheManager, CacheRequest, StatsCache};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn cache_with(max_entries: usize) -> Arc<StatsCache> {
    Arc::new(
        StatsCache::new(CacheConfig {
            max_entries,
            ..Default::default()
        })
        .unwrap(),
    )
}

#[tokio::test]
async fn test_ttl_expiry_end_to_end() {
    println!("\n🧪 Testing TTL expiry end to end...");

    let cache = cache_with(100);
    cache.set(&["p", "1"], json!({"a": 1}), Some(Duration::from_secs(1)), &[]);

    assert_eq!(cache.get(&["p", "1"]), Some(json!({"a": 1})));
    let misses_before = cache.get_stats().misses;

    sleep(Duration::from_millis(1200)).await;

    assert_eq!(cache.get(&["p", "1"]), None);
    assert_eq!(cache.get_stats().misses, misses_before + 1);

    println!("✅ Entry expired and counted exactly one miss");
}

#[tokio::test]
async fn test_batch_matches_individual_gets() {
    println!("\n🧪 Testing batch / individual equivalence...");

    let batch_cache = cache_with(100);
    let single_cache = cache_with(100);

    let make_producer = |i: u64| producer_fn(move || async move { Ok(json!({ "value": i })) });

    let requests: Vec<CacheRequest> = (0..8)
        .map(|i| {
            CacheRequest::new(["player".to_string(), i.to_string()])
                .with_producer(make_producer(i))
        })
        .collect();

    let batch_results = batch_cache.batch_get_or_compute(requests).await;

    let mut single_results = Vec::new();
    for i in 0..8u64 {
        let result = single_cache
            .get_or_compute(
                &["player".to_string(), i.to_string()],
                make_producer(i),
                None,
                &[],
            )
            .await;
        single_results.push(result);
    }

    assert_eq!(batch_results, single_results);
    assert_eq!(batch_cache.len(), single_cache.len());

    println!("✅ Batch gets equal individual gets");
}

#[tokio::test]
async fn test_stale_while_revalidate_returns_current_value() {
    println!("\n🧪 Testing stale-while-revalidate...");

    let cache = Arc::new(
        StatsCache::new(CacheConfig {
            default_ttl: Duration::from_millis(500),
            staleness_threshold: 0.5,
            ..Default::default()
        })
        .unwrap(),
    );

    let generation = Arc::new(AtomicU64::new(0));
    let generation_clone = Arc::clone(&generation);
    let producer = producer_fn(move || {
        let generation = Arc::clone(&generation_clone);
        async move {
            let n = generation.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "generation": n }))
        }
    });

    // Miss: computes generation 0.
    let first = cache
        .get_or_compute(&["p", "1"], Arc::clone(&producer), None, &[])
        .await;
    assert_eq!(first, Some(json!({"generation": 0})));

    // Enter the stale window (past 50% of the 500ms TTL, not yet expired).
    sleep(Duration::from_millis(300)).await;

    // Stale hit must return the OLD value immediately while refreshing.
    let stale = cache
        .get_or_compute(&["p", "1"], Arc::clone(&producer), None, &[])
        .await;
    assert_eq!(stale, Some(json!({"generation": 0})));

    // Give the background refresh time to land.
    sleep(Duration::from_millis(100)).await;
    let refreshed = cache
        .get_or_compute(&["p", "1"], producer, None, &[])
        .await;
    assert_eq!(refreshed, Some(json!({"generation": 1})));

    println!("✅ Stale value served immediately, refresh landed in background");
}

#[tokio::test]
async fn test_manager_reports_after_mixed_traffic() {
    println!("\n🧪 Testing manager report over mixed traffic...");

    let cache = cache_with(100);
    let manager = CacheManager::new(Arc::clone(&cache), WarmingConfig::default()).unwrap();
    let category = CacheCategory::new("head-to-head");
    let producer = producer_fn(|| async { Ok(json!({"wins": 2, "losses": 1})) });

    for _ in 0..5 {
        manager
            .get_with_warming(&category, &["h2h", "a", "b"], Arc::clone(&producer), None, &[])
            .await;
    }

    let report = manager.get_performance_report();
    let profile = &report.profiles["head-to-head"];
    assert_eq!(profile.total_requests, 5);
    // 1 miss, 4 hits.
    assert!((profile.hit_rate - 0.8).abs() < 1e-9);
    assert_eq!(report.cache_stats.hits, 4);
    assert_eq!(report.cache_stats.misses, 1);

    manager.shutdown().await;
    println!("✅ Report matches observed traffic");
}

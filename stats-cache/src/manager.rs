//! Cache manager: access-pattern tracking, background warming, performance
//! profiles, and optimization suggestions on top of [`StatsCache`].

use crate::cache::{CacheRequest, CacheStats, StatsCache};
use crate::key::cache_key;
use crate::profile::PerformanceProfile;
use crate::warming::{WarmingQueue, WarmingStrategy, WarmingTask};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::{CacheCategory, CacheResult, Producer, WarmingConfig};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long `shutdown` waits for the warming worker to drain.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// One rule-based tuning suggestion for a cache category.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationSuggestion {
    pub category: String,
    pub suggestion: String,
    /// Higher means act on it first.
    pub priority: u8,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of one tracked access pattern.
#[derive(Debug, Clone, Serialize)]
pub struct AccessPatternSnapshot {
    pub key: String,
    pub access_count: u64,
    pub last_access: DateTime<Utc>,
}

/// Full performance report for the excluded HTTP layer to serve.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub strategy: WarmingStrategy,
    pub cache_stats: CacheStats,
    pub profiles: HashMap<String, PerformanceProfile>,
    pub warming_queue_len: usize,
    pub warming_in_flight: usize,
    pub suggestions_recorded: usize,
}

/// What we remember about one (category, key) pair, producer included so
/// predictive warming and `warm_popular_data` can recompute it.
struct AccessPattern {
    count: u64,
    last_access: DateTime<Utc>,
    key_parts: Vec<String>,
    producer: Arc<dyn Producer>,
    ttl: Option<Duration>,
    deps: Vec<String>,
}

struct ManagerState {
    strategy: Mutex<WarmingStrategy>,
    queue: Mutex<WarmingQueue>,
    in_flight: Mutex<HashSet<String>>,
    patterns: Mutex<HashMap<CacheCategory, HashMap<String, AccessPattern>>>,
    profiles: Mutex<HashMap<CacheCategory, PerformanceProfile>>,
    suggestions: Mutex<Vec<OptimizationSuggestion>>,
    warm_attempts: Mutex<HashMap<CacheCategory, u64>>,
}

struct WorkerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Wraps a [`StatsCache`] with intelligent warming and per-category
/// performance accounting.
pub struct CacheManager {
    cache: Arc<StatsCache>,
    warming_cfg: WarmingConfig,
    state: Arc<ManagerState>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl CacheManager {
    /// Build a manager over `cache` and start the warming worker (the default
    /// strategy is [`WarmingStrategy::Moderate`]). Must be called from within
    /// a tokio runtime.
    pub fn new(cache: Arc<StatsCache>, warming_cfg: WarmingConfig) -> CacheResult<Self> {
        warming_cfg.validate()?;
        let state = Arc::new(ManagerState {
            strategy: Mutex::new(WarmingStrategy::Moderate),
            queue: Mutex::new(WarmingQueue::new(warming_cfg.max_queue_len)),
            in_flight: Mutex::new(HashSet::new()),
            patterns: Mutex::new(HashMap::new()),
            profiles: Mutex::new(HashMap::new()),
            suggestions: Mutex::new(Vec::new()),
            warm_attempts: Mutex::new(HashMap::new()),
        });
        let manager = Self {
            cache,
            warming_cfg,
            state,
            worker: Mutex::new(None),
        };
        manager.ensure_worker();
        Ok(manager)
    }

    pub fn cache(&self) -> &Arc<StatsCache> {
        &self.cache
    }

    /// Cache lookup that also feeds the access-pattern table, the category
    /// profile, and (strategy permitting) the predictive warming queue.
    pub async fn get_with_warming<S: AsRef<str>>(
        &self,
        category: &CacheCategory,
        key_parts: &[S],
        producer: Arc<dyn Producer>,
        ttl: Option<Duration>,
        deps: &[String],
    ) -> Option<Value> {
        let started = Instant::now();
        let (value, hit) = self
            .cache
            .get_or_compute_traced(key_parts, Arc::clone(&producer), ttl, deps)
            .await;
        let elapsed = started.elapsed().as_secs_f64();

        let key_parts: Vec<String> = key_parts.iter().map(|p| p.as_ref().to_string()).collect();
        let access_count = self.record_access(category, key_parts.clone(), producer, ttl, deps);
        self.update_profile(category, hit, elapsed);
        self.maybe_enqueue_predictive(category, &key_parts, access_count, elapsed);

        value
    }

    /// Batch variant of [`get_with_warming`](Self::get_with_warming); lookups
    /// resolve through the cache's two-pass batch path.
    pub async fn batch_get_with_warming(
        &self,
        category: &CacheCategory,
        requests: Vec<CacheRequest>,
    ) -> Vec<Option<Value>> {
        let started = Instant::now();
        let (results, hits) = self
            .cache
            .batch_get_or_compute_traced(requests.clone())
            .await;
        let per_item = started.elapsed().as_secs_f64() / requests.len().max(1) as f64;

        for (req, hit) in requests.into_iter().zip(hits) {
            let access_count = match req.producer {
                Some(producer) => self.record_access(
                    category,
                    req.key_parts.clone(),
                    producer,
                    req.ttl,
                    &req.deps,
                ),
                None => 0,
            };
            self.update_profile(category, hit, per_item);
            self.maybe_enqueue_predictive(category, &req.key_parts, access_count, per_item);
        }

        results
    }

    /// Queue an explicit warming task. Returns false when the queue is full
    /// (the task is dropped with a warning).
    pub fn add_warming_task(&self, task: WarmingTask) -> bool {
        let accepted = self.state.queue.lock().push(task);
        if !accepted {
            warn!("warming queue full; dropping task");
        }
        accepted
    }

    /// Switch warming strategy. Conservative stops the worker (cooperative
    /// cancel + bounded join); any other strategy (re)starts it idempotently.
    pub async fn set_warming_strategy(&self, strategy: WarmingStrategy) {
        *self.state.strategy.lock() = strategy;
        info!(?strategy, "warming strategy changed");
        if strategy == WarmingStrategy::Conservative {
            self.stop_worker().await;
        } else {
            self.ensure_worker();
        }
    }

    pub fn warming_strategy(&self) -> WarmingStrategy {
        *self.state.strategy.lock()
    }

    /// Re-enqueue warming tasks for the `top_n` most frequently accessed
    /// keys across all categories. Returns the number enqueued.
    pub fn warm_popular_data(&self, top_n: usize) -> usize {
        let mut candidates: Vec<WarmingTask> = Vec::new();
        {
            let patterns = self.state.patterns.lock();
            let mut ranked: Vec<(&CacheCategory, &String, &AccessPattern)> = patterns
                .iter()
                .flat_map(|(cat, keys)| keys.iter().map(move |(k, p)| (cat, k, p)))
                .collect();
            ranked.sort_by(|a, b| b.2.count.cmp(&a.2.count));
            for (category, _, pattern) in ranked.into_iter().take(top_n) {
                candidates.push(WarmingTask {
                    category: category.clone(),
                    priority: Self::priority_for_frequency(pattern.count),
                    key_parts: pattern.key_parts.clone(),
                    producer: Arc::clone(&pattern.producer),
                    ttl: pattern.ttl,
                    deps: pattern.deps.clone(),
                    estimated_cost: 0.0,
                    access_frequency: pattern.count,
                    seq: 0,
                });
            }
        }
        let mut enqueued = 0;
        for task in candidates {
            if self.add_warming_task(task) {
                enqueued += 1;
            }
        }
        debug!(enqueued, "warm_popular_data");
        enqueued
    }

    /// Rule-based suggestions per category, sorted by priority descending:
    /// hit_rate < 0.5 ⇒ add warming (3); eviction_rate > 0.3 ⇒ increase ttl
    /// (2); average_response_time > 0.5s ⇒ optimize calculation (1).
    pub fn optimize_cache_performance(&self) -> Vec<OptimizationSuggestion> {
        let now = Utc::now();
        let mut suggestions = Vec::new();
        {
            let profiles = self.state.profiles.lock();
            for (category, profile) in profiles.iter() {
                if profile.hit_rate < 0.5 {
                    suggestions.push(OptimizationSuggestion {
                        category: category.to_string(),
                        suggestion: format!(
                            "hit rate {:.2} is low; add warming tasks for this category",
                            profile.hit_rate
                        ),
                        priority: 3,
                        created_at: now,
                    });
                }
                if profile.eviction_rate > 0.3 {
                    suggestions.push(OptimizationSuggestion {
                        category: category.to_string(),
                        suggestion: format!(
                            "eviction rate {:.2} is high; increase ttl or cache size",
                            profile.eviction_rate
                        ),
                        priority: 2,
                        created_at: now,
                    });
                }
                if profile.average_response_time > 0.5 {
                    suggestions.push(OptimizationSuggestion {
                        category: category.to_string(),
                        suggestion: format!(
                            "average response time {:.2}s is slow; optimize the calculation",
                            profile.average_response_time
                        ),
                        priority: 1,
                        created_at: now,
                    });
                }
            }
        }
        suggestions.sort_by(|a, b| b.priority.cmp(&a.priority));
        self.state
            .suggestions
            .lock()
            .extend(suggestions.iter().cloned());
        suggestions
    }

    /// Snapshot of profiles, counters, and warming state.
    pub fn get_performance_report(&self) -> PerformanceReport {
        let profiles = self
            .state
            .profiles
            .lock()
            .iter()
            .map(|(cat, p)| (cat.to_string(), p.clone()))
            .collect();
        PerformanceReport {
            generated_at: Utc::now(),
            strategy: self.warming_strategy(),
            cache_stats: self.cache.get_stats(),
            profiles,
            warming_queue_len: self.state.queue.lock().len(),
            warming_in_flight: self.state.in_flight.lock().len(),
            suggestions_recorded: self.state.suggestions.lock().len(),
        }
    }

    /// Access patterns for one category, most frequent first.
    pub fn get_access_patterns(&self, category: &CacheCategory) -> Vec<AccessPatternSnapshot> {
        let patterns = self.state.patterns.lock();
        let mut snaps: Vec<AccessPatternSnapshot> = patterns
            .get(category)
            .map(|keys| {
                keys.iter()
                    .map(|(key, p)| AccessPatternSnapshot {
                        key: key.clone(),
                        access_count: p.count,
                        last_access: p.last_access,
                    })
                    .collect()
            })
            .unwrap_or_default();
        snaps.sort_by(|a, b| b.access_count.cmp(&a.access_count));
        snaps
    }

    /// Purge access patterns and suggestion history older than the cutoff.
    /// Returns removal counts keyed by category (suggestions under
    /// `"optimization_suggestions"`).
    pub fn cleanup_old_data(&self, max_age_hours: u64) -> HashMap<String, usize> {
        let cutoff = Utc::now() - ChronoDuration::hours(max_age_hours as i64);
        let mut removed: HashMap<String, usize> = HashMap::new();

        {
            let mut patterns = self.state.patterns.lock();
            for (category, keys) in patterns.iter_mut() {
                let before = keys.len();
                keys.retain(|_, p| p.last_access >= cutoff);
                let count = before - keys.len();
                if count > 0 {
                    removed.insert(category.to_string(), count);
                }
            }
            patterns.retain(|_, keys| !keys.is_empty());
        }

        {
            let mut suggestions = self.state.suggestions.lock();
            let before = suggestions.len();
            suggestions.retain(|s| s.created_at >= cutoff);
            let count = before - suggestions.len();
            if count > 0 {
                removed.insert("optimization_suggestions".to_string(), count);
            }
        }

        info!(max_age_hours, ?removed, "cleanup_old_data");
        removed
    }

    /// Stop the warming worker. Idempotent.
    pub async fn shutdown(&self) {
        self.stop_worker().await;
    }

    // --- internals -------------------------------------------------------

    fn record_access(
        &self,
        category: &CacheCategory,
        key_parts: Vec<String>,
        producer: Arc<dyn Producer>,
        ttl: Option<Duration>,
        deps: &[String],
    ) -> u64 {
        let key = cache_key(&key_parts);
        let mut patterns = self.state.patterns.lock();
        let entry = patterns
            .entry(category.clone())
            .or_default()
            .entry(key)
            .or_insert_with(|| AccessPattern {
                count: 0,
                last_access: Utc::now(),
                key_parts,
                producer: Arc::clone(&producer),
                ttl,
                deps: deps.to_vec(),
            });
        entry.count += 1;
        entry.last_access = Utc::now();
        // Keep the freshest producer so warming recomputes with current deps.
        entry.producer = producer;
        entry.ttl = ttl;
        entry.deps = deps.to_vec();
        entry.count
    }

    fn update_profile(&self, category: &CacheCategory, hit: bool, elapsed_secs: f64) {
        let stats = self.cache.get_stats();
        let mut profiles = self.state.profiles.lock();
        let profile = profiles.entry(category.clone()).or_default();
        profile.record_request(hit, elapsed_secs);
        profile.cache_size = stats.entries;
        profile.eviction_rate = stats.evictions as f64 / stats.sets.max(1) as f64;
    }

    fn maybe_enqueue_predictive(
        &self,
        category: &CacheCategory,
        key_parts: &[String],
        access_count: u64,
        elapsed_secs: f64,
    ) {
        let Some(threshold) = self.warming_strategy().warm_after_accesses() else {
            return;
        };
        if access_count < threshold {
            return;
        }
        let pattern_task = {
            let patterns = self.state.patterns.lock();
            let key = cache_key(key_parts);
            patterns
                .get(category)
                .and_then(|keys| keys.get(&key))
                .map(|p| WarmingTask {
                    category: category.clone(),
                    priority: Self::priority_for_frequency(p.count),
                    key_parts: p.key_parts.clone(),
                    producer: Arc::clone(&p.producer),
                    ttl: p.ttl,
                    deps: p.deps.clone(),
                    estimated_cost: elapsed_secs,
                    access_frequency: p.count,
                    seq: 0,
                })
        };
        if let Some(task) = pattern_task {
            self.add_warming_task(task);
        }
    }

    fn priority_for_frequency(count: u64) -> u8 {
        (count / 5).clamp(1, 5) as u8
    }

    fn ensure_worker(&self) {
        let mut slot = self.worker.lock();
        let needs_start = match slot.as_ref() {
            Some(worker) => worker.handle.is_finished(),
            None => true,
        };
        if needs_start {
            let token = CancellationToken::new();
            let handle = tokio::spawn(warming_loop(
                Arc::clone(&self.cache),
                Arc::clone(&self.state),
                self.warming_cfg.clone(),
                token.clone(),
            ));
            *slot = Some(WorkerHandle { token, handle });
        }
    }

    async fn stop_worker(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.token.cancel();
            match tokio::time::timeout(WORKER_JOIN_TIMEOUT, worker.handle).await {
                Ok(_) => info!("warming worker joined"),
                Err(_) => warn!("warming worker did not stop in time"),
            }
        }
    }
}

/// Releases the in-flight marker even if the producer panics or the warm
/// is cancelled mid-flight.
struct InFlightGuard {
    state: Arc<ManagerState>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.state.in_flight.lock().remove(&self.key);
    }
}

async fn warming_loop(
    cache: Arc<StatsCache>,
    state: Arc<ManagerState>,
    cfg: WarmingConfig,
    token: CancellationToken,
) {
    info!(interval = ?cfg.worker_interval, "warming worker started");
    let mut tick = tokio::time::interval(cfg.worker_interval);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => {
                run_warming_batch(&cache, &state, cfg.max_warming_workers).await;
            }
        }
    }
    info!("warming worker stopped");
}

/// Pop up to `max_workers` tasks whose keys are not already in flight and
/// execute their producers concurrently.
async fn run_warming_batch(cache: &Arc<StatsCache>, state: &Arc<ManagerState>, max_workers: usize) {
    let mut selected: Vec<(String, WarmingTask)> = Vec::new();
    {
        let mut queue = state.queue.lock();
        let mut in_flight = state.in_flight.lock();
        let mut requeue = Vec::new();
        while selected.len() < max_workers {
            let Some(task) = queue.pop() else { break };
            let key = cache_key(&task.key_parts);
            if in_flight.contains(&key) {
                requeue.push(task);
                continue;
            }
            in_flight.insert(key.clone());
            selected.push((key, task));
        }
        for task in requeue {
            queue.push(task);
        }
    }

    let warms = selected.into_iter().map(|(key, task)| {
        let cache = Arc::clone(cache);
        let state = Arc::clone(state);
        async move {
            let _guard = InFlightGuard {
                state: Arc::clone(&state),
                key: key.clone(),
            };
            let attempts = {
                let mut attempts = state.warm_attempts.lock();
                let counter = attempts.entry(task.category.clone()).or_insert(0);
                *counter += 1;
                *counter
            };
            let succeeded = match task.producer.compute().await {
                Ok(value) => {
                    cache.set(&task.key_parts, value, task.ttl, &task.deps);
                    debug!(key = %key, "warmed");
                    true
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "warming producer failed");
                    false
                }
            };
            state
                .profiles
                .lock()
                .entry(task.category.clone())
                .or_default()
                .record_warming(attempts, succeeded);
        }
    });
    futures::future::join_all(warms).await;
}

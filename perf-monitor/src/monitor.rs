//! The performance monitor: collection loop, alerting, reports, export.

use crate::alerts::{Alert, AlertSeverity, AlertThresholds};
use crate::health::{HealthScores, HEALTH_WINDOW};
use crate::metrics::{MetricSample, MetricType};
use crate::trend::{self, Trend, TrendDirection};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::{BatchMetricsSource, MonitorConfig, MonitorError, MonitorResult};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use stats_cache::{CacheManager, StatsCache};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{get_current_pid, Pid, ProcessesToUpdate, System};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long `stop_monitoring` waits for the collection loop to join.
const LOOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters describing the collection loop itself.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStats {
    pub collections: u64,
    pub collection_errors: u64,
    pub last_collection: Option<DateTime<Utc>>,
    pub samples_per_metric: HashMap<String, usize>,
    pub active_alerts: usize,
    pub monitoring: bool,
}

/// Snapshot produced by [`PerformanceMonitor::generate_health_report`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub scores: HealthScores,
    pub active_alerts: Vec<Alert>,
    /// Trends with confidence at or above the configured threshold.
    pub trends: Vec<Trend>,
    /// Rule-based, capped at 10 entries.
    pub recommendations: Vec<String>,
}

#[derive(Default)]
struct LoopCounters {
    collections: u64,
    collection_errors: u64,
    last_collection: Option<DateTime<Utc>>,
}

struct MonitorState {
    series: Mutex<HashMap<MetricType, VecDeque<MetricSample>>>,
    alerts: Mutex<HashMap<Uuid, Alert>>,
    thresholds: Mutex<HashMap<MetricType, AlertThresholds>>,
    counters: Mutex<LoopCounters>,
    sys: Mutex<System>,
    pid: Option<Pid>,
}

struct WorkerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Polls metric sources on a timer and keeps bounded time-series with
/// trend detection, alerting, and health scoring on top.
pub struct PerformanceMonitor {
    config: MonitorConfig,
    cache: Arc<StatsCache>,
    manager: Arc<CacheManager>,
    batch: Option<Arc<dyn BatchMetricsSource>>,
    state: Arc<MonitorState>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl PerformanceMonitor {
    pub fn new(
        cache: Arc<StatsCache>,
        manager: Arc<CacheManager>,
        config: MonitorConfig,
    ) -> MonitorResult<Self> {
        config.validate()?;
        let thresholds = MetricType::ALL
            .iter()
            .map(|m| (*m, AlertThresholds::default_for(*m)))
            .collect();
        Ok(Self {
            config,
            cache,
            manager,
            batch: None,
            state: Arc::new(MonitorState {
                series: Mutex::new(HashMap::new()),
                alerts: Mutex::new(HashMap::new()),
                thresholds: Mutex::new(thresholds),
                counters: Mutex::new(LoopCounters::default()),
                sys: Mutex::new(System::new()),
                pid: get_current_pid().ok(),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Attach the external batch-processing collaborator.
    pub fn with_batch_source(mut self, source: Arc<dyn BatchMetricsSource>) -> Self {
        self.batch = Some(source);
        self
    }

    /// Override thresholds for one metric.
    pub fn set_thresholds(&self, metric: MetricType, thresholds: AlertThresholds) {
        self.state.thresholds.lock().insert(metric, thresholds);
    }

    /// Start the collection loop. Errors if already running.
    pub fn start_monitoring(self: &Arc<Self>) -> MonitorResult<()> {
        let mut slot = self.worker.lock();
        if slot.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return Err(MonitorError::InvalidState("already running".to_string()));
        }
        let token = CancellationToken::new();
        let monitor = Arc::clone(self);
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            info!(interval = ?monitor.config.collection_interval, "monitor loop started");
            let mut tick = tokio::time::interval(monitor.config.collection_interval);
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = tick.tick() => monitor.collect_now().await,
                }
            }
            info!("monitor loop stopped");
        });
        *slot = Some(WorkerHandle { token, handle });
        Ok(())
    }

    /// Stop the collection loop (cooperative cancel + bounded join).
    /// A no-op when not running.
    pub async fn stop_monitoring(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.token.cancel();
            if tokio::time::timeout(LOOP_JOIN_TIMEOUT, worker.handle)
                .await
                .is_err()
            {
                warn!("monitor loop did not stop in time");
            }
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Run one collection cycle immediately. Each source's failure is
    /// counted and skipped; the cycle always completes.
    pub async fn collect_now(&self) {
        // The only async source goes first so no lock is held across await.
        let batch_result = match &self.batch {
            Some(source) => Some(source.get_performance_metrics().await),
            None => None,
        };

        let mut samples: Vec<MetricSample> = Vec::new();
        let mut tagged: Vec<(MetricType, MetricSample)> = Vec::new();

        let stats = self.cache.get_stats();
        let categories = self.manager.get_performance_report().profiles.len();
        tagged.push((
            MetricType::CacheHitRate,
            MetricSample::new(stats.hit_rate * 100.0)
                .with_metadata("hits", stats.hits.to_string())
                .with_metadata("misses", stats.misses.to_string())
                .with_metadata("categories", categories.to_string()),
        ));
        tagged.push((MetricType::CacheSize, MetricSample::new(stats.entries as f64)));
        tagged.push((
            MetricType::CacheEvictionRate,
            MetricSample::new(stats.evictions as f64 / stats.sets.max(1) as f64 * 100.0),
        ));

        match self.collect_resources() {
            Ok((memory_mb, cpu_percent)) => {
                tagged.push((MetricType::MemoryUsage, MetricSample::new(memory_mb)));
                tagged.push((MetricType::CpuUsage, MetricSample::new(cpu_percent)));
            }
            Err(e) => {
                self.state.counters.lock().collection_errors += 1;
                warn!(error = %e, "resource collection failed");
            }
        }

        match batch_result {
            Some(Ok(metrics)) => {
                tagged.push((
                    MetricType::BatchProcessingTime,
                    MetricSample::new(metrics.average_processing_time)
                        .with_metadata("total_jobs", metrics.total_jobs.to_string()),
                ));
                tagged.push((
                    MetricType::BatchErrorRate,
                    MetricSample::new(metrics.error_rate() * 100.0),
                ));
            }
            Some(Err(e)) => {
                self.state.counters.lock().collection_errors += 1;
                warn!(error = %e, "batch metrics collection failed");
            }
            None => {}
        }

        samples.extend(tagged.iter().map(|(_, s)| s.clone()));
        let now = Utc::now();
        {
            let mut series = self.state.series.lock();
            let horizon = now
                - ChronoDuration::from_std(self.config.retention_window)
                    .unwrap_or_else(|_| ChronoDuration::hours(24));
            for (metric, sample) in &tagged {
                let ring = series.entry(*metric).or_default();
                ring.push_back(sample.clone());
                while ring.front().is_some_and(|s| s.timestamp < horizon) {
                    ring.pop_front();
                }
            }
        }

        for (metric, sample) in &tagged {
            self.evaluate_alert(*metric, sample.value);
        }

        let mut counters = self.state.counters.lock();
        counters.collections += 1;
        counters.last_collection = Some(now);
        debug!(samples = samples.len(), "collection cycle complete");
    }

    /// Latest sample per metric.
    pub fn get_current_metrics(&self) -> HashMap<MetricType, MetricSample> {
        let series = self.state.series.lock();
        series
            .iter()
            .filter_map(|(metric, ring)| ring.back().map(|s| (*metric, s.clone())))
            .collect()
    }

    /// Samples for one metric within the last `hours` hours, oldest first.
    pub fn get_metric_history(&self, metric: MetricType, hours: u64) -> Vec<MetricSample> {
        let cutoff = Utc::now() - ChronoDuration::hours(hours as i64);
        let series = self.state.series.lock();
        series
            .get(&metric)
            .map(|ring| {
                ring.iter()
                    .filter(|s| s.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Export all series from the last `hours` hours.
    ///
    /// Envelope: `{timestamp, export_parameters: {hours, format},
    /// metrics: {<metric>: [{timestamp, value, metadata}, ...]}}`.
    /// Formats: `json`, `pretty-json`.
    pub fn export_metrics(&self, hours: u64, format: &str) -> MonitorResult<String> {
        let mut metrics = serde_json::Map::new();
        for metric in MetricType::ALL {
            let history = self.get_metric_history(metric, hours);
            metrics.insert(metric.as_str().to_string(), serde_json::to_value(history)?);
        }
        let envelope = json!({
            "timestamp": Utc::now(),
            "export_parameters": { "hours": hours, "format": format },
            "metrics": metrics,
        });
        match format {
            "json" => Ok(envelope.to_string()),
            "pretty-json" => Ok(serde_json::to_string_pretty(&envelope)?),
            other => Err(MonitorError::InvalidFormat(other.to_string())),
        }
    }

    /// Snapshot of scores, active alerts, confident trends, and capped
    /// rule-based recommendations.
    pub fn generate_health_report(&self) -> HealthReport {
        let scores = self.health_scores();
        let active_alerts: Vec<Alert> = {
            let alerts = self.state.alerts.lock();
            alerts.values().cloned().collect()
        };
        let trends = self.confident_trends();
        let recommendations = self.recommendations(&scores, &active_alerts, &trends);
        HealthReport {
            generated_at: Utc::now(),
            scores,
            active_alerts,
            trends,
            recommendations,
        }
    }

    /// Mark an alert acknowledged with resolution notes. False if unknown.
    pub fn acknowledge_alert(&self, id: Uuid, notes: &str) -> bool {
        let mut alerts = self.state.alerts.lock();
        match alerts.get_mut(&id) {
            Some(alert) => {
                alert.acknowledged = true;
                alert.resolution_notes = Some(notes.to_string());
                true
            }
            None => false,
        }
    }

    /// Remove an alert entirely. False if unknown.
    pub fn clear_alert(&self, id: Uuid) -> bool {
        self.state.alerts.lock().remove(&id).is_some()
    }

    /// Counters describing the collection loop itself.
    pub fn get_performance_stats(&self) -> MonitorStats {
        let counters = self.state.counters.lock();
        let series = self.state.series.lock();
        MonitorStats {
            collections: counters.collections,
            collection_errors: counters.collection_errors,
            last_collection: counters.last_collection,
            samples_per_metric: series
                .iter()
                .map(|(m, ring)| (m.as_str().to_string(), ring.len()))
                .collect(),
            active_alerts: self.state.alerts.lock().len(),
            monitoring: self.is_monitoring(),
        }
    }

    // --- internals -------------------------------------------------------

    fn collect_resources(&self) -> anyhow::Result<(f64, f64)> {
        let pid = self
            .state
            .pid
            .ok_or_else(|| anyhow::anyhow!("current pid unavailable"))?;
        let mut sys = self.state.sys.lock();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = sys
            .process(pid)
            .ok_or_else(|| anyhow::anyhow!("process {pid} not visible"))?;
        let memory_mb = process.memory() as f64 / (1024.0 * 1024.0);
        let cpu_percent = process.cpu_usage() as f64;
        Ok((memory_mb, cpu_percent))
    }

    /// Raise at most one alert per (metric, severity); an unacknowledged
    /// alert for the same pair suppresses duplicates.
    fn evaluate_alert(&self, metric: MetricType, value: f64) {
        let thresholds = {
            let map = self.state.thresholds.lock();
            match map.get(&metric) {
                Some(t) => *t,
                None => return,
            }
        };
        let Some(severity) = thresholds.breached_severity(metric, value) else {
            return;
        };
        let mut alerts = self.state.alerts.lock();
        let already_active = alerts
            .values()
            .any(|a| a.metric == metric && a.severity == severity && !a.acknowledged);
        if already_active {
            return;
        }
        let alert = Alert::new(metric, severity, value, thresholds.threshold_for(severity));
        warn!(metric = %metric, ?severity, value, "alert raised");
        alerts.insert(alert.id, alert);
    }

    fn health_scores(&self) -> HealthScores {
        let recent = |metric: MetricType| -> Option<f64> {
            let series = self.state.series.lock();
            let ring = series.get(&metric)?;
            if ring.is_empty() {
                return None;
            }
            let tail: Vec<f64> = ring
                .iter()
                .rev()
                .take(HEALTH_WINDOW)
                .map(|s| s.value)
                .collect();
            Some(tail.iter().sum::<f64>() / tail.len() as f64)
        };
        HealthScores::compute(
            recent(MetricType::CacheHitRate),
            recent(MetricType::CpuUsage),
            recent(MetricType::BatchErrorRate),
        )
    }

    fn confident_trends(&self) -> Vec<Trend> {
        let series = self.state.series.lock();
        MetricType::ALL
            .iter()
            .filter_map(|metric| {
                let values: Vec<f64> = series
                    .get(metric)?
                    .iter()
                    .map(|s| s.value)
                    .collect();
                trend::detect(*metric, &values, self.config.trend_min_samples)
            })
            .filter(|t| t.confidence >= self.config.trend_confidence_threshold)
            .collect()
    }

    fn recommendations(
        &self,
        scores: &HealthScores,
        alerts: &[Alert],
        trends: &[Trend],
    ) -> Vec<String> {
        let mut recs = Vec::new();
        if scores.cache < 70.0 {
            recs.push(
                "Cache hit rate is hurting overall health; add warming tasks or raise TTLs"
                    .to_string(),
            );
        } else if scores.cache < 100.0 {
            recs.push("Cache hit rate has room to improve; review access patterns".to_string());
        }
        if scores.resource < 100.0 {
            recs.push(
                "CPU usage is elevated; profile calculators or reduce concurrent work".to_string(),
            );
        }
        if scores.error < 100.0 {
            recs.push(
                "Batch error rate is non-trivial; inspect failing batch jobs".to_string(),
            );
        }
        for alert in alerts {
            if alert.severity >= AlertSeverity::High && !alert.acknowledged {
                recs.push(format!("Investigate active alert: {}", alert.message));
            }
        }
        for trend in trends {
            let adverse = match trend.metric {
                MetricType::CacheHitRate => trend.direction == TrendDirection::Decreasing,
                _ => trend.direction == TrendDirection::Increasing,
            };
            if adverse {
                recs.push(format!(
                    "{} is trending {:?} ({:+.1}% over the window)",
                    trend.metric,
                    trend.direction,
                    trend.change_percentage
                ));
            }
        }
        recs.truncate(10);
        recs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CacheConfig, WarmingConfig};
    use stats_cache::StatsCache;

    fn monitor() -> Arc<PerformanceMonitor> {
        let cache = Arc::new(StatsCache::new(CacheConfig::default()).unwrap());
        let manager =
            Arc::new(CacheManager::new(Arc::clone(&cache), WarmingConfig::default()).unwrap());
        Arc::new(PerformanceMonitor::new(cache, manager, MonitorConfig::default()).unwrap())
    }

    fn push_samples(monitor: &PerformanceMonitor, metric: MetricType, values: &[f64]) {
        let mut series = monitor.state.series.lock();
        let ring = series.entry(metric).or_default();
        for v in values {
            ring.push_back(MetricSample::new(*v));
        }
    }

    #[tokio::test]
    async fn test_collect_now_populates_series() {
        let monitor = monitor();
        monitor.collect_now().await;

        let current = monitor.get_current_metrics();
        assert!(current.contains_key(&MetricType::CacheHitRate));
        assert!(current.contains_key(&MetricType::CacheSize));

        let stats = monitor.get_performance_stats();
        assert_eq!(stats.collections, 1);
    }

    #[tokio::test]
    async fn test_alert_dedup_per_metric_severity() {
        let monitor = monitor();
        monitor.evaluate_alert(MetricType::CpuUsage, 97.0);
        monitor.evaluate_alert(MetricType::CpuUsage, 98.0);

        let alerts = monitor.state.alerts.lock();
        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_acknowledge_and_clear_unknown_ids() {
        let monitor = monitor();
        assert!(!monitor.acknowledge_alert(Uuid::new_v4(), "nope"));
        assert!(!monitor.clear_alert(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_acknowledge_sets_notes() {
        let monitor = monitor();
        monitor.evaluate_alert(MetricType::BatchErrorRate, 30.0);
        let id = *monitor.state.alerts.lock().keys().next().unwrap();

        assert!(monitor.acknowledge_alert(id, "restarted the batch runner"));
        let alerts = monitor.state.alerts.lock();
        let alert = &alerts[&id];
        assert!(alert.acknowledged);
        assert_eq!(
            alert.resolution_notes.as_deref(),
            Some("restarted the batch runner")
        );
    }

    #[tokio::test]
    async fn test_health_report_surfaces_confident_trends() {
        let monitor = monitor();
        let values: Vec<f64> = (0..25).map(|i| 100.0 + 5.0 * i as f64).collect();
        push_samples(&monitor, MetricType::CpuUsage, &values);

        let report = monitor.generate_health_report();
        let cpu_trend = report
            .trends
            .iter()
            .find(|t| t.metric == MetricType::CpuUsage)
            .expect("cpu trend surfaced");
        assert_eq!(cpu_trend.direction, TrendDirection::Increasing);
        assert!(cpu_trend.change_percentage > 5.0);
    }

    #[tokio::test]
    async fn test_export_envelope_shape() {
        let monitor = monitor();
        monitor.collect_now().await;

        let exported = monitor.export_metrics(1, "json").unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&exported).unwrap();
        assert!(parsed["timestamp"].is_string());
        assert_eq!(parsed["export_parameters"]["hours"], 1);
        assert_eq!(parsed["export_parameters"]["format"], "json");
        assert!(parsed["metrics"]["cache_hit_rate"].is_array());

        assert!(matches!(
            monitor.export_metrics(1, "csv"),
            Err(MonitorError::InvalidFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_start_twice_is_an_error() {
        let monitor = monitor();
        monitor.start_monitoring().unwrap();
        assert!(monitor.start_monitoring().is_err());
        monitor.stop_monitoring().await;
        assert!(!monitor.is_monitoring());
    }
}

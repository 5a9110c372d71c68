//! Periodic sampler and alert evaluator.
//!
//! Two loops run once the feed is initialized: the metrics loop samples the
//! registry and the process and pushes a live-only `metrics_update`; the
//! alerts loop raises and resolves alerts from the latest samples and
//! delivers new ones to subscribers of the `alerts` topic.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use ovenwatch_core::config::MonitoringConfig;
use ovenwatch_core::result::AppResult;
use ovenwatch_core::traits::{FeedLoader, MetricsFeed};
use ovenwatch_realtime::message::types::now_millis;
use ovenwatch_realtime::{BroadcastOptions, ConnectionRegistry, OutboundMessage};

use crate::system;
use crate::thresholds::{AlertThresholds, Severity, metric};

const TREND_WINDOW: usize = 5;
const TREND_TOLERANCE: f64 = 0.05;
const ALERT_HISTORY_LIMIT: usize = 1000;
const ALERT_HISTORY_TRIMMED: usize = 500;
const ALERTS_TOPIC: &str = "alerts";

/// Feed timing and retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSettings {
    pub metrics_interval: Duration,
    pub alerts_interval: Duration,
    pub alert_throttle: Duration,
    pub max_data_points: usize,
}

impl From<&MonitoringConfig> for FeedSettings {
    fn from(config: &MonitoringConfig) -> Self {
        Self {
            metrics_interval: config.metrics_interval(),
            alerts_interval: config.alerts_interval(),
            alert_throttle: config.alert_throttle(),
            max_data_points: config.max_data_points.max(1),
        }
    }
}

/// Direction of a metric relative to its recent mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// One recorded value.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub value: f64,
    pub trend: Trend,
    pub severity: Severity,
    #[serde(skip)]
    recorded_at: Instant,
}

/// A raised alert.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    /// `<metric>_<severity>`; at most one active alert per id.
    pub id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub metric: String,
    pub severity: Severity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub resolved: bool,
    pub acknowledged: bool,
    #[serde(skip)]
    raised_at: Instant,
}

/// Latest value and recent mean for one metric.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSummary {
    pub current: f64,
    pub average: f64,
    pub trend: Trend,
    pub severity: Severity,
    pub samples: usize,
}

/// Point-in-time view of the feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub metrics: BTreeMap<String, MetricSummary>,
    pub active_alerts: usize,
    pub total_alerts: usize,
}

#[derive(Debug, Default)]
struct FeedState {
    samples: BTreeMap<String, VecDeque<MetricSample>>,
    active: BTreeMap<String, AlertEvent>,
    history: VecDeque<AlertEvent>,
    last_raised: HashMap<String, Instant>,
}

#[derive(Debug)]
struct FeedCore {
    registry: Arc<ConnectionRegistry>,
    thresholds: Arc<AlertThresholds>,
    settings: FeedSettings,
    state: Mutex<FeedState>,
}

impl FeedCore {
    fn lock(&self) -> std::sync::MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, name: &str, value: f64) -> MetricSample {
        let mut state = self.lock();
        let series = state.samples.entry(name.to_string()).or_default();
        let sample = MetricSample {
            timestamp: now_millis(),
            value,
            trend: trend(series, value),
            severity: self.thresholds.check(name, value),
            recorded_at: Instant::now(),
        };
        series.push_back(sample.clone());
        while series.len() > self.settings.max_data_points {
            series.pop_front();
        }
        sample
    }

    fn collect(&self) {
        let stats = self.registry.stats();
        self.record(metric::ACTIVE_CONNECTIONS, stats.active_connections as f64);
        self.record(metric::QUEUE_DEPTH, stats.queue_size as f64);
        self.record(metric::MEMORY_USAGE, system::memory_usage_mb());

        let snapshot = self.snapshot();
        match serde_json::to_value(&snapshot) {
            Ok(data) => {
                let message = OutboundMessage::with_data("metrics_update", data);
                let delivered = self.registry.broadcaster().broadcast(
                    &message,
                    None,
                    BroadcastOptions::skip_queue(),
                );
                debug!(delivered, "Metrics update pushed");
            }
            Err(e) => warn!(error = %e, "Failed to serialize metrics update"),
        }
    }

    fn check_alerts(&self) -> Vec<AlertEvent> {
        let now = Instant::now();
        let mut raised = Vec::new();
        {
            let mut state = self.lock();
            let latest: Vec<(String, MetricSample)> = state
                .samples
                .iter()
                .filter_map(|(name, series)| series.back().map(|s| (name.clone(), s.clone())))
                .collect();

            for (name, sample) in latest {
                if sample.severity == Severity::Normal {
                    resolve(&mut state, &name);
                    continue;
                }
                let id = format!("{name}_{}", sample.severity);
                if state.active.contains_key(&id) {
                    continue;
                }
                let throttled = state
                    .last_raised
                    .get(&id)
                    .is_some_and(|at| now.saturating_duration_since(*at) < self.settings.alert_throttle);
                if throttled {
                    continue;
                }

                let alert = self.build_alert(id.clone(), &name, &sample, now);
                state.last_raised.insert(id.clone(), now);
                state.active.insert(id, alert.clone());
                state.history.push_back(alert.clone());
                if state.history.len() > ALERT_HISTORY_LIMIT {
                    let excess = state.history.len() - ALERT_HISTORY_TRIMMED;
                    state.history.drain(..excess);
                }
                warn!(alert_id = %alert.id, severity = %alert.severity, "{}", alert.message);
                raised.push(alert);
            }
        }

        for alert in &raised {
            match serde_json::to_value(alert) {
                Ok(data) => {
                    let message = OutboundMessage::with_data("alert", data);
                    self.registry
                        .broadcaster()
                        .broadcast_to_subscribers(&message, ALERTS_TOPIC);
                }
                Err(e) => warn!(alert_id = %alert.id, error = %e, "Failed to serialize alert"),
            }
        }
        raised
    }

    fn build_alert(&self, id: String, name: &str, sample: &MetricSample, now: Instant) -> AlertEvent {
        let threshold = self.thresholds.get(name);
        let limit = threshold
            .and_then(|t| t.limit(sample.severity))
            .unwrap_or_default();
        let (unit, description) = threshold
            .map(|t| (t.unit.as_str(), t.description.as_str()))
            .unwrap_or(("", name));
        AlertEvent {
            id,
            timestamp: sample.timestamp,
            metric: name.to_string(),
            severity: sample.severity,
            message: format!(
                "{description} at {:.2} {unit} (limit {:.2} {unit})",
                sample.value, limit
            ),
            value: sample.value,
            threshold: limit,
            resolved: false,
            acknowledged: false,
            raised_at: now,
        }
    }

    fn acknowledge(&self, alert_id: &str) -> bool {
        let mut state = self.lock();
        let Some(alert) = state.active.get_mut(alert_id) else {
            return false;
        };
        alert.acknowledged = true;
        for entry in state.history.iter_mut().filter(|a| a.id == alert_id && !a.resolved) {
            entry.acknowledged = true;
        }
        true
    }

    fn prune(&self, retention: Duration) -> usize {
        let Some(cutoff) = Instant::now().checked_sub(retention) else {
            return 0;
        };
        let mut state = self.lock();
        let mut removed = 0;
        for series in state.samples.values_mut() {
            let before = series.len();
            series.retain(|s| s.recorded_at >= cutoff);
            removed += before - series.len();
        }
        state.samples.retain(|_, series| !series.is_empty());

        let before = state.history.len();
        state.history.retain(|a| !(a.resolved && a.raised_at < cutoff));
        removed += before - state.history.len();
        state.last_raised.retain(|_, at| *at >= cutoff);
        removed
    }

    fn snapshot(&self) -> FeedSnapshot {
        let state = self.lock();
        let metrics = state
            .samples
            .iter()
            .filter_map(|(name, series)| {
                let latest = series.back()?;
                let window = series.len().min(TREND_WINDOW);
                let average = series.iter().rev().take(window).map(|s| s.value).sum::<f64>()
                    / window as f64;
                Some((
                    name.clone(),
                    MetricSummary {
                        current: latest.value,
                        average,
                        trend: latest.trend,
                        severity: latest.severity,
                        samples: series.len(),
                    },
                ))
            })
            .collect();
        FeedSnapshot {
            metrics,
            active_alerts: state.active.len(),
            total_alerts: state.history.len(),
        }
    }
}

/// Trend of `value` against the mean of the last few samples.
fn trend(series: &VecDeque<MetricSample>, value: f64) -> Trend {
    if series.len() < 2 {
        return Trend::Stable;
    }
    let window = series.len().min(TREND_WINDOW);
    let average = series.iter().rev().take(window).map(|s| s.value).sum::<f64>() / window as f64;
    let tolerance = average * TREND_TOLERANCE;
    if value > average + tolerance {
        Trend::Up
    } else if value < average - tolerance {
        Trend::Down
    } else {
        Trend::Stable
    }
}

fn resolve(state: &mut FeedState, name: &str) {
    let prefix = format!("{name}_");
    let ids: Vec<String> = state
        .active
        .keys()
        .filter(|id| id.starts_with(&prefix))
        .cloned()
        .collect();
    for id in ids {
        if let Some(alert) = state.active.remove(&id) {
            info!(alert_id = %id, "Alert resolved: {}", alert.message);
        }
        for entry in state.history.iter_mut().filter(|a| a.id == id) {
            entry.resolved = true;
        }
    }
}

/// Default feed over the connection registry.
#[derive(Debug)]
pub struct RealtimeFeed {
    core: Arc<FeedCore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RealtimeFeed {
    /// Creates a stopped feed.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        thresholds: Arc<AlertThresholds>,
        settings: FeedSettings,
    ) -> Self {
        Self {
            core: Arc::new(FeedCore {
                registry,
                thresholds,
                settings,
                state: Mutex::new(FeedState::default()),
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Records one value for `metric`.
    pub fn record(&self, metric: &str, value: f64) -> MetricSample {
        self.core.record(metric, value)
    }

    /// Samples the registry and process once and pushes a metrics update.
    pub fn collect(&self) {
        self.core.collect();
    }

    /// Evaluates alerts once; returns the newly raised ones.
    pub fn check_alerts(&self) -> Vec<AlertEvent> {
        self.core.check_alerts()
    }

    /// Samples kept for `metric`, oldest first.
    pub fn samples(&self, metric: &str) -> Vec<MetricSample> {
        self.core
            .lock()
            .samples
            .get(metric)
            .map(|series| series.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Currently active alerts.
    pub fn active_alerts(&self) -> Vec<AlertEvent> {
        self.core.lock().active.values().cloned().collect()
    }

    /// Alert history, newest first.
    pub fn alert_history(&self) -> Vec<AlertEvent> {
        self.core.lock().history.iter().rev().cloned().collect()
    }

    /// Point-in-time view.
    pub fn snapshot(&self) -> FeedSnapshot {
        self.core.snapshot()
    }

    /// Whether the sampling loops are running.
    pub fn is_running(&self) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|t| !t.is_finished())
    }
}

#[async_trait]
impl MetricsFeed for RealtimeFeed {
    async fn initialize(&self) -> AppResult<()> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if !tasks.is_empty() {
            return Ok(());
        }
        let settings = self.core.settings;
        tasks.push(tokio::spawn(run_every(
            self.core.clone(),
            settings.metrics_interval,
            |core| core.collect(),
        )));
        tasks.push(tokio::spawn(run_every(
            self.core.clone(),
            settings.alerts_interval,
            |core| {
                core.check_alerts();
            },
        )));
        info!(
            metrics_interval_ms = settings.metrics_interval.as_millis() as u64,
            alerts_interval_ms = settings.alerts_interval.as_millis() as u64,
            environment = %self.core.thresholds.environment(),
            "Metrics feed started"
        );
        Ok(())
    }

    fn stop(&self) {
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        if tasks.is_empty() {
            return;
        }
        for task in tasks {
            task.abort();
        }
        info!("Metrics feed stopped");
    }

    fn prune(&self, retention: Duration) -> usize {
        self.core.prune(retention)
    }

    fn acknowledge(&self, alert_id: &str) -> bool {
        self.core.acknowledge(alert_id)
    }
}

impl Drop for RealtimeFeed {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().unwrap_or_else(|e| e.into_inner()).drain(..) {
            task.abort();
        }
    }
}

async fn run_every(core: Arc<FeedCore>, period: Duration, job: fn(&FeedCore)) {
    let period = period.max(Duration::from_millis(1));
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        job(&core);
    }
}

/// Builds a [`RealtimeFeed`] for the configured environment.
#[derive(Debug, Clone)]
pub struct RealtimeFeedLoader {
    registry: Arc<ConnectionRegistry>,
    thresholds: Arc<AlertThresholds>,
    settings: FeedSettings,
}

impl RealtimeFeedLoader {
    /// Creates a loader.
    pub fn new(registry: Arc<ConnectionRegistry>, config: &MonitoringConfig) -> Self {
        Self {
            registry,
            thresholds: Arc::new(AlertThresholds::for_environment(config.environment)),
            settings: FeedSettings::from(config),
        }
    }
}

#[async_trait]
impl FeedLoader for RealtimeFeedLoader {
    async fn load(&self) -> AppResult<Arc<dyn MetricsFeed>> {
        Ok(Arc::new(RealtimeFeed::new(
            self.registry.clone(),
            self.thresholds.clone(),
            self.settings,
        )))
    }
}

//! Staged boot of the monitoring core.
//!
//! `initialize` never fails and never blocks past the global ceiling. The
//! stage sequence runs as its own task; if the ceiling fires first the core
//! is forced into fallback and the sequence keeps running detached, so late
//! stages (cleanup, error traps) still come up. `shutdown` aborts whatever
//! is left.
//!
//! Stage failures that leave subscribers unreachable (the transport) put the
//! core in fallback. The feed and the search hook are best effort: a failure
//! there is logged and replaced by a no-op.

use std::sync::{Arc, Mutex, RwLock, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use ovenwatch_core::config::MonitoringConfig;
use ovenwatch_core::lifecycle::{InitializationState, Lifecycle, Phase, Stage};
use ovenwatch_core::result::AppResult;
use ovenwatch_core::traits::{FeedLoader, MetricsFeed, SearchHook, TransportConnector};
use ovenwatch_realtime::ConnectionRegistry;

use crate::cleanup::{Cleaner, CleanupSchedule};
use crate::feed::{FeedSlot, NoopFeed};
use crate::health::{HealthCheckResult, HealthReporter};
use crate::self_test;
use crate::thresholds::AlertThresholds;
use crate::traps;

/// External collaborators reached through the seam traits.
#[derive(Debug, Clone)]
pub struct Collaborators {
    /// Brings up the listener subscribers connect to.
    pub transport: Arc<dyn TransportConnector>,
    /// Resolves the metrics/alerts feed.
    pub feed_loader: Arc<dyn FeedLoader>,
    /// Search instrumentation.
    pub search_hook: Arc<dyn SearchHook>,
}

#[derive(Debug, Default)]
struct BackgroundTasks {
    stages: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    acknowledgements: Option<JoinHandle<()>>,
}

impl BackgroundTasks {
    fn abort_all(&mut self) {
        for task in [
            self.stages.take(),
            self.reconnect.take(),
            self.acknowledgements.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }
}

/// Boots, supervises, and shuts down the monitoring core.
#[derive(Debug)]
pub struct InitializationOrchestrator {
    config: MonitoringConfig,
    lifecycle: Lifecycle,
    registry: Arc<ConnectionRegistry>,
    collaborators: Collaborators,
    feed: FeedSlot,
    thresholds: RwLock<Arc<AlertThresholds>>,
    cleaner: Arc<Cleaner>,
    cleanup: CleanupSchedule,
    health: HealthReporter,
    tasks: Mutex<BackgroundTasks>,
}

impl InitializationOrchestrator {
    /// Creates an orchestrator over `registry`, sharing its lifecycle.
    pub fn new(
        config: MonitoringConfig,
        registry: Arc<ConnectionRegistry>,
        collaborators: Collaborators,
    ) -> Arc<Self> {
        Self::with_feed(config, registry, FeedSlot::new(), collaborators)
    }

    /// Like [`new`](Self::new), installing loaded feeds into `feed` so that
    /// readers built before the orchestrator observe them.
    pub fn with_feed(
        config: MonitoringConfig,
        registry: Arc<ConnectionRegistry>,
        feed: FeedSlot,
        collaborators: Collaborators,
    ) -> Arc<Self> {
        let cleaner = Arc::new(Cleaner::new(
            registry.clone(),
            feed.clone(),
            config.cleanup_retention(),
        ));
        let health = HealthReporter::new(registry.clone(), feed.clone(), config.enabled);
        Arc::new(Self {
            lifecycle: registry.lifecycle().clone(),
            thresholds: RwLock::new(Arc::new(AlertThresholds::for_environment(
                config.environment,
            ))),
            config,
            registry,
            collaborators,
            feed,
            cleaner,
            cleanup: CleanupSchedule::new(),
            health,
            tasks: Mutex::new(BackgroundTasks::default()),
        })
    }

    /// Runs the stage sequence under the global ceiling and returns the
    /// resulting state.
    ///
    /// Returns the current state unchanged when already initialized, when a
    /// boot is in flight, or when monitoring is disabled.
    pub async fn initialize(self: &Arc<Self>) -> InitializationState {
        if !self.config.enabled {
            warn!("Monitoring disabled by configuration");
            return self.state();
        }
        if !self.lifecycle.begin_initializing() {
            debug!(phase = %self.lifecycle.phase(), "Initialization already settled");
            return self.state();
        }

        let ceiling = self.config.global_timeout();
        info!(
            environment = %self.config.environment,
            realtime = self.config.realtime_enabled,
            performance_tests = self.config.performance_tests_enabled,
            global_timeout_ms = ceiling.as_millis() as u64,
            "Initializing monitoring"
        );

        let this = Arc::clone(self);
        let mut stages = tokio::spawn(async move { this.run_stages().await });

        match time::timeout(ceiling, &mut stages).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "Stage sequence aborted");
                self.lifecycle
                    .force_fallback(format!("stage sequence aborted: {e}"));
            }
            Err(_) => {
                let message = format!(
                    "initialization timed out after {}ms",
                    ceiling.as_millis()
                );
                if self.lifecycle.force_fallback(message.clone()) {
                    warn!("{message}; monitoring continues in fallback mode");
                }
                self.lock_tasks().stages = Some(stages);
            }
        }

        self.state()
    }

    async fn run_stages(self: Arc<Self>) {
        self.load_thresholds();
        if self.config.realtime_enabled {
            self.establish_transport().await;
            self.start_feed().await;
        }
        self.attach_search_hook().await;
        if self.config.performance_tests_enabled {
            self.run_self_test();
        }
        self.schedule_cleanup();
        self.install_error_traps();

        if self.lifecycle.complete() {
            self.log_summary();
        }
    }

    fn load_thresholds(&self) {
        let thresholds = Arc::new(AlertThresholds::for_environment(self.config.environment));
        debug!(
            stage = %Stage::AlertThresholds,
            environment = %thresholds.environment(),
            metrics = thresholds.len(),
            "Alert thresholds loaded"
        );
        *self.thresholds.write().unwrap_or_else(|e| e.into_inner()) = thresholds;
    }

    async fn establish_transport(self: &Arc<Self>) {
        self.registry.start_heartbeat();

        let endpoint = &self.config.endpoint;
        let window = self.config.transport_timeout();
        match time::timeout(window, self.collaborators.transport.establish(endpoint)).await {
            Ok(Ok(())) => {
                info!(stage = %Stage::Transport, endpoint = %endpoint, "Subscriber transport established");
            }
            Ok(Err(e)) => self.transport_failed(e.to_string()),
            Err(_) => self.transport_failed(format!(
                "transport did not come up within {}ms",
                window.as_millis()
            )),
        }
    }

    fn transport_failed(self: &Arc<Self>, reason: String) {
        warn!(stage = %Stage::Transport, error = %reason, "Subscriber transport unavailable");
        self.lifecycle.mark_degraded(Stage::Transport, reason);
        if self.config.max_reconnect_attempts == 0 {
            return;
        }
        let task = tokio::spawn(reconnect_loop(Arc::downgrade(self)));
        if let Some(previous) = self.lock_tasks().reconnect.replace(task) {
            previous.abort();
        }
    }

    async fn start_feed(self: &Arc<Self>) {
        let loaded = time::timeout(
            self.config.feed_load_timeout(),
            self.collaborators.feed_loader.load(),
        )
        .await;
        let feed: Arc<dyn MetricsFeed> = match loaded {
            Ok(Ok(feed)) => feed,
            Ok(Err(e)) => {
                warn!(stage = %Stage::Feed, error = %e, "Feed failed to load, continuing without it");
                Arc::new(NoopFeed)
            }
            Err(_) => {
                warn!(stage = %Stage::Feed, "Feed load timed out, continuing without it");
                Arc::new(NoopFeed)
            }
        };

        let initialized = time::timeout(self.config.feed_init_timeout(), feed.initialize()).await;
        let feed = match initialized {
            Ok(Ok(())) => feed,
            Ok(Err(e)) => {
                warn!(stage = %Stage::Feed, error = %e, "Feed failed to initialize, running with reduced functionality");
                feed.stop();
                Arc::new(NoopFeed)
            }
            Err(_) => {
                warn!(stage = %Stage::Feed, "Feed initialization timed out, running with reduced functionality");
                feed.stop();
                Arc::new(NoopFeed)
            }
        };

        self.feed.replace(feed).stop();
        self.forward_acknowledgements();
    }

    fn forward_acknowledgements(&self) {
        let mut acks = self.registry.acknowledgements();
        let feed = self.feed.clone();
        let task = tokio::spawn(async move {
            loop {
                match acks.recv().await {
                    Ok(ack) => {
                        let known = feed.current().acknowledge(&ack.alert_id);
                        debug!(alert_id = %ack.alert_id, conn_id = %ack.acknowledged_by, known, "Acknowledgement forwarded");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Dropped alert acknowledgements");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        if let Some(previous) = self.lock_tasks().acknowledgements.replace(task) {
            previous.abort();
        }
    }

    async fn attach_search_hook(&self) {
        match time::timeout(
            self.config.search_hook_timeout(),
            self.collaborators.search_hook.attach(),
        )
        .await
        {
            Ok(Ok(())) => debug!(stage = %Stage::SearchHook, "Search monitoring wired"),
            Ok(Err(e)) => {
                warn!(stage = %Stage::SearchHook, error = %e, "Continuing without search monitoring");
            }
            Err(_) => {
                warn!(stage = %Stage::SearchHook, "Search monitoring timed out, continuing without it");
            }
        }
    }

    fn run_self_test(&self) {
        if !self.lifecycle.snapshot().degraded.is_empty() {
            debug!(stage = %Stage::SelfTest, "Skipping self-test in fallback mode");
            return;
        }
        let thresholds = self.thresholds.read().unwrap_or_else(|e| e.into_inner()).clone();
        let report = self_test::run(&thresholds);
        if report.passed() {
            info!(
                stage = %Stage::SelfTest,
                success_rate = report.success_rate,
                elapsed_ms = report.elapsed_ms,
                "Self-test passed"
            );
        } else {
            warn!(
                stage = %Stage::SelfTest,
                success_rate = report.success_rate,
                threshold = self_test::WARN_BELOW,
                "Self-test success rate is low; review performance settings"
            );
        }
    }

    fn schedule_cleanup(&self) {
        self.cleanup
            .start(self.cleaner.clone(), self.config.cleanup_interval());
    }

    fn install_error_traps(&self) {
        if traps::install_panic_hook() {
            info!(stage = %Stage::ErrorTraps, "Panic trap installed");
        }
    }

    fn log_summary(&self) {
        let state = self.state();
        info!(
            environment = %self.config.environment,
            phase = %state.phase,
            fallback = state.fallback_mode(),
            degraded = ?state.degraded,
            realtime = self.config.realtime_enabled,
            heartbeat = self.registry.heartbeat_running(),
            feed = if self.feed.current().is_noop() { "noop" } else { "active" },
            cleanup = self.cleanup.is_running(),
            error_traps = traps::is_installed(),
            performance_tests = self.config.performance_tests_enabled,
            "Monitoring initialized"
        );
    }

    /// Explicit reset: clears errors and degraded stages, then boots again.
    ///
    /// Returns whether the core ended up `ready`.
    pub async fn reconnect(self: &Arc<Self>) -> bool {
        if self.lifecycle.begin_reconnect() {
            info!(endpoint = %self.config.endpoint, "Reconnecting monitoring");
            self.stop_background();
            self.feed.reset();
        }
        self.initialize().await.phase == Phase::Ready
    }

    /// Stops every timer, runs a final cleanup pass, closes all connections,
    /// and returns to `uninitialized`. Idempotent.
    pub async fn shutdown(&self) -> AppResult<()> {
        if self.lifecycle.phase() == Phase::Uninitialized {
            debug!("Monitoring already stopped");
            return Ok(());
        }
        info!("Stopping monitoring");

        self.stop_background();
        self.registry.stop_heartbeat();
        self.collaborators.transport.close().await;

        let report = self.cleaner.run_once();
        self.feed.reset();
        let closed = self.registry.close_all();
        self.lifecycle.reset();

        info!(closed, cleaned = report.total(), "Monitoring stopped");
        Ok(())
    }

    fn stop_background(&self) {
        self.lock_tasks().abort_all();
        self.cleanup.stop();
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, BackgroundTasks> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the initialization state.
    pub fn state(&self) -> InitializationState {
        self.lifecycle.snapshot()
    }

    /// Current health.
    pub fn health_check(&self) -> HealthCheckResult {
        self.health.check()
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The active feed.
    pub fn feed(&self) -> Arc<dyn MetricsFeed> {
        self.feed.current()
    }

    /// The shared lifecycle.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Configuration the orchestrator was built with.
    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }
}

impl Drop for InitializationOrchestrator {
    fn drop(&mut self) {
        self.tasks
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .abort_all();
    }
}

async fn reconnect_loop(orchestrator: Weak<InitializationOrchestrator>) {
    loop {
        let Some(interval) = orchestrator.upgrade().map(|o| o.config.reconnect_interval()) else {
            return;
        };
        time::sleep(interval).await;

        let Some(this) = orchestrator.upgrade() else {
            return;
        };
        let max = this.config.max_reconnect_attempts;
        let Some(attempt) = this.lifecycle.claim_reconnect_attempt(max) else {
            debug!("Transport reconnection loop finished");
            return;
        };

        info!(attempt, max, endpoint = %this.config.endpoint, "Reconnecting subscriber transport");
        let window = this.config.transport_timeout();
        match time::timeout(window, this.collaborators.transport.establish(&this.config.endpoint)).await {
            Ok(Ok(())) => {
                this.lifecycle.transport_recovered();
                info!(attempt, "Subscriber transport recovered");
                return;
            }
            Ok(Err(e)) => warn!(attempt, max, error = %e, "Reconnection attempt failed"),
            Err(_) => warn!(attempt, max, "Reconnection attempt timed out"),
        }
        if attempt >= max {
            warn!(max, "Giving up on the subscriber transport");
            return;
        }
    }
}

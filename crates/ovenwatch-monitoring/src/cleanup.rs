//! Recurring removal of stale monitoring data.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use ovenwatch_realtime::ConnectionRegistry;

use crate::feed::FeedSlot;

/// Items removed by one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Registry entries whose transport had already closed.
    pub closed_connections: usize,
    /// Metric samples and resolved alerts past retention.
    pub feed_items: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.closed_connections + self.feed_items
    }
}

/// One cleanup pass over the registry and the active feed.
#[derive(Debug)]
pub struct Cleaner {
    registry: Arc<ConnectionRegistry>,
    feed: FeedSlot,
    retention: Duration,
}

impl Cleaner {
    pub fn new(registry: Arc<ConnectionRegistry>, feed: FeedSlot, retention: Duration) -> Self {
        Self {
            registry,
            feed,
            retention,
        }
    }

    /// Runs one pass.
    pub fn run_once(&self) -> CleanupReport {
        tracing::info!(
            retention_hours = self.retention.as_secs() / 3600,
            "Running monitoring cleanup"
        );
        let report = CleanupReport {
            closed_connections: self.registry.prune_closed(),
            feed_items: self.feed.current().prune(self.retention),
        };
        tracing::info!("Cleanup finished: {} items removed", report.total());
        report
    }
}

/// Owns the recurring cleanup task.
#[derive(Debug, Default)]
pub struct CleanupSchedule {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CleanupSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `cleaner` every `period`, replacing any previous schedule.
    pub fn start(&self, cleaner: Arc<Cleaner>, period: Duration) {
        let period = period.max(Duration::from_secs(1));
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                cleaner.run_once();
            }
        });
        let previous = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        tracing::info!(
            "Automatic cleanup scheduled every {}h",
            period.as_secs_f64() / 3600.0
        );
    }

    /// Cancels the schedule. Idempotent.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }

    /// Whether a schedule is active.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

impl Drop for CleanupSchedule {
    fn drop(&mut self) {
        self.stop();
    }
}

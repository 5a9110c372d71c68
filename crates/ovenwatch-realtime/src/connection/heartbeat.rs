//! Idle-connection sweep.

use std::sync::{Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing;

use super::registry::ConnectionRegistry;

/// Owns the recurring sweep task.
///
/// The task holds only a weak reference to the registry, so dropping the
/// registry ends the loop even if `stop` is never called.
#[derive(Debug, Default)]
pub struct HeartbeatMonitor {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatMonitor {
    /// Creates a stopped monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the sweep every `period`.
    pub fn start(&self, registry: Weak<ConnectionRegistry>, period: Duration) {
        let mut slot = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(run_heartbeat(registry, period)));
        tracing::debug!(period_ms = period.as_millis() as u64, "Heartbeat started");
    }

    /// Stops the sweep. Idempotent.
    pub fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.abort();
            tracing::debug!("Heartbeat stopped");
        }
    }

    /// Whether a sweep task is running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_heartbeat(registry: Weak<ConnectionRegistry>, period: Duration) {
    let mut interval = time::interval_at(time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let Some(registry) = registry.upgrade() else {
            break;
        };
        let evicted = registry.sweep();
        if evicted > 0 {
            tracing::info!(evicted, "Heartbeat evicted idle connections");
        }
    }

    tracing::debug!("Heartbeat loop ended");
}

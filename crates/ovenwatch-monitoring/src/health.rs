//! Health synthesis for diagnostics and status badges.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use ovenwatch_core::lifecycle::{Lifecycle, Phase, Stage};
use ovenwatch_realtime::ConnectionRegistry;

use crate::feed::FeedSlot;
use crate::system;

/// Status of the whole core or one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Per-component status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub registry: HealthStatus,
    pub feed: HealthStatus,
    pub monitoring: HealthStatus,
}

/// Runtime figures reported with a health check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetrics {
    /// Seconds since the reporter was created.
    pub uptime: f64,
    #[serde(rename = "memoryUsageMB")]
    pub memory_usage_mb: f64,
    /// Connections seen within the idle window.
    pub active_connections: usize,
    pub queue_depth: usize,
    pub fallback_mode: bool,
}

/// Result of one health check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    /// RFC 3339.
    pub timestamp: String,
    pub components: ComponentHealth,
    pub metrics: HealthMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read-only view over the registry, the lifecycle, and the active feed.
#[derive(Debug, Clone)]
pub struct HealthReporter {
    registry: Arc<ConnectionRegistry>,
    lifecycle: Lifecycle,
    feed: FeedSlot,
    enabled: bool,
    started_at: Instant,
}

impl HealthReporter {
    pub fn new(registry: Arc<ConnectionRegistry>, feed: FeedSlot, enabled: bool) -> Self {
        Self {
            lifecycle: registry.lifecycle().clone(),
            registry,
            feed,
            enabled,
            started_at: Instant::now(),
        }
    }

    /// Synthesizes the current status without mutating anything.
    pub fn check(&self) -> HealthCheckResult {
        let state = self.lifecycle.snapshot();
        let stats = self.registry.stats();

        let monitoring = match state.phase {
            Phase::Ready => HealthStatus::Healthy,
            Phase::Fallback | Phase::Initializing | Phase::Reconnecting => HealthStatus::Degraded,
            Phase::Uninitialized => HealthStatus::Unhealthy,
        };
        let registry = if !state.is_initialized() {
            HealthStatus::Unhealthy
        } else if state.degraded.contains(&Stage::Transport) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        let feed = if self.feed.current().is_noop() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        let components = ComponentHealth {
            registry,
            feed,
            monitoring,
        };

        let status = components.registry.max(components.feed).max(components.monitoring);
        let error = if self.enabled {
            state.error.clone()
        } else {
            Some("monitoring is disabled".to_string())
        };

        HealthCheckResult {
            status,
            timestamp: Utc::now().to_rfc3339(),
            components,
            metrics: HealthMetrics {
                uptime: self.started_at.elapsed().as_secs_f64(),
                memory_usage_mb: system::memory_usage_mb(),
                active_connections: stats.active_connections,
                queue_depth: stats.queue_size,
                fallback_mode: state.fallback_mode(),
            },
            error,
        }
    }
}

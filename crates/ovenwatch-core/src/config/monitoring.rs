//! Boot orchestration configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deployment environment, selects the alert threshold profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Relaxed thresholds for local work.
    #[default]
    Development,
    /// Strict thresholds.
    Production,
    /// Baseline thresholds.
    Default,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Monitoring orchestrator configuration.
///
/// Every timeout is expressed in milliseconds so that environment overrides
/// stay plain integers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Threshold profile.
    #[serde(default)]
    pub environment: Environment,
    /// Master switch; when off, `initialize()` returns without booting.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the subscriber transport and live feed are started.
    #[serde(default = "default_true")]
    pub realtime_enabled: bool,
    /// Whether the boot self-test runs.
    #[serde(default)]
    pub performance_tests_enabled: bool,
    /// Transport endpoint (e.g. `ws://localhost:8080`).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Log level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics sampling period.
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_ms: u64,
    /// Alert evaluation period.
    #[serde(default = "default_alerts_interval")]
    pub alerts_interval_ms: u64,
    /// Minimum spacing between two raises of the same alert.
    #[serde(default = "default_alert_throttle")]
    pub alert_throttle_ms: u64,
    /// Samples retained per metric.
    #[serde(default = "default_max_data_points")]
    pub max_data_points: usize,
    /// Ceiling for the whole boot sequence.
    #[serde(default = "default_global_timeout")]
    pub global_timeout_ms: u64,
    /// Budget for establishing the transport.
    #[serde(default = "default_transport_timeout")]
    pub transport_timeout_ms: u64,
    /// Budget for resolving the feed implementation.
    #[serde(default = "default_feed_load_timeout")]
    pub feed_load_timeout_ms: u64,
    /// Budget for the feed's own initialization.
    #[serde(default = "default_feed_init_timeout")]
    pub feed_init_timeout_ms: u64,
    /// Budget for wiring the search-monitoring hook.
    #[serde(default = "default_search_hook_timeout")]
    pub search_hook_timeout_ms: u64,
    /// Period of the stale-data cleanup task.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    /// Age after which monitoring data counts as stale.
    #[serde(default = "default_cleanup_retention")]
    pub cleanup_retention_hours: u64,
    /// Upper bound on background transport reconnection attempts.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Spacing between reconnection attempts.
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            enabled: true,
            realtime_enabled: true,
            performance_tests_enabled: false,
            endpoint: default_endpoint(),
            log_level: default_log_level(),
            metrics_interval_ms: default_metrics_interval(),
            alerts_interval_ms: default_alerts_interval(),
            alert_throttle_ms: default_alert_throttle(),
            max_data_points: default_max_data_points(),
            global_timeout_ms: default_global_timeout(),
            transport_timeout_ms: default_transport_timeout(),
            feed_load_timeout_ms: default_feed_load_timeout(),
            feed_init_timeout_ms: default_feed_init_timeout(),
            search_hook_timeout_ms: default_search_hook_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
            cleanup_retention_hours: default_cleanup_retention(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_interval_ms: default_reconnect_interval(),
        }
    }
}

impl MonitoringConfig {
    /// Global boot ceiling.
    pub fn global_timeout(&self) -> Duration {
        Duration::from_millis(self.global_timeout_ms)
    }

    /// Transport stage budget.
    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }

    /// Feed resolution budget.
    pub fn feed_load_timeout(&self) -> Duration {
        Duration::from_millis(self.feed_load_timeout_ms)
    }

    /// Feed initialization budget.
    pub fn feed_init_timeout(&self) -> Duration {
        Duration::from_millis(self.feed_init_timeout_ms)
    }

    /// Search hook budget.
    pub fn search_hook_timeout(&self) -> Duration {
        Duration::from_millis(self.search_hook_timeout_ms)
    }

    /// Cleanup period.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Cleanup retention window.
    pub fn cleanup_retention(&self) -> Duration {
        Duration::from_secs(self.cleanup_retention_hours * 60 * 60)
    }

    /// Reconnection spacing.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Metrics sampling period.
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    /// Alert evaluation period.
    pub fn alerts_interval(&self) -> Duration {
        Duration::from_millis(self.alerts_interval_ms)
    }

    /// Alert throttle window.
    pub fn alert_throttle(&self) -> Duration {
        Duration::from_millis(self.alert_throttle_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "ws://localhost:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_interval() -> u64 {
    5000
}

fn default_alerts_interval() -> u64 {
    10000
}

fn default_alert_throttle() -> u64 {
    30000
}

fn default_max_data_points() -> usize {
    100
}

fn default_global_timeout() -> u64 {
    2000
}

fn default_transport_timeout() -> u64 {
    3000
}

fn default_feed_load_timeout() -> u64 {
    2000
}

fn default_feed_init_timeout() -> u64 {
    3000
}

fn default_search_hook_timeout() -> u64 {
    1500
}

fn default_cleanup_interval() -> u64 {
    6 * 60 * 60
}

fn default_cleanup_retention() -> u64 {
    24
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_interval() -> u64 {
    5000
}

//! Connection registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Subscriber connection, queue, and broadcast configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Heartbeat sweep period in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Idle window after which a silent connection is evicted.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Window for a newly admitted transport to reach the open state.
    #[serde(default = "default_admission_timeout")]
    pub admission_timeout_secs: u64,
    /// Capacity of the recent-message ring buffer.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Number of queued messages replayed to a new connection.
    #[serde(default = "default_replay_count")]
    pub replay_count: usize,
    /// Time budget for one broadcast fan-out.
    #[serde(default = "default_broadcast_budget")]
    pub broadcast_budget_ms: u64,
    /// Outbound frame buffer per connection.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    /// Topics advertised in the welcome message.
    #[serde(default = "default_available_subscriptions")]
    pub available_subscriptions: Vec<String>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            idle_timeout_secs: default_idle_timeout(),
            admission_timeout_secs: default_admission_timeout(),
            queue_capacity: default_queue_capacity(),
            replay_count: default_replay_count(),
            broadcast_budget_ms: default_broadcast_budget(),
            channel_buffer_size: default_channel_buffer(),
            available_subscriptions: default_available_subscriptions(),
        }
    }
}

impl RealtimeConfig {
    /// Heartbeat sweep period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Idle eviction window.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Admission window.
    pub fn admission_timeout(&self) -> Duration {
        Duration::from_secs(self.admission_timeout_secs)
    }

    /// Broadcast fan-out budget.
    pub fn broadcast_budget(&self) -> Duration {
        Duration::from_millis(self.broadcast_budget_ms)
    }
}

fn default_heartbeat_interval() -> u64 {
    15
}

fn default_idle_timeout() -> u64 {
    30
}

fn default_admission_timeout() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_replay_count() -> usize {
    10
}

fn default_broadcast_budget() -> u64 {
    2000
}

fn default_channel_buffer() -> usize {
    256
}

fn default_available_subscriptions() -> Vec<String> {
    ["metrics", "alerts", "system_health", "search_trends", "performance"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

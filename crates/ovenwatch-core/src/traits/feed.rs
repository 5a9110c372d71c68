//! Periodic metrics/alerts feed.

use std::sync::Arc;

use async_trait::async_trait;

use crate::result::AppResult;

/// A running metrics/alerts feed.
#[async_trait]
pub trait MetricsFeed: Send + Sync + std::fmt::Debug + 'static {
    /// Start sampling and alert evaluation.
    async fn initialize(&self) -> AppResult<()>;

    /// Stop all feed timers. Idempotent.
    fn stop(&self);

    /// Drop monitoring data older than `retention`, returning how many
    /// items were removed.
    fn prune(&self, retention: std::time::Duration) -> usize;

    /// Record an acknowledgement for an active alert.
    fn acknowledge(&self, alert_id: &str) -> bool;

    /// Whether this is the degraded no-op implementation.
    fn is_noop(&self) -> bool {
        false
    }
}

/// Resolves the feed implementation.
///
/// Resolution may be slow (it stands in for loading the implementation on
/// demand), so the orchestrator races it against a timer.
#[async_trait]
pub trait FeedLoader: Send + Sync + std::fmt::Debug + 'static {
    /// Produce the feed to initialize.
    async fn load(&self) -> AppResult<Arc<dyn MetricsFeed>>;
}

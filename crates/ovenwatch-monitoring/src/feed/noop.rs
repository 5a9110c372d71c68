//! Feed used when the real one cannot be loaded or initialized.

use std::time::Duration;

use async_trait::async_trait;

use ovenwatch_core::result::AppResult;
use ovenwatch_core::traits::MetricsFeed;

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFeed;

#[async_trait]
impl MetricsFeed for NoopFeed {
    async fn initialize(&self) -> AppResult<()> {
        tracing::warn!("Using the no-op metrics feed");
        Ok(())
    }

    fn stop(&self) {}

    fn prune(&self, _retention: Duration) -> usize {
        0
    }

    fn acknowledge(&self, _alert_id: &str) -> bool {
        false
    }

    fn is_noop(&self) -> bool {
        true
    }
}

//! Search-monitoring hook.

use async_trait::async_trait;

use crate::result::AppResult;

/// Best-effort wiring of search instrumentation into the monitoring core.
#[async_trait]
pub trait SearchHook: Send + Sync + std::fmt::Debug + 'static {
    /// Attach the hook.
    async fn attach(&self) -> AppResult<()>;
}

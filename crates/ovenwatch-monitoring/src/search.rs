//! Default search-monitoring hook.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use ovenwatch_core::result::AppResult;
use ovenwatch_core::traits::SearchHook;

/// Marks search instrumentation as attached and logs it. Searches report
/// through the registry's broadcast engine, so nothing else needs wiring.
#[derive(Debug, Default)]
pub struct LoggingSearchHook {
    attached: AtomicBool,
}

impl LoggingSearchHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `attach` has completed.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SearchHook for LoggingSearchHook {
    async fn attach(&self) -> AppResult<()> {
        if !self.attached.swap(true, Ordering::AcqRel) {
            tracing::info!("Search monitoring attached");
        }
        Ok(())
    }
}

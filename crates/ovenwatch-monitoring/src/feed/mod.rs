//! Metrics/alerts feed implementations and the slot the orchestrator keeps
//! the active one in.

pub mod noop;
pub mod realtime;

use std::sync::{Arc, RwLock};

use ovenwatch_core::traits::MetricsFeed;

pub use noop::NoopFeed;
pub use realtime::{
    AlertEvent, FeedSettings, FeedSnapshot, MetricSample, RealtimeFeed, RealtimeFeedLoader, Trend,
};

/// Shared, swappable handle to the active feed.
///
/// Starts out holding a [`NoopFeed`]; the feed stage replaces it.
#[derive(Debug, Clone)]
pub struct FeedSlot {
    inner: Arc<RwLock<Arc<dyn MetricsFeed>>>,
}

impl FeedSlot {
    /// Slot holding a no-op feed.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(NoopFeed))),
        }
    }

    /// The active feed.
    pub fn current(&self) -> Arc<dyn MetricsFeed> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Installs `feed` and returns the previous one.
    pub fn replace(&self, feed: Arc<dyn MetricsFeed>) -> Arc<dyn MetricsFeed> {
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *slot, feed)
    }

    /// Stops the active feed and puts a no-op feed in its place.
    pub fn reset(&self) {
        self.replace(Arc::new(NoopFeed)).stop();
    }
}

impl Default for FeedSlot {
    fn default() -> Self {
        Self::new()
    }
}

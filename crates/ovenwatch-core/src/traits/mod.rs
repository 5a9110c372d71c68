//! Traits defined in `ovenwatch-core` and implemented by other crates.
//!
//! These are the seams through which the orchestrator reaches its external
//! collaborators; tests substitute slow or failing doubles for each one.

pub mod feed;
pub mod search;
pub mod transport;

pub use feed::{FeedLoader, MetricsFeed};
pub use search::SearchHook;
pub use transport::TransportConnector;

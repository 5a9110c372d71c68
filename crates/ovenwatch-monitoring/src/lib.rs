//! # ovenwatch-monitoring
//!
//! Boot orchestration and the periodic services around it:
//!
//! - Staged initialization under a global ceiling, with fallback
//! - Background transport reconnection
//! - Metrics/alerts feed with per-environment thresholds
//! - Scheduled cleanup and health reporting

pub mod cleanup;
pub mod feed;
pub mod health;
pub mod orchestrator;
pub mod search;
pub mod self_test;
pub mod system;
pub mod thresholds;
pub mod traps;

pub use cleanup::{Cleaner, CleanupReport, CleanupSchedule};
pub use feed::{FeedSlot, NoopFeed, RealtimeFeed, RealtimeFeedLoader};
pub use health::{ComponentHealth, HealthCheckResult, HealthMetrics, HealthReporter, HealthStatus};
pub use orchestrator::{Collaborators, InitializationOrchestrator};
pub use search::LoggingSearchHook;
pub use thresholds::{AlertThreshold, AlertThresholds, Severity};

//! State shared by every handler.

use std::sync::Arc;

use ovenwatch_monitoring::HealthReporter;
use ovenwatch_realtime::ConnectionRegistry;

/// Cheap to clone; handlers receive it through axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Subscriber connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Health synthesis over the registry and the active feed.
    pub health: HealthReporter,
}

impl AppState {
    pub fn new(registry: Arc<ConnectionRegistry>, health: HealthReporter) -> Self {
        Self { registry, health }
    }
}

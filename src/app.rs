//! Wires configuration, the connection registry, the HTTP surface, and the
//! orchestrator into one engine.

use std::sync::Arc;

use axum::Router;

use ovenwatch_core::config::AppConfig;
use ovenwatch_core::lifecycle::Lifecycle;
use ovenwatch_core::result::AppResult;
use ovenwatch_monitoring::{
    Collaborators, FeedSlot, HealthReporter, InitializationOrchestrator, LoggingSearchHook,
    RealtimeFeedLoader,
};
use ovenwatch_realtime::ConnectionRegistry;

use crate::api::{AppState, build_router};
use crate::transport::WsTransport;

/// Everything a running server owns.
#[derive(Debug, Clone)]
pub struct Engine {
    pub orchestrator: Arc<InitializationOrchestrator>,
    pub transport: Arc<WsTransport>,
    pub router: Router,
}

/// Builds the engine without starting anything.
pub fn build_engine(config: &AppConfig) -> Engine {
    let monitoring = config.monitoring.clone();
    let registry = ConnectionRegistry::new(
        config.realtime.clone(),
        Lifecycle::new(monitoring.endpoint.clone()),
    );
    let feed = FeedSlot::new();

    let state = AppState::new(
        registry.clone(),
        HealthReporter::new(registry.clone(), feed.clone(), monitoring.enabled),
    );
    let router = build_router(state);
    let transport = Arc::new(WsTransport::new(router.clone()));

    let collaborators = Collaborators {
        transport: transport.clone(),
        feed_loader: Arc::new(RealtimeFeedLoader::new(registry.clone(), &monitoring)),
        search_hook: Arc::new(LoggingSearchHook::new()),
    };
    let orchestrator =
        InitializationOrchestrator::with_feed(monitoring, registry, feed, collaborators);

    Engine {
        orchestrator,
        transport,
        router,
    }
}

/// Boots the engine and serves until Ctrl-C, then shuts down.
pub async fn run_server(config: AppConfig) -> AppResult<()> {
    let engine = build_engine(&config);

    let state = engine.orchestrator.initialize().await;
    match engine.transport.local_addr() {
        Some(addr) => tracing::info!("Listening on {}", addr),
        None => tracing::warn!(
            phase = %state.phase,
            error = ?state.error,
            "Transport is not listening yet"
        ),
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    engine.orchestrator.shutdown().await
}

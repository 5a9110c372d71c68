//! Route definitions.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::api::state::AppState;

/// Builds the router served on the monitoring endpoint.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(handlers::ws::ws_upgrade))
        .route("/health", get(handlers::health::health))
        .route("/stats", get(handlers::health::stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Health and statistics handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use ovenwatch_monitoring::{HealthCheckResult, HealthStatus};
use ovenwatch_realtime::ConnectionStats;

use crate::api::state::AppState;

/// GET /health
///
/// 200 while healthy or degraded, 503 once unhealthy.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthCheckResult>) {
    let result = state.health.check();
    let status = match result.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(result))
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<ConnectionStats> {
    Json(state.registry.connection_stats())
}

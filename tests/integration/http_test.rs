//! Health and statistics routes.

use axum::http::StatusCode;
use tokio::net::TcpListener;

use crate::helpers::TestApp;

#[tokio::test]
async fn test_health_is_unavailable_before_boot() {
    let app = TestApp::new();

    let response = app.request("GET", "/health").await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body["status"], "unhealthy");
    assert_eq!(response.body["components"]["monitoring"], "unhealthy");
}

#[tokio::test]
async fn test_health_after_clean_boot() {
    let app = TestApp::new().start().await;

    let response = app.request("GET", "/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["metrics"]["fallbackMode"], false);
    assert_eq!(response.body["metrics"]["activeConnections"], 0);
    assert!(response.body.get("error").is_none());

    app.shutdown().await;
}

#[tokio::test]
async fn test_occupied_endpoint_boots_in_fallback() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();

    let app = TestApp::with_endpoint(&format!("ws://127.0.0.1:{port}"))
        .start()
        .await;

    let state = app.engine.orchestrator.state();
    assert!(state.fallback_mode());
    assert!(state.is_initialized());
    assert!(state.error.is_some());

    let response = app.request("GET", "/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "degraded");
    assert_eq!(response.body["components"]["registry"], "degraded");
    assert_eq!(response.body["metrics"]["fallbackMode"], true);

    let stats = app.request("GET", "/stats").await;
    assert_eq!(stats.body["fallback_mode"], true);
    assert_eq!(stats.body["has_error"], true);

    app.shutdown().await;
}

#[tokio::test]
async fn test_stats_shape() {
    let app = TestApp::new().start().await;

    let response = app.request("GET", "/stats").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["total_connections"], 0);
    assert_eq!(response.body["open_connections"], 0);
    assert!(response.body["queued_messages"].is_number());
    assert!(response.body["subscription_stats"].is_object());
    assert_eq!(response.body["reconnect_attempts"], 0);

    app.shutdown().await;
}

#[tokio::test]
async fn test_plain_get_on_ws_is_rejected() {
    let app = TestApp::new().start().await;

    let response = app.request("GET", "/ws").await;

    assert!(
        response.status.is_client_error(),
        "expected a client error, got {}",
        response.status
    );

    app.shutdown().await;
}

//! Shared test helpers for integration tests.

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use ovenwatch::{Engine, build_engine};
use ovenwatch_core::config::AppConfig;

/// Test application context
pub struct TestApp {
    pub engine: Engine,
    pub config: AppConfig,
}

impl TestApp {
    /// Engine on an ephemeral local port, not yet initialized.
    pub fn new() -> Self {
        Self::with_endpoint("ws://127.0.0.1:0")
    }

    pub fn with_endpoint(endpoint: &str) -> Self {
        let mut config = AppConfig::from_toml("").expect("default config");
        config.monitoring.endpoint = endpoint.to_string();
        Self {
            engine: build_engine(&config),
            config,
        }
    }

    /// Runs the boot sequence.
    pub async fn start(self) -> Self {
        self.engine.orchestrator.initialize().await;
        self
    }

    /// Address the transport listens on.
    pub fn addr(&self) -> SocketAddr {
        self.engine
            .transport
            .local_addr()
            .expect("transport is listening")
    }

    /// Make a request through the router without a socket.
    pub async fn request(&self, method: &str, path: &str) -> TestResponse {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .expect("Failed to build request");

        let response = self
            .engine
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");

        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }

    pub async fn shutdown(&self) {
        self.engine
            .orchestrator
            .shutdown()
            .await
            .expect("shutdown");
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Parsed JSON body
    pub body: Value,
}

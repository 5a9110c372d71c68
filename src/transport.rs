//! Subscriber transport backed by an axum listener.
//!
//! Establishing the transport binds the host and port named by the
//! monitoring endpoint and serves the API router on it.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use ovenwatch_core::error::{AppError, ErrorKind};
use ovenwatch_core::result::AppResult;
use ovenwatch_core::traits::TransportConnector;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct RunningServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// [`TransportConnector`] that serves `router` over HTTP/WebSocket.
#[derive(Debug)]
pub struct WsTransport {
    router: Router,
    server: Mutex<Option<RunningServer>>,
}

impl WsTransport {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            server: Mutex::new(None),
        }
    }

    /// Address the listener is bound to, while it runs.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_server()
            .as_ref()
            .filter(|s| !s.task.is_finished())
            .map(|s| s.addr)
    }

    fn lock_server(&self) -> std::sync::MutexGuard<'_, Option<RunningServer>> {
        self.server.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TransportConnector for WsTransport {
    async fn establish(&self, endpoint: &str) -> AppResult<()> {
        if let Some(addr) = self.local_addr() {
            debug!(%addr, "Transport already listening");
            return Ok(());
        }

        let bind_to = bind_address(endpoint)?;
        let listener = TcpListener::bind(&bind_to).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Transport,
                format!("failed to bind {bind_to}: {e}"),
                e,
            )
        })?;
        let addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = oneshot::channel();
        let router = self.router.clone();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                error!(error = %e, "Transport listener failed");
            }
        });

        let previous = self.lock_server().replace(RunningServer {
            addr,
            shutdown,
            task,
        });
        if let Some(previous) = previous {
            previous.task.abort();
        }
        info!(%addr, "Transport listening");
        Ok(())
    }

    async fn close(&self) {
        let Some(server) = self.lock_server().take() else {
            return;
        };
        let _ = server.shutdown.send(());
        let mut task = server.task;
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!(addr = %server.addr, "Transport did not drain in time, aborting");
            task.abort();
        }
        info!(addr = %server.addr, "Transport closed");
    }
}

/// Extracts `host:port` from an endpoint URL.
///
/// The scheme and any path are dropped; a missing port defaults to 80.
pub fn bind_address(endpoint: &str) -> AppResult<String> {
    let rest = ["ws://", "wss://", "http://", "https://"]
        .iter()
        .find_map(|scheme| endpoint.strip_prefix(scheme))
        .unwrap_or(endpoint);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if authority.is_empty() {
        return Err(AppError::configuration(format!(
            "endpoint '{endpoint}' has no host"
        )));
    }

    let has_port = match authority.rfind(']') {
        Some(bracket) => authority[bracket..].contains(':'),
        None => authority.contains(':'),
    };
    if has_port {
        Ok(authority.to_string())
    } else {
        Ok(format!("{authority}:80"))
    }
}

//! WebSocket upgrade handler.
//!
//! Each socket is bridged to a [`TransportHandle`] pair: the registry owns
//! the handle, this module drives the peer.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use ovenwatch_core::error::AppError;
use ovenwatch_core::lifecycle::Phase;
use ovenwatch_realtime::message::validator::MAX_FRAME_SIZE;
use ovenwatch_realtime::{TransportHandle, TransportState};

use crate::api::error::ApiError;
use crate::api::state::AppState;

/// Query parameters accepted on upgrade.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Comma-separated initial topics.
    #[serde(default)]
    pub subscriptions: Option<String>,
}

impl WsQuery {
    fn topics(&self) -> Vec<&str> {
        self.subscriptions
            .as_deref()
            .map(|raw| raw.split(',').map(str::trim).collect())
            .unwrap_or_default()
    }
}

/// GET /ws?subscriptions=metrics,alerts
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    if state.registry.lifecycle().phase() == Phase::Uninitialized {
        return Err(AppError::transport("monitoring is not running").into());
    }
    let topics: Vec<String> = query.topics().into_iter().map(str::to_string).collect();
    Ok(ws
        .max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| handle_socket(state, topics, socket)))
}

async fn handle_socket(state: AppState, topics: Vec<String>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let registry = state.registry;

    let (handle, mut peer) = TransportHandle::pair(registry.config().channel_buffer_size);
    peer.open();
    let topics: Vec<&str> = topics.iter().map(String::as_str).collect();
    let conn_id = registry.admit(handle, &topics);
    if conn_id.is_error_marker() {
        let _ = ws_tx.close().await;
        return;
    }
    info!(conn_id = %conn_id, "WebSocket connection established");

    let mut transport_state = peer.watch_state();
    let outbound_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = peer.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                closed = async { transport_state.wait_for(|s| *s == TransportState::Closed).await.is_ok() } => {
                    // Flush what the registry queued before closing.
                    if closed {
                        for frame in peer.drain() {
                            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    break;
                }
            }
        }
        let _ = ws_tx.close().await;
        peer.close();
    });

    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Text(text)) => registry.route_inbound(&conn_id, text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
        if registry.get(&conn_id).is_none() {
            debug!(conn_id = %conn_id, "Connection evicted, closing socket");
            break;
        }
    }

    registry.evict(&conn_id);
    let _ = outbound_task.await;

    info!(conn_id = %conn_id, "WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_topics() {
        let query = WsQuery {
            subscriptions: Some("metrics, alerts,,".to_string()),
        };
        assert_eq!(query.topics(), vec!["metrics", "alerts", "", ""]);
        assert!(WsQuery::default().topics().is_empty());
    }
}

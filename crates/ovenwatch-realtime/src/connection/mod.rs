//! Subscriber connections: identity, transport, pool, registry, heartbeat.

pub mod heartbeat;
pub mod pool;
pub mod registry;
pub mod transport;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use ovenwatch_core::result::AppResult;

use crate::message::types::OutboundMessage;
use transport::{TransportHandle, TransportState};

/// Opaque connection identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    const ERROR_PREFIX: &'static str = "error_";

    /// Generates a fresh id.
    pub fn generate() -> Self {
        Self(format!(
            "ws_{}_{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        ))
    }

    /// Marker returned for a rejected admission; never registered.
    pub fn error_marker() -> Self {
        Self(format!(
            "{}{}_{}",
            Self::ERROR_PREFIX,
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        ))
    }

    /// Whether this id marks a rejected admission.
    pub fn is_error_marker(&self) -> bool {
        self.0.starts_with(Self::ERROR_PREFIX)
    }

    /// Borrow as string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One live subscriber connection.
#[derive(Debug)]
pub struct Connection {
    /// Unique id
    pub id: ConnectionId,
    /// When the connection was admitted
    pub connected_at: DateTime<Utc>,
    transport: TransportHandle,
    last_ping_at: Mutex<Instant>,
    subscriptions: RwLock<BTreeSet<String>>,
}

impl Connection {
    /// Creates a connection with already-validated topics.
    pub fn new(id: ConnectionId, transport: TransportHandle, topics: Vec<String>) -> Self {
        Self {
            id,
            connected_at: Utc::now(),
            transport,
            last_ping_at: Mutex::new(Instant::now()),
            subscriptions: RwLock::new(topics.into_iter().collect()),
        }
    }

    /// Transport state.
    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    /// Whether the transport is open.
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Underlying transport.
    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    /// Refresh liveness.
    pub fn touch(&self) {
        let mut last = self.last_ping_at.lock().unwrap_or_else(|e| e.into_inner());
        *last = Instant::now();
    }

    /// Last liveness signal.
    pub fn last_ping_at(&self) -> Instant {
        *self.last_ping_at.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Strictly older than `idle` at `now`.
    pub fn is_stale(&self, now: Instant, idle: Duration) -> bool {
        now.saturating_duration_since(self.last_ping_at()) > idle
    }

    /// Union topics into the subscription set. Returns how many were new.
    pub fn subscribe(&self, topics: &[String]) -> usize {
        let mut subs = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        topics.iter().filter(|t| subs.insert((*t).clone())).count()
    }

    /// Remove topics. Returns how many were present.
    pub fn unsubscribe(&self, topics: &[String]) -> usize {
        let mut subs = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        topics.iter().filter(|t| subs.remove(t.as_str())).count()
    }

    /// Whether subscribed to `topic`.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(topic)
    }

    /// Snapshot of the subscription set.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Sends one message.
    ///
    /// `Ok(false)` means the transport is not open and nothing was
    /// attempted; `Err` is a transport failure the caller resolves by
    /// evicting.
    pub fn send(&self, message: &OutboundMessage) -> AppResult<bool> {
        self.send_frame(message.to_frame()?)
    }

    /// Sends an already serialized frame. See [`Connection::send`].
    pub fn send_frame(&self, frame: String) -> AppResult<bool> {
        if !self.transport.is_open() {
            return Ok(false);
        }
        self.transport.send(frame)?;
        Ok(true)
    }

    /// Closes the transport if still open.
    pub fn close(&self) {
        self.transport.close();
    }
}

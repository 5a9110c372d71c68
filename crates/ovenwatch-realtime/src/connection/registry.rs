//! Connection registry: admission, eviction, inbound routing, statistics.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use ovenwatch_core::config::RealtimeConfig;
use ovenwatch_core::lifecycle::Lifecycle;

use crate::broadcast::{BroadcastEngine, BroadcastOptions};
use crate::message::types::{self, Decoded, InboundMessage, OutboundMessage};
use crate::message::validator::valid_topics;
use crate::metrics::RealtimeMetrics;
use crate::queue::MessageQueue;

use super::heartbeat::HeartbeatMonitor;
use super::pool::ConnectionPool;
use super::transport::{TransportHandle, TransportState};
use super::{Connection, ConnectionId};

const ACK_CHANNEL_CAPACITY: usize = 64;

/// Summary counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Registered connections.
    pub total_connections: usize,
    /// Connections heard from within the idle window.
    pub active_connections: usize,
    /// Replay queue depth.
    pub queue_size: usize,
}

/// Detailed diagnostics, served on `/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Registered connections.
    pub total_connections: usize,
    /// Connections whose transport is open.
    pub open_connections: usize,
    /// Replay queue depth.
    pub queued_messages: usize,
    /// Subscriber count per topic.
    pub subscription_stats: BTreeMap<String, usize>,
    /// Whether the core runs degraded.
    pub fallback_mode: bool,
    /// Background transport reconnection attempts.
    pub reconnect_attempts: u32,
    /// Whether an error is recorded.
    pub has_error: bool,
    /// Last recorded error.
    pub last_error: Option<String>,
}

/// Alert acknowledgement received from a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertAcknowledgement {
    /// Alert identifier.
    pub alert_id: String,
    /// Acknowledging connection.
    pub acknowledged_by: ConnectionId,
}

/// Owns every live subscriber connection.
#[derive(Debug)]
pub struct ConnectionRegistry {
    pool: Arc<ConnectionPool>,
    queue: Arc<MessageQueue>,
    broadcaster: Arc<BroadcastEngine>,
    lifecycle: Lifecycle,
    metrics: Arc<RealtimeMetrics>,
    config: RealtimeConfig,
    heartbeat: HeartbeatMonitor,
    acknowledgements: broadcast::Sender<AlertAcknowledgement>,
}

impl ConnectionRegistry {
    /// Creates a registry with its own pool, queue, and broadcast engine.
    pub fn new(config: RealtimeConfig, lifecycle: Lifecycle) -> Arc<Self> {
        let pool = Arc::new(ConnectionPool::new());
        let queue = Arc::new(MessageQueue::new(config.queue_capacity, config.replay_count));
        let metrics = Arc::new(RealtimeMetrics::new());
        let broadcaster = Arc::new(BroadcastEngine::new(
            pool.clone(),
            queue.clone(),
            lifecycle.clone(),
            metrics.clone(),
            config.broadcast_budget(),
        ));
        let (acknowledgements, _) = broadcast::channel(ACK_CHANNEL_CAPACITY);

        Arc::new(Self {
            pool,
            queue,
            broadcaster,
            lifecycle,
            metrics,
            config,
            heartbeat: HeartbeatMonitor::new(),
            acknowledgements,
        })
    }

    /// Admits a transport and returns the new connection id.
    ///
    /// A transport that is already closed is rejected with an error-marker
    /// id; nothing is registered for it. A transport that does not open
    /// within the admission window is evicted.
    pub fn admit(self: &Arc<Self>, handle: TransportHandle, initial: &[&str]) -> ConnectionId {
        if handle.state() == TransportState::Closed {
            warn!("Rejected admission of a closed transport");
            return ConnectionId::error_marker();
        }

        let topics = valid_topics(initial.iter().copied());
        let mut conn = Arc::new(Connection::new(ConnectionId::generate(), handle, topics));
        while !self.pool.add(conn.clone()) {
            // Id collision; only reachable if the clock and RNG both repeat.
            let Some(inner) = Arc::into_inner(conn) else {
                return ConnectionId::error_marker();
            };
            let Connection {
                transport,
                subscriptions,
                ..
            } = inner;
            let topics = subscriptions
                .into_inner()
                .unwrap_or_else(|e| e.into_inner())
                .into_iter()
                .collect();
            conn = Arc::new(Connection::new(ConnectionId::generate(), transport, topics));
        }

        let id = conn.id.clone();
        self.metrics.connection_opened();
        info!(conn_id = %id, subscriptions = ?conn.subscriptions(), "Connection admitted");

        if conn.is_open() {
            self.send_initial_data(&conn);
        } else {
            let registry = Arc::downgrade(self);
            let window = self.config.admission_timeout();
            tokio::spawn(async move {
                let opened = time::timeout(window, conn.transport().opened()).await;
                let Some(registry) = registry.upgrade() else {
                    return;
                };
                match opened {
                    Ok(true) if registry.pool.contains(&conn.id) => {
                        registry.send_initial_data(&conn);
                    }
                    Ok(true) => {}
                    Ok(false) => {
                        registry.evict(&conn.id);
                    }
                    Err(_) => {
                        warn!(conn_id = %conn.id, "Transport did not open within the admission window");
                        registry.evict(&conn.id);
                    }
                }
            });
        }

        id
    }

    fn send_initial_data(&self, conn: &Connection) {
        let welcome = OutboundMessage::welcome(conn.id.as_str(), &self.config.available_subscriptions);
        match conn.send(&welcome) {
            Ok(true) => {
                self.metrics.sent(1);
                match self.queue.replay(conn) {
                    Ok(replayed) => {
                        self.metrics.sent(replayed as u64);
                        debug!(conn_id = %conn.id, replayed, "Welcome sent");
                    }
                    Err(e) => {
                        warn!(conn_id = %conn.id, error = %e, "Failed to replay backlog");
                        self.evict(&conn.id);
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(conn_id = %conn.id, error = %e, "Failed to send welcome");
                self.evict(&conn.id);
            }
        }
    }

    /// Closes the transport and removes the entry. Idempotent.
    pub fn evict(&self, id: &ConnectionId) -> bool {
        match self.pool.evict(id) {
            Some(_) => {
                self.metrics.connection_closed();
                info!(conn_id = %id, "Connection evicted");
                true
            }
            None => false,
        }
    }

    /// Handles one inbound text frame.
    ///
    /// Any frame with a well-typed envelope refreshes liveness. Unknown
    /// types and malformed payloads are logged and dropped.
    pub fn route_inbound(&self, id: &ConnectionId, raw: &str) {
        let Some(conn) = self.pool.get(id) else {
            warn!(conn_id = %id, "Message from unknown connection");
            return;
        };
        self.metrics.received();

        let (kind, value) = match types::envelope_type(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.metrics.protocol_error();
                warn!(conn_id = %id, error = %e, "Dropped inbound frame");
                return;
            }
        };
        conn.touch();

        let message = match types::decode(&kind, value) {
            Ok(Decoded::Message(message)) => message,
            Ok(Decoded::Unknown(kind)) => {
                self.metrics.protocol_error();
                warn!(conn_id = %id, kind = %kind, "Unknown message type");
                return;
            }
            Err(e) => {
                self.metrics.protocol_error();
                warn!(conn_id = %id, error = %e, "Dropped inbound frame");
                return;
            }
        };

        match message {
            InboundMessage::Ping { .. } => {
                self.reply(&conn, &OutboundMessage::pong());
            }
            InboundMessage::Subscribe { .. } => {
                let topics = message.topics();
                let added = conn.subscribe(&topics);
                info!(conn_id = %id, ?topics, added, "Subscribed");
            }
            InboundMessage::Unsubscribe { .. } => {
                let topics = message.topics();
                let removed = conn.unsubscribe(&topics);
                info!(conn_id = %id, ?topics, removed, "Unsubscribed");
            }
            InboundMessage::AcknowledgeAlert { alert_id } => {
                self.acknowledge_alert(&conn, alert_id);
            }
        }
    }

    fn reply(&self, conn: &Connection, message: &OutboundMessage) {
        match conn.send(message) {
            Ok(true) => self.metrics.sent(1),
            Ok(false) => {}
            Err(e) => {
                debug!(conn_id = %conn.id, error = %e, "Reply failed");
                self.evict(&conn.id);
            }
        }
    }

    fn acknowledge_alert(&self, conn: &Connection, alert_id: Value) {
        let key = match &alert_id {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) if n.as_f64().is_some_and(|v| v != 0.0) => n.to_string(),
            Value::Null | Value::Bool(false) | Value::String(_) | Value::Number(_) => {
                self.metrics.protocol_error();
                warn!(conn_id = %conn.id, "Acknowledgement without an alert id");
                return;
            }
            other => other.to_string(),
        };

        let message = OutboundMessage::alert_acknowledged(&alert_id, conn.id.as_str());
        self.broadcaster
            .broadcast(&message, None, BroadcastOptions::default());
        // No receiver simply means no feed is running.
        let _ = self.acknowledgements.send(AlertAcknowledgement {
            alert_id: key,
            acknowledged_by: conn.id.clone(),
        });
        info!(conn_id = %conn.id, alert_id = %alert_id, "Alert acknowledged");
    }

    /// Sends directly to one connection.
    ///
    /// When the core is not initialized, the id is unknown, or the
    /// transport is not open, the message is queued instead and `false` is
    /// returned.
    pub fn send_to(&self, id: &ConnectionId, message: &OutboundMessage) -> bool {
        if !self.lifecycle.is_initialized() {
            self.broadcaster.enqueue(message.clone());
            return false;
        }
        let Some(conn) = self.pool.get(id) else {
            self.broadcaster.enqueue(message.clone());
            return false;
        };
        match conn.send(message) {
            Ok(true) => {
                self.metrics.sent(1);
                true
            }
            Ok(false) => {
                warn!(conn_id = %id, state = ?conn.state(), "Connection is not open");
                self.broadcaster.enqueue(message.clone());
                false
            }
            Err(e) => {
                warn!(conn_id = %id, error = %e, "Send failed");
                self.metrics.failed(1);
                self.evict(id);
                false
            }
        }
    }

    /// Evicts every connection idle for longer than the idle window.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let idle = self.config.idle_timeout();
        let mut evicted = 0;
        for id in self.pool.ids() {
            if let Some(conn) = self.pool.remove_if(&id, |c| c.is_stale(now, idle)) {
                conn.close();
                self.metrics.connection_closed();
                info!(conn_id = %id, "Connection timed out");
                evicted += 1;
            }
        }
        evicted
    }

    /// Evicts connections whose transport already closed.
    pub fn prune_closed(&self) -> usize {
        let mut pruned = 0;
        for id in self.pool.ids() {
            if self
                .pool
                .remove_if(&id, |c| c.state() == TransportState::Closed)
                .is_some()
            {
                self.metrics.connection_closed();
                pruned += 1;
            }
        }
        pruned
    }

    /// Evicts every connection.
    pub fn close_all(&self) -> usize {
        self.pool.ids().iter().filter(|id| self.evict(id)).count()
    }

    /// Starts the recurring idle sweep.
    pub fn start_heartbeat(self: &Arc<Self>) {
        self.heartbeat
            .start(Arc::downgrade(self), self.config.heartbeat_interval());
    }

    /// Stops the idle sweep. Idempotent.
    pub fn stop_heartbeat(&self) {
        self.heartbeat.stop();
    }

    /// Whether the idle sweep is running.
    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.is_running()
    }

    /// Summary counts.
    pub fn stats(&self) -> RegistryStats {
        let now = Instant::now();
        let idle = self.config.idle_timeout();
        let connections = self.pool.all_connections();
        RegistryStats {
            total_connections: connections.len(),
            active_connections: connections.iter().filter(|c| !c.is_stale(now, idle)).count(),
            queue_size: self.queue.len(),
        }
    }

    /// Detailed diagnostics including lifecycle flags.
    pub fn connection_stats(&self) -> ConnectionStats {
        let state = self.lifecycle.snapshot();
        let connections = self.pool.all_connections();
        ConnectionStats {
            total_connections: connections.len(),
            open_connections: connections.iter().filter(|c| c.is_open()).count(),
            queued_messages: self.queue.len(),
            subscription_stats: self.pool.subscription_counts(),
            fallback_mode: state.fallback_mode(),
            reconnect_attempts: state.reconnect_attempts,
            has_error: state.error.is_some(),
            last_error: state.error,
        }
    }

    /// Subscribe to alert acknowledgements from subscribers.
    pub fn acknowledgements(&self) -> broadcast::Receiver<AlertAcknowledgement> {
        self.acknowledgements.subscribe()
    }

    /// Looks up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.pool.get(id)
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.pool.connection_count()
    }

    /// Broadcast engine sharing this registry's pool and queue.
    pub fn broadcaster(&self) -> &Arc<BroadcastEngine> {
        &self.broadcaster
    }

    /// Replay queue.
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// Engine counters.
    pub fn metrics(&self) -> &Arc<RealtimeMetrics> {
        &self.metrics
    }

    /// Lifecycle the registry consults before delivering.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Registry configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Weak handle for background tasks.
    pub fn downgrade(self: &Arc<Self>) -> Weak<Self> {
        Arc::downgrade(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::transport::TransportPeer;
    use std::time::Duration;

    fn registry() -> Arc<ConnectionRegistry> {
        let lifecycle = Lifecycle::new("ws://localhost:8080");
        lifecycle.begin_initializing();
        lifecycle.complete();
        ConnectionRegistry::new(RealtimeConfig::default(), lifecycle)
    }

    fn open_connection(registry: &Arc<ConnectionRegistry>, topics: &[&str]) -> (ConnectionId, TransportPeer) {
        let (handle, mut peer) = TransportHandle::pair(64);
        peer.open();
        let id = registry.admit(handle, topics);
        peer.drain();
        (id, peer)
    }

    fn kinds(peer: &mut TransportPeer) -> Vec<String> {
        peer.drain()
            .iter()
            .map(|f| {
                let value: Value = serde_json::from_str(f).expect("json");
                value["type"].as_str().unwrap_or_default().to_string()
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_connection_is_swept() {
        let registry = registry();
        let (first, _p1) = open_connection(&registry, &[]);
        let (second, _p2) = open_connection(&registry, &[]);
        let (third, _p3) = open_connection(&registry, &[]);

        time::advance(Duration::from_secs(20)).await;
        registry.route_inbound(&first, r#"{"type":"ping"}"#);
        registry.route_inbound(&third, r#"{"type":"ping"}"#);
        time::advance(Duration::from_secs(11)).await;

        assert_eq!(registry.sweep(), 1);
        assert_eq!(registry.connection_count(), 2);
        assert!(registry.get(&second).is_none());
        assert!(registry.get(&first).is_some());
        assert!(registry.get(&third).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshed_at_29s_survives() {
        let registry = registry();
        let (id, _peer) = open_connection(&registry, &[]);
        time::advance(Duration::from_secs(29)).await;
        registry.route_inbound(&id, r#"{"type":"subscribe","subscriptions":["metrics"]}"#);
        time::advance(Duration::from_secs(29)).await;
        assert_eq!(registry.sweep(), 0);
        assert_eq!(registry.connection_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_task_evicts() {
        let registry = registry();
        registry.start_heartbeat();
        let (_id, peer) = open_connection(&registry, &[]);

        time::sleep(Duration::from_secs(46)).await;
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(peer.state(), TransportState::Closed);

        registry.stop_heartbeat();
        assert!(!registry.heartbeat_running());
    }

    #[tokio::test]
    async fn test_closed_handle_is_rejected() {
        let registry = registry();
        let (handle, peer) = TransportHandle::pair(4);
        peer.close();
        let id = registry.admit(handle, &["metrics"]);
        assert!(id.is_error_marker());
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_welcome_then_replay_on_open() {
        let registry = registry();
        registry.broadcaster().enqueue(OutboundMessage::new("alert", None));
        registry.broadcaster().enqueue(OutboundMessage::new("metrics_update", None));

        let (handle, mut peer) = TransportHandle::pair(64);
        let id = registry.admit(handle, &["metrics", "", "bad topic"]);
        assert!(!id.is_error_marker());
        peer.open();

        let welcome = time::timeout(Duration::from_secs(1), peer.recv())
            .await
            .expect("welcome in time")
            .expect("frame");
        let welcome: Value = serde_json::from_str(&welcome).expect("json");
        assert_eq!(welcome["type"], "welcome");
        assert_eq!(welcome["data"]["connectionId"], id.as_str());
        assert_eq!(kinds(&mut peer), vec!["queued_alert", "queued_metrics_update"]);

        let conn = registry.get(&id).expect("registered");
        assert_eq!(conn.subscriptions(), vec!["metrics"]);
        assert_eq!(registry.queue().len(), 2);
    }

    #[tokio::test]
    async fn test_truncated_replay_evicts() {
        let registry = registry();
        for i in 0..10 {
            registry
                .broadcaster()
                .enqueue(OutboundMessage::with_data("metrics_update", serde_json::json!({ "seq": i })));
        }

        let (handle, mut peer) = TransportHandle::pair(4);
        peer.open();
        let id = registry.admit(handle, &["metrics"]);

        assert_eq!(peer.drain().len(), 4);
        assert!(registry.get(&id).is_none());
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(peer.state(), TransportState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_timeout_evicts() {
        let registry = registry();
        let (handle, _peer) = TransportHandle::pair(4);
        let id = registry.admit(handle, &[]);
        assert_eq!(registry.connection_count(), 1);

        time::sleep(Duration::from_secs(11)).await;
        assert!(registry.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_ping_pong_and_subscriptions() {
        let registry = registry();
        let (id, mut peer) = open_connection(&registry, &["alerts"]);

        registry.route_inbound(&id, r#"{"type":"ping","timestamp":1}"#);
        assert_eq!(kinds(&mut peer), vec!["pong"]);
        registry.route_inbound(&id, r#"{"type":"ping","timestamp":1700000000000.5}"#);
        assert_eq!(kinds(&mut peer), vec!["pong"]);

        registry.route_inbound(&id, r#"{"type":"subscribe","subscriptions":["metrics","alerts",5]}"#);
        registry.route_inbound(&id, r#"{"type":"unsubscribe","subscriptions":["alerts"]}"#);
        let conn = registry.get(&id).expect("registered");
        assert_eq!(conn.subscriptions(), vec!["metrics"]);
    }

    #[tokio::test]
    async fn test_acknowledge_alert_fans_out() {
        let registry = registry();
        let mut acks = registry.acknowledgements();
        let (sender, mut sender_peer) = open_connection(&registry, &[]);
        let (_other, mut other_peer) = open_connection(&registry, &[]);

        registry.route_inbound(&sender, r#"{"type":"acknowledge_alert","alertId":"errorRate_critical"}"#);

        assert_eq!(kinds(&mut sender_peer), vec!["alert_acknowledged"]);
        let frame = other_peer.try_recv().expect("fan-out");
        let value: Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(value["data"]["alertId"], "errorRate_critical");
        assert_eq!(value["data"]["acknowledgedBy"], sender.as_str());

        let ack = acks.try_recv().expect("ack published");
        assert_eq!(ack.alert_id, "errorRate_critical");
        assert_eq!(ack.acknowledged_by, sender);
    }

    #[tokio::test]
    async fn test_bad_frames_are_dropped() {
        let registry = registry();
        let (id, mut peer) = open_connection(&registry, &[]);

        registry.route_inbound(&id, "not json");
        registry.route_inbound(&id, r#"{"type":"dance"}"#);
        registry.route_inbound(&id, r#"{"type":"subscribe","subscriptions":"metrics"}"#);
        registry.route_inbound(&id, r#"{"type":"acknowledge_alert","alertId":null}"#);

        assert!(peer.drain().is_empty());
        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.metrics().snapshot().protocol_errors, 4);
    }

    #[tokio::test]
    async fn test_send_to_queues_when_unreachable() {
        let registry = registry();
        let (id, mut peer) = open_connection(&registry, &[]);

        assert!(registry.send_to(&id, &OutboundMessage::new("system_health", None)));
        assert_eq!(kinds(&mut peer), vec!["system_health"]);

        let missing = ConnectionId::from("ws_0_missing");
        assert!(!registry.send_to(&missing, &OutboundMessage::new("system_health", None)));
        assert_eq!(registry.queue().len(), 1);
    }

    #[tokio::test]
    async fn test_evict_is_idempotent() {
        let registry = registry();
        let (id, peer) = open_connection(&registry, &[]);
        assert!(registry.evict(&id));
        assert!(!registry.evict(&id));
        assert_eq!(peer.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn test_stats_and_prune() {
        let registry = registry();
        let (_a, _pa) = open_connection(&registry, &["metrics"]);
        let (_b, pb) = open_connection(&registry, &["metrics", "alerts"]);
        pb.close();

        let stats = registry.connection_stats();
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.open_connections, 1);
        assert_eq!(stats.subscription_stats.get("metrics"), Some(&2));
        assert!(!stats.fallback_mode);

        assert_eq!(registry.prune_closed(), 1);
        assert_eq!(registry.stats().total_connections, 1);
        assert_eq!(registry.close_all(), 1);
        assert_eq!(registry.stats().total_connections, 0);
    }
}

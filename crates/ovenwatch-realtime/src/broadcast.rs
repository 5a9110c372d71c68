//! Filtered, time-budgeted fan-out of outbound messages.
//!
//! The returned count is advisory: it is the number of frames accepted by
//! open transports during this call. Connections that could not be reached
//! before the budget ran out are only logged.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use ovenwatch_core::lifecycle::Lifecycle;

use crate::connection::pool::ConnectionPool;
use crate::connection::{Connection, ConnectionId};
use crate::message::types::OutboundMessage;
use crate::metrics::RealtimeMetrics;
use crate::queue::MessageQueue;

/// Connection predicate for targeted broadcasts.
pub type ConnectionFilter<'a> = &'a (dyn Fn(&Connection) -> bool + Send + Sync);

/// Per-call broadcast flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOptions {
    /// Do not write the message to the replay queue when it cannot be
    /// delivered.
    pub skip_queue: bool,
    /// Deliver even while the core runs in fallback mode.
    pub priority: bool,
}

impl BroadcastOptions {
    /// Live-only message; never queued.
    pub fn skip_queue() -> Self {
        Self {
            skip_queue: true,
            priority: false,
        }
    }

    /// Delivered in fallback mode too.
    pub fn priority() -> Self {
        Self {
            skip_queue: false,
            priority: true,
        }
    }
}

/// Fan-out engine over the shared connection pool.
#[derive(Debug)]
pub struct BroadcastEngine {
    pool: Arc<ConnectionPool>,
    queue: Arc<MessageQueue>,
    lifecycle: Lifecycle,
    metrics: Arc<RealtimeMetrics>,
    budget: Duration,
}

impl BroadcastEngine {
    /// Creates an engine.
    pub fn new(
        pool: Arc<ConnectionPool>,
        queue: Arc<MessageQueue>,
        lifecycle: Lifecycle,
        metrics: Arc<RealtimeMetrics>,
        budget: Duration,
    ) -> Self {
        Self {
            pool,
            queue,
            lifecycle,
            metrics,
            budget,
        }
    }

    /// Sends `message` to every open connection accepted by `filter`.
    ///
    /// Never waits on the core: before initialization, in fallback mode
    /// without `priority`, or with no connections, the message goes to the
    /// replay queue (unless `skip_queue`) and 0 is returned.
    pub fn broadcast(
        &self,
        message: &OutboundMessage,
        filter: Option<ConnectionFilter<'_>>,
        options: BroadcastOptions,
    ) -> usize {
        let state = self.lifecycle.snapshot();
        if !state.is_initialized() {
            debug!(kind = %message.kind, "Broadcast before initialization, queued");
            self.defer(message, options);
            return 0;
        }
        if state.fallback_mode() && !options.priority {
            debug!(kind = %message.kind, "Broadcast in fallback mode, queued");
            self.defer(message, options);
            return 0;
        }
        if self.pool.connection_count() == 0 {
            self.defer(message, options);
            return 0;
        }

        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(kind = %message.kind, error = %e, "Failed to serialize broadcast");
                self.defer(message, options);
                return 0;
            }
        };

        let deadline = Instant::now() + self.budget;
        let targets = self.pool.all_connections();
        let mut sent = 0usize;
        let mut errors = 0usize;
        let mut failed: Vec<ConnectionId> = Vec::new();
        let mut stragglers = 0usize;

        for conn in &targets {
            if filter.is_some_and(|f| !f(conn)) {
                continue;
            }
            if Instant::now() >= deadline {
                stragglers += 1;
                continue;
            }
            match conn.send_frame(frame.clone()) {
                Ok(true) => sent += 1,
                Ok(false) => errors += 1,
                Err(e) => {
                    debug!(conn_id = %conn.id, error = %e, "Broadcast delivery failed");
                    errors += 1;
                    failed.push(conn.id.clone());
                }
            }
        }

        for id in &failed {
            if self.pool.evict(id).is_some() {
                self.metrics.connection_closed();
            }
        }

        self.metrics.sent(sent as u64);
        if errors > 0 {
            self.metrics.failed(errors as u64);
            warn!(kind = %message.kind, sent, errors, "Broadcast completed with errors");
        }
        if stragglers > 0 {
            warn!(
                kind = %message.kind,
                sent,
                stragglers,
                budget_ms = self.budget.as_millis() as u64,
                "Broadcast budget exhausted before every connection was reached"
            );
        }
        sent
    }

    /// Sends `message` to connections subscribed to `topic`.
    pub fn broadcast_to_subscribers(&self, message: &OutboundMessage, topic: &str) -> usize {
        self.broadcast_to_subscribers_with(message, topic, BroadcastOptions::default())
    }

    /// [`Self::broadcast_to_subscribers`] with explicit options.
    pub fn broadcast_to_subscribers_with(
        &self,
        message: &OutboundMessage,
        topic: &str,
        options: BroadcastOptions,
    ) -> usize {
        let filter = |conn: &Connection| conn.is_subscribed(topic);
        self.broadcast(message, Some(&filter), options)
    }

    /// Writes a message to the replay queue.
    pub fn enqueue(&self, message: OutboundMessage) {
        self.queue.enqueue(message);
        self.metrics.queued();
    }

    fn defer(&self, message: &OutboundMessage, options: BroadcastOptions) {
        if !options.skip_queue {
            self.enqueue(message.clone());
        }
    }
}

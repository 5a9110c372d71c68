//! Registry and broadcast counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Engine-level counters.
#[derive(Debug, Default)]
pub struct RealtimeMetrics {
    /// Connections admitted
    pub connections_opened: AtomicU64,
    /// Connections evicted
    pub connections_closed: AtomicU64,
    /// Frames handed to transports
    pub messages_sent: AtomicU64,
    /// Inbound frames received
    pub messages_received: AtomicU64,
    /// Inbound frames dropped as malformed or unknown
    pub protocol_errors: AtomicU64,
    /// Messages written to the replay queue
    pub messages_queued: AtomicU64,
    /// Failed deliveries
    pub delivery_failures: AtomicU64,
}

impl RealtimeMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an admission
    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an eviction
    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record sent frames
    pub fn sent(&self, count: u64) {
        self.messages_sent.fetch_add(count, Ordering::Relaxed);
    }

    /// Record an inbound frame
    pub fn received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped inbound frame
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a queue write
    pub fn queued(&self) {
        self.messages_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record failed deliveries
    pub fn failed(&self, count: u64) {
        self.delivery_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            messages_queued: self.messages_queued.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// Serializable counter snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Connections admitted
    pub connections_opened: u64,
    /// Connections evicted
    pub connections_closed: u64,
    /// Frames handed to transports
    pub messages_sent: u64,
    /// Inbound frames received
    pub messages_received: u64,
    /// Inbound frames dropped
    pub protocol_errors: u64,
    /// Messages written to the replay queue
    pub messages_queued: u64,
    /// Failed deliveries
    pub delivery_failures: u64,
}

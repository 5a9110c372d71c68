//! # ovenwatch-realtime
//!
//! Push-style status subscriber plumbing for the ovenwatch monitoring core:
//!
//! - Connection admission, eviction, and inbound routing
//! - Bounded replay queue of recent broadcasts
//! - Time-budgeted, filtered broadcast fan-out
//! - Heartbeat sweep of idle connections
//! - Engine counters

pub mod broadcast;
pub mod connection;
pub mod message;
pub mod metrics;
pub mod queue;

pub use broadcast::{BroadcastEngine, BroadcastOptions, ConnectionFilter};
pub use connection::pool::ConnectionPool;
pub use connection::registry::{
    AlertAcknowledgement, ConnectionRegistry, ConnectionStats, RegistryStats,
};
pub use connection::transport::{TransportHandle, TransportPeer, TransportState};
pub use connection::{Connection, ConnectionId};
pub use message::types::{InboundMessage, OutboundMessage};
pub use metrics::{MetricsSnapshot, RealtimeMetrics};
pub use queue::MessageQueue;

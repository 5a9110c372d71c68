//! Bounded backlog of recent broadcasts, replayed to new subscribers.

use std::collections::VecDeque;
use std::sync::Mutex;

use ovenwatch_core::AppResult;
use tracing::debug;

use crate::connection::Connection;
use crate::message::types::OutboundMessage;

/// FIFO ring buffer of outbound messages.
///
/// Pushing into a full queue evicts the oldest entry.
#[derive(Debug)]
pub struct MessageQueue {
    entries: Mutex<VecDeque<OutboundMessage>>,
    capacity: usize,
    replay_count: usize,
}

impl MessageQueue {
    /// Creates an empty queue.
    pub fn new(capacity: usize, replay_count: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            replay_count,
        }
    }

    /// Appends a message. Returns `true` if an older entry was evicted.
    pub fn enqueue(&self, message: OutboundMessage) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let evicted = if entries.len() >= self.capacity {
            entries.pop_front();
            true
        } else {
            false
        };
        entries.push_back(message);
        evicted
    }

    /// Current length.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum length.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The newest `n` entries, oldest first, re-tagged as queued backlog.
    pub fn recent(&self, n: usize) -> Vec<OutboundMessage> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).map(OutboundMessage::as_queued).collect()
    }

    /// Sends the backlog to one connection without mutating the queue.
    ///
    /// Returns the number of frames handed to the transport, stopping early
    /// if the transport is no longer open. A failed send aborts the replay
    /// with the error.
    pub fn replay(&self, connection: &Connection) -> AppResult<usize> {
        let backlog = self.recent(self.replay_count);
        let mut sent = 0;
        for message in &backlog {
            match connection.send(message) {
                Ok(true) => sent += 1,
                Ok(false) => break,
                Err(e) => {
                    debug!(conn_id = %connection.id, sent, error = %e, "Replay interrupted");
                    return Err(e);
                }
            }
        }
        Ok(sent)
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

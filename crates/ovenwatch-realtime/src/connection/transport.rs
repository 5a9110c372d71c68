//! Outbound half of a subscriber transport.
//!
//! A [`TransportHandle`] is what the registry owns: it can report the
//! transport state, push serialized frames, and close. The matching
//! [`TransportPeer`] is the socket side: the WebSocket glue (or a test)
//! opens it, drains frames from it, and closes it when the socket goes away.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use ovenwatch_core::error::AppError;
use ovenwatch_core::result::AppResult;

/// Transport lifecycle as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    /// Handshake not finished.
    Connecting,
    /// Frames can flow.
    Open,
    /// Terminal.
    Closed,
}

/// Registry-owned handle to one subscriber transport.
///
/// Not `Clone`: admission takes the handle by value, so a transport can be
/// owned by at most one registry entry.
#[derive(Debug)]
pub struct TransportHandle {
    frames: mpsc::Sender<String>,
    state: Arc<watch::Sender<TransportState>>,
}

/// Socket-side counterpart of a [`TransportHandle`].
#[derive(Debug)]
pub struct TransportPeer {
    frames: mpsc::Receiver<String>,
    state: Arc<watch::Sender<TransportState>>,
}

impl TransportHandle {
    /// Creates a connected handle/peer pair in `Connecting` state with an
    /// outbound buffer of `buffer` frames.
    pub fn pair(buffer: usize) -> (TransportHandle, TransportPeer) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (state, _) = watch::channel(TransportState::Connecting);
        let state = Arc::new(state);
        (
            TransportHandle {
                frames: tx,
                state: Arc::clone(&state),
            },
            TransportPeer { frames: rx, state },
        )
    }

    /// Current transport state.
    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    /// Whether frames can currently be sent.
    pub fn is_open(&self) -> bool {
        self.state() == TransportState::Open
    }

    /// Pushes one frame without waiting.
    ///
    /// A full buffer or a vanished peer is a transport error; a peer that
    /// went away also moves the handle to `Closed`.
    pub fn send(&self, frame: String) -> AppResult<()> {
        if !self.is_open() {
            return Err(AppError::transport("transport is not open"));
        }
        match self.frames.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(AppError::transport("outbound buffer full"))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close();
                Err(AppError::transport("peer dropped"))
            }
        }
    }

    /// Moves the transport to `Closed`. Idempotent.
    pub fn close(&self) {
        self.state.send_if_modified(|s| {
            if *s == TransportState::Closed {
                return false;
            }
            *s = TransportState::Closed;
            true
        });
    }

    /// Waits until the transport opens.
    ///
    /// Returns `false` if it closes first.
    pub async fn opened(&self) -> bool {
        let mut rx = self.state.subscribe();
        match rx
            .wait_for(|s| *s != TransportState::Connecting)
            .await
        {
            Ok(state) => *state == TransportState::Open,
            Err(_) => false,
        }
    }
}

impl TransportPeer {
    /// Completes the handshake. Has no effect once closed.
    pub fn open(&self) {
        self.state.send_if_modified(|s| {
            if *s != TransportState::Connecting {
                return false;
            }
            *s = TransportState::Open;
            true
        });
    }

    /// Closes the transport from the socket side. Idempotent.
    pub fn close(&self) {
        self.state.send_if_modified(|s| {
            if *s == TransportState::Closed {
                return false;
            }
            *s = TransportState::Closed;
            true
        });
    }

    /// Current transport state.
    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    /// Receives the next outbound frame.
    pub async fn recv(&mut self) -> Option<String> {
        self.frames.recv().await
    }

    /// Receives an already buffered frame, if any.
    pub fn try_recv(&mut self) -> Option<String> {
        self.frames.try_recv().ok()
    }

    /// Drains every buffered frame.
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            out.push(frame);
        }
        out
    }

    /// Watches state changes, e.g. to stop a writer loop on close.
    pub fn watch_state(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_requires_open() {
        let (handle, mut peer) = TransportHandle::pair(4);
        assert!(handle.send("early".into()).is_err());
        peer.open();
        handle.send("hello".into()).expect("send");
        assert_eq!(peer.try_recv().as_deref(), Some("hello"));
    }

    #[test]
    fn test_full_buffer_is_transport_error() {
        let (handle, peer) = TransportHandle::pair(1);
        peer.open();
        handle.send("one".into()).expect("first frame fits");
        let err = handle.send("two".into()).unwrap_err();
        assert_eq!(err.kind, ovenwatch_core::error::ErrorKind::Transport);
        assert!(handle.is_open());
    }

    #[test]
    fn test_dropped_peer_closes_handle() {
        let (handle, peer) = TransportHandle::pair(4);
        peer.open();
        drop(peer);
        assert!(handle.send("lost".into()).is_err());
        assert_eq!(handle.state(), TransportState::Closed);
    }

    #[test]
    fn test_open_after_close_is_ignored() {
        let (handle, peer) = TransportHandle::pair(4);
        handle.close();
        peer.open();
        assert_eq!(peer.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn test_opened_resolves_on_open_and_close() {
        let (handle, peer) = TransportHandle::pair(4);
        peer.open();
        assert!(handle.opened().await);

        let (handle, peer) = TransportHandle::pair(4);
        peer.close();
        assert!(!handle.opened().await);
    }
}

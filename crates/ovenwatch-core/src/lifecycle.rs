//! Initialization state machine shared by the orchestrator, the connection
//! registry, and the health reporter.
//!
//! ```text
//! uninitialized -> initializing -> { ready | fallback } -> reconnecting -> initializing
//! ```
//!
//! Every mutation goes through a guarded transition on a `watch` channel, so
//! timers and event handlers that fire while a boot is in flight observe a
//! consistent snapshot and cannot revert `is_initialized` on their own.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tokio::sync::watch;

/// Coarse lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing booted yet, or shut down.
    Uninitialized,
    /// Stage sequence in progress.
    Initializing,
    /// All stages came up cleanly.
    Ready,
    /// Up, but at least one stage degraded or the boot timed out.
    Fallback,
    /// Explicit reset in progress; re-enters `Initializing`.
    Reconnecting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initializing => write!(f, "initializing"),
            Self::Ready => write!(f, "ready"),
            Self::Fallback => write!(f, "fallback"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Boot stage identifiers, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Alert threshold profile.
    AlertThresholds,
    /// Subscriber transport.
    Transport,
    /// Metrics/alerts feed.
    Feed,
    /// Search-monitoring hook.
    SearchHook,
    /// Boot self-test.
    SelfTest,
    /// Periodic cleanup.
    Cleanup,
    /// Process-wide error traps.
    ErrorTraps,
    /// The boot sequence as a whole.
    Boot,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AlertThresholds => "alert_thresholds",
            Self::Transport => "transport",
            Self::Feed => "feed",
            Self::SearchHook => "search_hook",
            Self::SelfTest => "self_test",
            Self::Cleanup => "cleanup",
            Self::ErrorTraps => "error_traps",
            Self::Boot => "boot",
        };
        f.write_str(name)
    }
}

/// Snapshot of the initialization state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitializationState {
    /// Current phase.
    pub phase: Phase,
    /// Last recorded error.
    pub error: Option<String>,
    /// Background transport reconnection attempts made so far.
    pub reconnect_attempts: u32,
    /// Transport endpoint retained for retries.
    pub endpoint: String,
    /// Stages that did not come up cleanly.
    pub degraded: BTreeSet<Stage>,
}

impl InitializationState {
    fn new(endpoint: String) -> Self {
        Self {
            phase: Phase::Uninitialized,
            error: None,
            reconnect_attempts: 0,
            endpoint,
            degraded: BTreeSet::new(),
        }
    }

    /// Degraded still counts as up.
    pub fn is_initialized(&self) -> bool {
        matches!(self.phase, Phase::Ready | Phase::Fallback)
    }

    /// Whether the core runs with reduced capability.
    pub fn fallback_mode(&self) -> bool {
        self.phase == Phase::Fallback
    }
}

/// Shared handle over the state machine.
///
/// Cloning is cheap; all clones observe the same state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: watch::Sender<InitializationState>,
}

impl Lifecycle {
    /// Creates a state machine in `Uninitialized`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let (tx, _) = watch::channel(InitializationState::new(endpoint.into()));
        Self { tx }
    }

    /// Returns a snapshot of the current state.
    pub fn snapshot(&self) -> InitializationState {
        self.tx.borrow().clone()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.tx.borrow().phase
    }

    /// See [`InitializationState::is_initialized`].
    pub fn is_initialized(&self) -> bool {
        self.tx.borrow().is_initialized()
    }

    /// See [`InitializationState::fallback_mode`].
    pub fn fallback_mode(&self) -> bool {
        self.tx.borrow().fallback_mode()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<InitializationState> {
        self.tx.subscribe()
    }

    /// `uninitialized | reconnecting -> initializing`.
    ///
    /// Returns `false` when a boot is already running or completed.
    pub fn begin_initializing(&self) -> bool {
        self.tx.send_if_modified(|state| match state.phase {
            Phase::Uninitialized | Phase::Reconnecting => {
                state.phase = Phase::Initializing;
                true
            }
            _ => false,
        })
    }

    /// Records a stage that did not come up cleanly.
    ///
    /// Accepted while initializing and after completion (late side effects
    /// of abandoned stages); a completed `ready` drops to `fallback`.
    /// Ignored once shut down.
    pub fn mark_degraded(&self, stage: Stage, error: impl Into<String>) -> bool {
        let error = error.into();
        self.tx.send_if_modified(|state| match state.phase {
            Phase::Initializing | Phase::Ready | Phase::Fallback => {
                state.degraded.insert(stage);
                state.error = Some(error);
                if state.phase == Phase::Ready {
                    state.phase = Phase::Fallback;
                }
                true
            }
            _ => false,
        })
    }

    /// `initializing -> ready | fallback`, depending on degraded stages.
    ///
    /// Returns `false` if the boot was already settled (e.g. by the global
    /// timeout).
    pub fn complete(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if state.phase != Phase::Initializing {
                return false;
            }
            state.phase = if state.degraded.is_empty() {
                Phase::Ready
            } else {
                Phase::Fallback
            };
            true
        })
    }

    /// `initializing -> fallback` with the given error, used when the global
    /// ceiling fires.
    pub fn force_fallback(&self, error: impl Into<String>) -> bool {
        let error = error.into();
        self.tx.send_if_modified(|state| {
            if state.phase != Phase::Initializing {
                return false;
            }
            state.degraded.insert(Stage::Boot);
            state.error = Some(error);
            state.phase = Phase::Fallback;
            true
        })
    }

    /// Claims one background reconnection attempt.
    ///
    /// Returns the attempt number, or `None` when the bound is reached, the
    /// transport is no longer degraded, or the core was shut down.
    pub fn claim_reconnect_attempt(&self, max_attempts: u32) -> Option<u32> {
        let mut claimed = None;
        self.tx.send_if_modified(|state| {
            let live = matches!(
                state.phase,
                Phase::Initializing | Phase::Ready | Phase::Fallback
            );
            if !live
                || !state.degraded.contains(&Stage::Transport)
                || state.reconnect_attempts >= max_attempts
            {
                return false;
            }
            state.reconnect_attempts += 1;
            claimed = Some(state.reconnect_attempts);
            true
        });
        claimed
    }

    /// Clears the transport degradation after a successful reconnection.
    pub fn transport_recovered(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if !state.degraded.remove(&Stage::Transport) {
                return false;
            }
            state.reconnect_attempts = 0;
            if state.degraded.is_empty() {
                state.error = None;
                if state.phase == Phase::Fallback {
                    state.phase = Phase::Ready;
                }
            }
            true
        })
    }

    /// `ready | fallback -> reconnecting`, clearing error and degradations.
    pub fn begin_reconnect(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if !state.is_initialized() {
                return false;
            }
            state.phase = Phase::Reconnecting;
            state.error = None;
            state.degraded.clear();
            state.reconnect_attempts = 0;
            true
        })
    }

    /// Any phase -> `uninitialized`, clearing error, degradations and the
    /// reconnect budget. Returns `false` if already there.
    pub fn reset(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if state.phase == Phase::Uninitialized {
                return false;
            }
            state.phase = Phase::Uninitialized;
            state.error = None;
            state.degraded.clear();
            state.reconnect_attempts = 0;
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_boot_reaches_ready() {
        let lc = Lifecycle::new("ws://localhost:8080");
        assert!(!lc.is_initialized());
        assert!(lc.begin_initializing());
        assert!(!lc.begin_initializing());
        assert!(lc.complete());
        assert_eq!(lc.phase(), Phase::Ready);
        assert!(lc.is_initialized());
        assert!(!lc.fallback_mode());
    }

    #[test]
    fn test_degraded_stage_ends_in_fallback() {
        let lc = Lifecycle::new("ws://localhost:8080");
        lc.begin_initializing();
        lc.mark_degraded(Stage::SearchHook, "hook timed out");
        lc.complete();
        let state = lc.snapshot();
        assert!(state.fallback_mode());
        assert!(state.is_initialized());
        assert_eq!(state.error.as_deref(), Some("hook timed out"));
    }

    #[test]
    fn test_timeout_wins_over_late_completion() {
        let lc = Lifecycle::new("ws://localhost:8080");
        lc.begin_initializing();
        assert!(lc.force_fallback("boot exceeded 2000ms"));
        assert!(!lc.complete());
        assert_eq!(lc.phase(), Phase::Fallback);
        assert!(lc.snapshot().degraded.contains(&Stage::Boot));
    }

    #[test]
    fn test_late_degradation_after_ready() {
        let lc = Lifecycle::new("ws://localhost:8080");
        lc.begin_initializing();
        lc.complete();
        assert!(lc.mark_degraded(Stage::Transport, "listener closed"));
        assert_eq!(lc.phase(), Phase::Fallback);
    }

    #[test]
    fn test_reconnect_attempts_are_bounded() {
        let lc = Lifecycle::new("ws://localhost:8080");
        lc.begin_initializing();
        assert_eq!(lc.claim_reconnect_attempt(3), None);
        lc.mark_degraded(Stage::Transport, "bind failed");
        assert_eq!(lc.claim_reconnect_attempt(3), Some(1));
        assert_eq!(lc.claim_reconnect_attempt(3), Some(2));
        assert_eq!(lc.claim_reconnect_attempt(3), Some(3));
        assert_eq!(lc.claim_reconnect_attempt(3), None);
        assert_eq!(lc.snapshot().reconnect_attempts, 3);
    }

    #[test]
    fn test_transport_recovery_restores_ready() {
        let lc = Lifecycle::new("ws://localhost:8080");
        lc.begin_initializing();
        lc.mark_degraded(Stage::Transport, "bind failed");
        lc.complete();
        lc.claim_reconnect_attempt(3);
        assert!(lc.transport_recovered());
        let state = lc.snapshot();
        assert_eq!(state.phase, Phase::Ready);
        assert_eq!(state.reconnect_attempts, 0);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_transport_recovery_keeps_other_degradations() {
        let lc = Lifecycle::new("ws://localhost:8080");
        lc.begin_initializing();
        lc.mark_degraded(Stage::Transport, "bind failed");
        lc.mark_degraded(Stage::SearchHook, "hook failed");
        lc.complete();
        lc.transport_recovered();
        assert_eq!(lc.phase(), Phase::Fallback);
    }

    #[test]
    fn test_reconnect_only_from_initialized() {
        let lc = Lifecycle::new("ws://localhost:8080");
        assert!(!lc.begin_reconnect());
        lc.begin_initializing();
        lc.mark_degraded(Stage::Transport, "bind failed");
        lc.complete();
        assert!(lc.begin_reconnect());
        let state = lc.snapshot();
        assert_eq!(state.phase, Phase::Reconnecting);
        assert!(!state.is_initialized());
        assert!(state.degraded.is_empty());
        assert!(lc.begin_initializing());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let lc = Lifecycle::new("ws://localhost:8080");
        assert!(!lc.reset());
        lc.begin_initializing();
        lc.complete();
        assert!(lc.reset());
        assert!(!lc.reset());
        assert!(!lc.mark_degraded(Stage::Feed, "late"));
    }

    #[test]
    fn test_reset_clears_previous_boot() {
        let lc = Lifecycle::new("ws://localhost:8080");
        lc.begin_initializing();
        lc.mark_degraded(Stage::Transport, "bind failed");
        lc.complete();
        for _ in 0..3 {
            lc.claim_reconnect_attempt(3);
        }
        assert!(lc.reset());

        let state = lc.snapshot();
        assert!(state.error.is_none());
        assert_eq!(state.reconnect_attempts, 0);
        assert!(state.degraded.is_empty());

        lc.begin_initializing();
        lc.mark_degraded(Stage::Transport, "bind failed");
        assert_eq!(lc.claim_reconnect_attempt(3), Some(1));
    }
}

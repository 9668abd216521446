//! Connection lifecycle states.
//!
//! ```text
//!            connect()                 login ok (CAS)
//!   Off ──────────────→ Initializing ──────────────→ Running
//!    ↑                      │ setup failed              │ link lost / collision
//!    │                      ↓                           ↓
//!    │ ←──── tick() ───── Joining ←─────────────────────┘
//!    │
//!    └──────────────────── Stopping ←── disconnect()
//! ```
//!
//! `Joining` is transient: the next tick tears the connection down, moves
//! to `Off` and, if the client should still be running, starts again.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connection and no worker.
    Off = 0,
    /// The worker is connecting and logging in.
    Initializing = 1,
    /// Logged in; the worker is receiving.
    Running = 2,
    /// `disconnect()` is tearing the connection down.
    Stopping = 3,
    /// The connection failed or dropped; waiting for the next tick.
    Joining = 4,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Initializing,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Joining,
            _ => Self::Off,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Joining => "joining",
        };
        f.write_str(name)
    }
}

/// A [`ConnectionState`] shared between the owning thread and the worker.
#[derive(Debug)]
pub(crate) struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves `from → to` only if the current state is still `from`.
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_from_expected_state_succeeds() {
        let state = AtomicConnectionState::new(ConnectionState::Initializing);
        assert!(state.transition(ConnectionState::Initializing, ConnectionState::Running));
        assert_eq!(state.load(), ConnectionState::Running);
    }

    #[test]
    fn test_transition_after_concurrent_stop_fails() {
        let state = AtomicConnectionState::new(ConnectionState::Initializing);
        state.store(ConnectionState::Stopping);

        assert!(!state.transition(ConnectionState::Initializing, ConnectionState::Running));
        assert_eq!(state.load(), ConnectionState::Stopping);
    }

    #[test]
    fn test_every_state_survives_the_atomic_cell() {
        let cell = AtomicConnectionState::new(ConnectionState::Off);
        for state in [
            ConnectionState::Off,
            ConnectionState::Initializing,
            ConnectionState::Running,
            ConnectionState::Stopping,
            ConnectionState::Joining,
        ] {
            cell.store(state);
            assert_eq!(cell.load(), state);
        }
    }

    #[test]
    fn test_display_is_lowercase_name() {
        assert_eq!(ConnectionState::Initializing.to_string(), "initializing");
        assert_eq!(ConnectionState::Joining.to_string(), "joining");
    }
}

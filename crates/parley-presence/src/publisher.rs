//! Locally shared game state and its heartbeat emission.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use parley_protocol::{PeerId, SignalMessage};
use serde::{Deserialize, Serialize};

use crate::registry::UNKNOWN_PARTY_SIZE;
use crate::timer::IntervalTimer;

/// How often the local state is broadcast.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// The small state snapshot this instance shares with its peers.
///
/// Always read and written as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedGameState {
    /// Current party size.
    pub party_size: i32,
    /// Whether the local player is in a game.
    pub is_in_game: bool,
}

impl Default for SharedGameState {
    fn default() -> Self {
        Self {
            party_size: UNKNOWN_PARTY_SIZE,
            is_in_game: false,
        }
    }
}

/// Holds [`SharedGameState`] and decides when a heartbeat is due.
///
/// The state and the "last fired" timer sit behind separate locks; no
/// method holds both at once.
#[derive(Debug)]
pub struct GameStatePublisher {
    state: Mutex<SharedGameState>,
    timer: Mutex<IntervalTimer>,
}

impl GameStatePublisher {
    /// Creates a publisher that emits at most once per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            state: Mutex::new(SharedGameState::default()),
            timer: Mutex::new(IntervalTimer::new(interval)),
        }
    }

    /// Replaces the shared state.
    pub fn set(&self, state: SharedGameState) {
        *self.state.lock() = state;
    }

    /// A copy of the shared state.
    pub fn get(&self) -> SharedGameState {
        *self.state.lock()
    }

    /// Returns the heartbeat to send if the interval has elapsed at `now`.
    ///
    /// The caller only polls while control mode is active, so the timer
    /// is not consumed while there is nobody to tell.
    pub fn poll(&self, local: PeerId, now: Instant) -> Option<SignalMessage> {
        if !self.timer.lock().test_and_set(now) {
            return None;
        }
        let state = self.get();
        Some(SignalMessage::Heartbeat {
            id: local,
            party_size: state.party_size,
        })
    }

    /// Changes how often heartbeats are emitted.
    pub fn set_interval(&self, interval: Duration) {
        self.timer.lock().set_interval(interval);
    }

    /// Makes the next poll fire immediately (used on a new connection).
    pub fn reset_timer(&self) {
        self.timer.lock().reset();
    }
}

impl Default for GameStatePublisher {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL)
    }
}

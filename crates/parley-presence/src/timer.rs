//! Per-instance interval timer.
//!
//! Heartbeat emission and re-auth answers are rate limited. Each owner
//! keeps its own `IntervalTimer`, so two clients in one process never
//! share a "last fired" instant.

use std::time::{Duration, Instant};

/// Fires at most once per `interval`.
///
/// Time is passed in explicitly so callers (and tests) control the clock.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    interval: Duration,
    last_fired: Option<Instant>,
}

impl IntervalTimer {
    /// Creates a timer that fires on its first check.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    /// Returns `true` and records `now` if at least `interval` has passed
    /// since the last time this returned `true` (or if it never has).
    pub fn test_and_set(&mut self, now: Instant) -> bool {
        match self.last_fired {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }

    /// Forgets the last firing, so the next check fires.
    pub fn reset(&mut self) {
        self.last_fired = None;
    }

    /// Changes the interval; the last firing is kept.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }
}

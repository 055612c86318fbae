//! Deadline timers.
//!
//! Timers here are plain deadlines owned by the state machine that arms
//! them. Nothing fires on its own: the owner reports the current time and
//! asks which timers have expired. Arming a timer replaces its previous
//! deadline, so a stale deadline can never fire after a state change.

use std::time::{Duration, Instant};

/// A single cancellable deadline.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    /// Create a disarmed timer.
    pub fn new() -> Self {
        Self { deadline: None }
    }

    /// Arm the timer to fire `after` from `now`, replacing any previous deadline.
    pub fn arm(&mut self, now: Instant, after: Duration) {
        self.deadline = Some(now + after);
    }

    /// Disarm the timer.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Current deadline, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check if the timer is armed.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarm and return `true` if the deadline has passed.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Earliest deadline among `timers`.
pub fn earliest<'a>(timers: impl IntoIterator<Item = &'a Timer>) -> Option<Instant> {
    timers.into_iter().filter_map(Timer::deadline).min()
}

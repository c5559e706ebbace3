//! Trailing-edge debounce with a fixed window measured from the first
//! trigger. At most one deadline is pending at a time.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Scheduled { deadline: Instant },
}

#[derive(Debug, Clone)]
pub struct Debounce {
    window: Duration,
    state: DebounceState,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: DebounceState::Idle,
        }
    }

    /// Start a window at `now` unless one is already pending.
    ///
    /// Returns true if this call opened the window.
    pub fn schedule(&mut self, now: Instant) -> bool {
        match self.state {
            DebounceState::Idle => {
                self.state = DebounceState::Scheduled {
                    deadline: now + self.window,
                };
                true
            }
            DebounceState::Scheduled { .. } => false,
        }
    }

    /// Close the window if its deadline has passed.
    ///
    /// Returns true exactly once per window; the caller runs the debounced
    /// action on true.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.state {
            DebounceState::Scheduled { deadline } if now >= deadline => {
                self.state = DebounceState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Drop a pending window. Returns true if one was pending.
    pub fn cancel(&mut self) -> bool {
        let pending = self.is_pending();
        self.state = DebounceState::Idle;
        pending
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Scheduled { deadline } => Some(deadline),
            DebounceState::Idle => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, DebounceState::Scheduled { .. })
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

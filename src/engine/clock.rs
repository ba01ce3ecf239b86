//! Round countdown clock.
//!
//! A plain state machine driven by the host's periodic tick. Each tick
//! removes one fixed step from the remaining time; the transition to zero
//! reports `Expired` exactly once. A zero-length countdown expires on its
//! first tick. The step is not corrected against wall time, so a late tick
//! lengthens the round slightly.

use std::time::Duration;

/// Default decrement per tick, paired with a 100ms tick interval.
pub const DEFAULT_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Idle,
    Running,
    Expired,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Still running with this much left.
    Ticked(Duration),
    /// Reached zero on this tick.
    Expired,
    /// Clock not running; nothing changed.
    Inactive,
}

#[derive(Debug, Clone)]
pub struct RoundClock {
    state: ClockState,
    remaining: Duration,
    step: Duration,
}

impl Default for RoundClock {
    fn default() -> Self {
        Self::new(DEFAULT_STEP)
    }
}

impl RoundClock {
    pub fn new(step: Duration) -> Self {
        Self {
            state: ClockState::Idle,
            remaining: Duration::ZERO,
            step,
        }
    }

    /// Start (or restart) the countdown from `duration`.
    ///
    /// The clock always enters `Running`, so expiry is reported by a tick
    /// even when `duration` is zero.
    pub fn start(&mut self, duration: Duration) {
        self.remaining = duration;
        self.state = ClockState::Running;
    }

    pub fn tick(&mut self) -> ClockEvent {
        if self.state != ClockState::Running {
            return ClockEvent::Inactive;
        }

        self.remaining = self.remaining.saturating_sub(self.step);
        if self.remaining.is_zero() {
            self.state = ClockState::Expired;
            ClockEvent::Expired
        } else {
            ClockEvent::Ticked(self.remaining)
        }
    }

    /// Stop without firing expiry.
    pub fn cancel(&mut self) {
        self.state = ClockState::Idle;
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn step(&self) -> Duration {
        self.step
    }
}

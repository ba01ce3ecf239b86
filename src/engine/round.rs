//! Round state machine.
//!
//! Owns the current `Round` and its countdown. Every asynchronous result
//! (start value, live refresh, final value) is applied together with the
//! `RoundTicket` handed out by `begin_round`; a ticket from a superseded
//! round is rejected so a late fetch can never touch the current round.
//!
//! Collecting → (clock expiry) → Resolving → (final value) → Finished

use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::clock::{ClockEvent, RoundClock};
use crate::types::{guess_wins, is_usable_price, Direction, FetchOutcome, Phase, Round, RoundOutcome};

/// Timing for a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundConfig {
    pub duration: Duration,
    /// Clock step and tick period.
    pub tick_interval: Duration,
    /// Period of the display-only live price refresh.
    pub live_refresh_interval: Duration,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
            tick_interval: Duration::from_millis(100),
            live_refresh_interval: Duration::from_secs(1),
        }
    }
}

/// Identifies the round an asynchronous result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundTicket(u64);

impl RoundTicket {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct RoundStateMachine {
    generation: u64,
    round: Option<Round>,
    clock: RoundClock,
    /// Carried across rounds as the fetcher's fallback input.
    last_known: Option<f64>,
    start_degraded: bool,
}

impl RoundStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any current round with a fresh one and start its clock.
    ///
    /// Results still in flight for the previous round become stale.
    pub fn begin_round(&mut self, config: &RoundConfig) -> RoundTicket {
        self.generation += 1;
        self.clock = RoundClock::new(config.tick_interval);
        self.clock.start(config.duration);
        self.round = Some(Round::new(config.duration, self.last_known));
        self.start_degraded = false;

        info!(
            round = self.generation,
            duration_ms = config.duration.as_millis() as u64,
            "Round started"
        );
        RoundTicket(self.generation)
    }

    /// Drop the current round without resolving it.
    pub fn abandon(&mut self) {
        self.clock.cancel();
        self.round = None;
        self.generation += 1;
    }

    pub fn is_current(&self, ticket: RoundTicket) -> bool {
        ticket.0 == self.generation && self.round.is_some()
    }

    pub fn current_ticket(&self) -> Option<RoundTicket> {
        self.round.as_ref().map(|_| RoundTicket(self.generation))
    }

    pub fn round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    pub fn phase(&self) -> Option<Phase> {
        self.round.as_ref().map(|r| r.phase)
    }

    pub fn last_known(&self) -> Option<f64> {
        self.last_known
    }

    pub fn start_value(&self) -> Option<f64> {
        self.round.as_ref().and_then(|r| r.start_value)
    }

    /// Record the round's start value. Returns false for a stale ticket.
    pub fn apply_start_value(&mut self, ticket: RoundTicket, fetched: &FetchOutcome) -> bool {
        if !self.accepts(ticket, "start value") {
            return false;
        }
        self.remember(fetched);
        if let Some(round) = self.round.as_mut() {
            round.start_value = Some(fetched.value);
            round.last_known_value = Some(fetched.value);
        }
        self.start_degraded = fetched.degraded;
        true
    }

    /// Update the display value. Has no bearing on the outcome.
    pub fn apply_live_value(&mut self, ticket: RoundTicket, fetched: &FetchOutcome) -> bool {
        if !self.accepts(ticket, "live value") {
            return false;
        }
        self.remember(fetched);
        if let Some(round) = self.round.as_mut() {
            round.last_known_value = Some(fetched.value);
        }
        true
    }

    /// Record the player's guess. Only the first guess of a collecting
    /// round counts; anything else is a no-op returning false.
    pub fn submit_guess(&mut self, direction: Direction) -> bool {
        let Some(round) = self.round.as_mut() else {
            debug!(%direction, "Guess ignored: no active round");
            return false;
        };
        if round.phase != Phase::Collecting {
            debug!(%direction, phase = %round.phase, "Guess ignored: round not collecting");
            return false;
        }
        if let Some(existing) = round.guess {
            debug!(%direction, %existing, "Guess ignored: already recorded");
            return false;
        }
        round.guess = Some(direction);
        info!(round = self.generation, %direction, "Guess recorded");
        true
    }

    /// Parse and record a raw input such as `"higher"`. Unrecognised input
    /// is ignored.
    pub fn submit_input(&mut self, input: &str) -> bool {
        match input.parse::<Direction>() {
            Ok(direction) => self.submit_guess(direction),
            Err(e) => {
                debug!(input, error = %e, "Guess input rejected");
                false
            }
        }
    }

    /// Advance the clock by one step. On expiry the round moves to
    /// `Resolving` and `ClockEvent::Expired` is returned exactly once.
    pub fn tick(&mut self) -> ClockEvent {
        let Some(round) = self.round.as_mut() else {
            return ClockEvent::Inactive;
        };
        if round.phase != Phase::Collecting {
            return ClockEvent::Inactive;
        }

        let event = self.clock.tick();
        round.remaining = self.clock.remaining();
        if event == ClockEvent::Expired {
            round.phase = Phase::Resolving;
            debug!(round = self.generation, "Round clock expired");
        }
        event
    }

    /// Compute the outcome against the final value and finish the round.
    ///
    /// Returns `None` for a stale ticket or a round that is not resolving.
    /// A round that never received a start value is compared against the
    /// final value itself, so it resolves flat and the outcome is marked
    /// `degraded`.
    pub fn resolve(&mut self, ticket: RoundTicket, fetched: &FetchOutcome) -> Option<RoundOutcome> {
        if !self.accepts(ticket, "final value") {
            return None;
        }
        self.remember(fetched);
        let generation = self.generation;
        let start_degraded = self.start_degraded;
        let round = self.round.as_mut()?;

        if round.phase != Phase::Resolving {
            warn!(round = generation, phase = %round.phase, "Final value ignored: round not resolving");
            return None;
        }

        let final_value = fetched.value;
        let (start_value, start_missing) = match round.start_value {
            Some(v) => (v, false),
            None => {
                warn!(round = generation, "No start value captured, comparing against final value");
                (final_value, true)
            }
        };

        let outcome = RoundOutcome {
            won: guess_wins(round.guess, start_value, final_value),
            guess_made: round.guess.is_some(),
            guess: round.guess,
            start_value,
            final_value,
            degraded: start_degraded || start_missing || fetched.degraded,
            resolved_at: Utc::now(),
        };

        round.last_known_value = Some(final_value);
        round.phase = Phase::Finished;

        info!(
            round = generation,
            won = outcome.won,
            guess_made = outcome.guess_made,
            start = start_value,
            final_value,
            degraded = outcome.degraded,
            "Round resolved"
        );
        Some(outcome)
    }

    fn accepts(&self, ticket: RoundTicket, what: &str) -> bool {
        if self.is_current(ticket) {
            return true;
        }
        debug!(
            ticket = ticket.0,
            current = self.generation,
            what,
            "Discarding stale result"
        );
        false
    }

    /// Only live values replace the last known price.
    fn remember(&mut self, fetched: &FetchOutcome) {
        if !fetched.degraded && is_usable_price(fetched.value) {
            self.last_known = Some(fetched.value);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

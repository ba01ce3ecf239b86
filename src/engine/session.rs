//! Game session driver.
//!
//! Runs rounds on the tokio timeline: a tick interval drives the round
//! clock, a second interval refreshes the live price, and fetch results
//! come back over a channel tagged with the round ticket. Between rounds
//! the session policy applies: a win extends the streak and schedules the
//! next round, a loss or a missed guess ends the session.
//!
//! At most one fetch sequence runs at a time. A live refresh that comes
//! due while another fetch is still running is skipped.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::clock::ClockEvent;
use super::fetcher::ResilientFetcher;
use super::round::{RoundConfig, RoundStateMachine, RoundTicket};
use crate::storage::HighScoreStore;
use crate::types::{Direction, FetchOutcome, RoundOutcome};

// ---------------------------------------------------------------------------
// Configuration and events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Pause before the next round after a win.
    pub win_delay: Duration,
    /// Pause before returning to the menu after a loss.
    pub loss_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            win_delay: Duration::from_millis(1500),
            loss_delay: Duration::from_millis(3000),
        }
    }
}

/// Updates pushed to the front end.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    RoundStarted { round: u64 },
    StartValue { value: f64, degraded: bool },
    LiveValue { value: f64, degraded: bool },
    Remaining(Duration),
    GuessAccepted(Direction),
    Resolving,
    Outcome { outcome: RoundOutcome, status: String },
    StreakChanged { streak: u32 },
    NewHighScore { score: u32 },
    SessionOver(SessionSummary),
}

/// What the session does after a resolved round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    NextRound(Duration),
    ReturnToMenu(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub rounds_played: u32,
    pub best_streak: u32,
    pub high_score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchPurpose {
    Start,
    Live,
}

struct FetchReport {
    ticket: RoundTicket,
    purpose: FetchPurpose,
    outcome: FetchOutcome,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    id: Uuid,
    machine: RoundStateMachine,
    fetcher: Arc<ResilientFetcher>,
    round_config: RoundConfig,
    config: SessionConfig,
    store: Box<dyn HighScoreStore>,
    events: mpsc::UnboundedSender<GameEvent>,
    streak: u32,
    best_streak: u32,
    high_score: u32,
    rounds_played: u32,
}

impl Session {
    /// Create a session, reading the persisted high score. A store that
    /// cannot be read counts as a high score of zero.
    pub fn new(
        fetcher: Arc<ResilientFetcher>,
        round_config: RoundConfig,
        config: SessionConfig,
        store: Box<dyn HighScoreStore>,
        events: mpsc::UnboundedSender<GameEvent>,
    ) -> Self {
        let high_score = store.high_score().unwrap_or_else(|e| {
            error!(error = %e, "Failed to read high score, starting from 0");
            0
        });

        Self {
            id: Uuid::new_v4(),
            machine: RoundStateMachine::new(),
            fetcher,
            round_config,
            config,
            store,
            events,
            streak: 0,
            best_streak: 0,
            high_score,
            rounds_played: 0,
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn high_score(&self) -> u32 {
        self.high_score
    }

    pub fn machine(&self) -> &RoundStateMachine {
        &self.machine
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            rounds_played: self.rounds_played,
            best_streak: self.best_streak,
            high_score: self.high_score,
        }
    }

    /// Play rounds until one is lost, then hand control back to the menu.
    pub async fn run(&mut self, guesses: &mut mpsc::Receiver<Direction>) -> Result<SessionSummary> {
        self.id = Uuid::new_v4();
        self.streak = 0;
        self.best_streak = 0;
        self.rounds_played = 0;
        self.emit(GameEvent::StreakChanged { streak: 0 });
        info!(session = %self.id, high_score = self.high_score, "Session started");

        loop {
            let outcome = self.play_round(guesses).await?;
            match self.record_outcome(&outcome) {
                NextStep::NextRound(delay) => time::sleep(delay).await,
                NextStep::ReturnToMenu(delay) => {
                    time::sleep(delay).await;
                    break;
                }
            }
        }

        let summary = self.summary();
        info!(
            session = %summary.session_id,
            rounds = summary.rounds_played,
            best_streak = summary.best_streak,
            high_score = summary.high_score,
            "Session over"
        );
        self.emit(GameEvent::SessionOver(summary.clone()));
        Ok(summary)
    }

    /// Play one round to resolution.
    ///
    /// The clock starts immediately; it does not wait for the start value.
    /// Guesses queued before the round began are discarded.
    pub async fn play_round(&mut self, guesses: &mut mpsc::Receiver<Direction>) -> Result<RoundOutcome> {
        while guesses.try_recv().is_ok() {}

        let ticket = self.machine.begin_round(&self.round_config);
        self.rounds_played += 1;
        self.emit(GameEvent::RoundStarted { round: ticket.generation() });
        self.emit(GameEvent::Remaining(self.round_config.duration));

        let (tx, mut rx) = mpsc::channel::<FetchReport>(4);
        let mut in_flight: Option<JoinHandle<()>> =
            Some(self.spawn_fetch(ticket, FetchPurpose::Start, tx.clone()));
        let mut start_pending = true;

        let mut ticker = interval_after(self.round_config.tick_interval);
        let mut refresher = interval_after(self.round_config.live_refresh_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.machine.tick() {
                    ClockEvent::Ticked(remaining) => self.emit(GameEvent::Remaining(remaining)),
                    ClockEvent::Expired => {
                        self.emit(GameEvent::Remaining(Duration::ZERO));
                        break;
                    }
                    ClockEvent::Inactive => break,
                },
                _ = refresher.tick() => {
                    if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
                        debug!("Live refresh skipped, fetch already in flight");
                    } else {
                        in_flight = Some(self.spawn_fetch(ticket, FetchPurpose::Live, tx.clone()));
                    }
                }
                Some(report) = rx.recv() => {
                    if self.apply_report(report) == Some(FetchPurpose::Start) {
                        start_pending = false;
                    }
                }
                Some(direction) = guesses.recv() => {
                    if self.machine.submit_guess(direction) {
                        self.emit(GameEvent::GuessAccepted(direction));
                    }
                }
            }
        }

        self.emit(GameEvent::Resolving);

        // The live refresh is torn down; a missing start value is waited for.
        drop(tx);
        if start_pending {
            debug!("Waiting for start value before resolving");
            while let Some(report) = rx.recv().await {
                if self.apply_report(report) == Some(FetchPurpose::Start) {
                    break;
                }
            }
        }
        if let Some(handle) = in_flight.take() {
            handle.abort();
        }

        let final_fetch = self.fetcher.fetch(self.machine.last_known()).await;
        self.machine
            .resolve(ticket, &final_fetch)
            .ok_or_else(|| anyhow!("round {} could not be resolved", ticket.generation()))
    }

    /// Apply the streak and high-score policy to a resolved round.
    pub fn record_outcome(&mut self, outcome: &RoundOutcome) -> NextStep {
        if outcome.won {
            self.streak += 1;
            self.best_streak = self.best_streak.max(self.streak);
            if self.streak > self.high_score {
                self.high_score = self.streak;
                if let Err(e) = self.store.set_high_score(self.high_score) {
                    error!(error = %e, score = self.high_score, "Failed to save high score");
                }
                self.emit(GameEvent::NewHighScore { score: self.high_score });
            }
        } else {
            self.streak = 0;
        }

        self.emit(GameEvent::Outcome {
            outcome: outcome.clone(),
            status: outcome.status_line(self.streak),
        });
        self.emit(GameEvent::StreakChanged { streak: self.streak });

        if outcome.won {
            NextStep::NextRound(self.config.win_delay)
        } else {
            NextStep::ReturnToMenu(self.config.loss_delay)
        }
    }

    fn spawn_fetch(
        &self,
        ticket: RoundTicket,
        purpose: FetchPurpose,
        tx: mpsc::Sender<FetchReport>,
    ) -> JoinHandle<()> {
        let fetcher = Arc::clone(&self.fetcher);
        let last_known = self.machine.last_known();
        tokio::spawn(async move {
            let outcome = fetcher.fetch(last_known).await;
            let _ = tx.send(FetchReport { ticket, purpose, outcome }).await;
        })
    }

    /// Returns the purpose of an accepted report, `None` if it was stale.
    fn apply_report(&mut self, report: FetchReport) -> Option<FetchPurpose> {
        let FetchReport { ticket, purpose, outcome } = report;
        let accepted = match purpose {
            FetchPurpose::Start => self.machine.apply_start_value(ticket, &outcome),
            FetchPurpose::Live => self.machine.apply_live_value(ticket, &outcome),
        };
        if !accepted {
            return None;
        }

        let event = match purpose {
            FetchPurpose::Start => GameEvent::StartValue {
                value: outcome.value,
                degraded: outcome.degraded,
            },
            FetchPurpose::Live => GameEvent::LiveValue {
                value: outcome.value,
                degraded: outcome.degraded,
            },
        };
        self.emit(event);
        Some(purpose)
    }

    fn emit(&self, event: GameEvent) {
        // A closed receiver just means nobody is watching.
        let _ = self.events.send(event);
    }
}

/// Interval whose first tick lands one period from now.
fn interval_after(period: Duration) -> time::Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Shared types for the BLITZ game.
//!
//! These types form the data model used across the engine, the value
//! sources and the front end. They carry no behaviour beyond small
//! helpers so every module can depend on them without cycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// The player's call on where the price will be when the round expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Higher,
    Lower,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Higher => write!(f, "HIGHER"),
            Direction::Lower => write!(f, "LOWER"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "higher" | "high" | "h" | "up" | "u" => Ok(Direction::Higher),
            "lower" | "low" | "l" | "down" | "d" => Ok(Direction::Lower),
            other => Err(format!("Unknown direction: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Round
// ---------------------------------------------------------------------------

/// Lifecycle phase of a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Timer running, a guess may still be recorded.
    Collecting,
    /// Timer expired, final value being fetched.
    Resolving,
    /// Outcome computed.
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Collecting => write!(f, "Collecting"),
            Phase::Resolving => write!(f, "Resolving"),
            Phase::Finished => write!(f, "Finished"),
        }
    }
}

/// One play cycle, from start-value capture to outcome resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Round {
    /// `None` until the start-value fetch lands.
    pub start_value: Option<f64>,
    /// Most recent successfully fetched value; display only.
    pub last_known_value: Option<f64>,
    /// Set at most once per round.
    pub guess: Option<Direction>,
    pub remaining: Duration,
    pub phase: Phase,
}

impl Round {
    pub fn new(duration: Duration, last_known_value: Option<f64>) -> Self {
        Self {
            start_value: None,
            last_known_value,
            guess: None,
            remaining: duration,
            phase: Phase::Collecting,
        }
    }
}

/// Resolution of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub won: bool,
    pub guess_made: bool,
    pub guess: Option<Direction>,
    pub start_value: f64,
    pub final_value: f64,
    /// True when the start or final value came from a fallback rather
    /// than a live source.
    pub degraded: bool,
    pub resolved_at: DateTime<Utc>,
}

impl RoundOutcome {
    /// The one-line verdict shown to the player.
    pub fn status_line(&self, streak: u32) -> String {
        if !self.guess_made {
            "Too slow! No guess.".to_string()
        } else if self.won {
            format!("CORRECT! Streak: {streak}")
        } else {
            format!("Wrong → final was {}", format_price(self.final_value))
        }
    }
}

/// Whether `guess` wins against a move from `start` to `final_value`.
///
/// Unchanged prices lose in both directions; no guess always loses.
pub fn guess_wins(guess: Option<Direction>, start: f64, final_value: f64) -> bool {
    match guess {
        Some(Direction::Higher) => final_value > start,
        Some(Direction::Lower) => final_value < start,
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Why a single source attempt failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid value: {0}")]
    InvalidValue(f64),
}

/// A usable value plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub value: f64,
    /// Served from last-known-good or the static default.
    pub degraded: bool,
    /// Source that produced the value; `None` when degraded.
    pub source: Option<String>,
    /// Attempts made across all sources.
    pub attempts: u32,
}

impl FetchOutcome {
    pub fn live(value: f64, source: &str, attempts: u32) -> Self {
        Self {
            value,
            degraded: false,
            source: Some(source.to_string()),
            attempts,
        }
    }

    pub fn fallback(value: f64, attempts: u32) -> Self {
        Self {
            value,
            degraded: true,
            source: None,
            attempts,
        }
    }
}

/// A finite, strictly positive price.
pub fn is_usable_price(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Format a price as whole dollars with thousands separators, e.g. `$92,350`.
pub fn format_price(price: f64) -> String {
    let rounded = price.round();
    let negative = rounded < 0.0;
    let digits = format!("{:.0}", rounded.abs());

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

/// Remaining time as seconds with one decimal, e.g. `4.9`.
pub fn format_remaining(remaining: Duration) -> String {
    let tenths = remaining.as_millis() / 100;
    format!("{}.{}", tenths / 10, tenths % 10)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

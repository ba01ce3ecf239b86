//! Persistence layer.
//!
//! The game persists a single number: the best streak ever reached.
//! `JsonFileStore` keeps it in a small JSON file keyed by name so several
//! games can share one file; `MemoryStore` backs tests and headless runs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default high score file path.
pub const DEFAULT_HIGH_SCORE_FILE: &str = "blitz_highscore.json";

/// Default key under which the score is stored.
pub const DEFAULT_HIGH_SCORE_KEY: &str = "btcBlitzHigh";

/// Key-value persistence for the high score.
#[cfg_attr(test, mockall::automock)]
pub trait HighScoreStore {
    fn high_score(&self) -> Result<u32>;

    fn set_high_score(&mut self, score: u32) -> Result<()>;
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HighScoreRecord {
    pub score: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    key: String,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, key: &str) -> Self {
        Self {
            path: path.into(),
            key: key.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records in the file. A missing file is an empty map.
    fn load_all(&self) -> Result<BTreeMap<String, HighScoreRecord>> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No high score file found, starting fresh");
            return Ok(BTreeMap::new());
        }

        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read high scores from {}", self.path.display()))?;

        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse high scores from {}", self.path.display()))
    }

    /// Remove the file (for testing or reset).
    pub fn delete(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to delete {}", self.path.display()))?;
        }
        Ok(())
    }
}

impl HighScoreStore for JsonFileStore {
    fn high_score(&self) -> Result<u32> {
        let records = self.load_all()?;
        Ok(records.get(&self.key).map(|r| r.score).unwrap_or(0))
    }

    fn set_high_score(&mut self, score: u32) -> Result<()> {
        let mut records = self.load_all()?;
        records.insert(
            self.key.clone(),
            HighScoreRecord {
                score,
                updated_at: Utc::now(),
            },
        );

        let json = serde_json::to_string_pretty(&records)
            .context("Failed to serialise high scores")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write high scores to {}", self.path.display()))?;

        debug!(path = %self.path.display(), key = %self.key, score, "High score saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    score: u32,
}

impl MemoryStore {
    pub fn new(score: u32) -> Self {
        Self { score }
    }
}

impl HighScoreStore for MemoryStore {
    fn high_score(&self) -> Result<u32> {
        Ok(self.score)
    }

    fn set_high_score(&mut self, score: u32) -> Result<()> {
        self.score = score;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

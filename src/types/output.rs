//! Output structures for terminal display

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::types::{PresentationState, TrialResult};

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

/// One closed trial, as printed by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialOutput {
    /// Wall time of the close (session epoch + logical ms)
    pub timestamp: DateTime<Utc>,
    /// Logical ms since session start
    pub at_ms: u64,
    pub state: PresentationState,
    pub result: TrialResult,
}

impl TrialOutput {
    pub fn new(timestamp: DateTime<Utc>, at_ms: u64, result: TrialResult) -> Self {
        Self {
            timestamp,
            at_ms,
            state: PresentationState::Closed,
            result,
        }
    }

    fn outcome(&self) -> String {
        match (self.result.reaction_ms, self.result.miss_reason) {
            (Some(ms), _) => format!("OK {}ms", ms),
            (None, Some(reason)) => match self.result.elapsed_ms {
                Some(ms) => format!("MISS {} ({}ms)", reason, ms),
                None => format!("MISS {}", reason),
            },
            (None, None) => "-".to_string(),
        }
    }

    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let color = if self.result.miss { RED } else { GREEN };

        format!(
            "{}#{:<4} {:>8.1}s | {:<18} | {:<10} | {:<24} | {}{}",
            color,
            self.result.sequence_position,
            self.at_ms as f64 / 1000.0,
            self.result.stage.as_str(),
            self.result.category.as_str(),
            truncate(&self.result.stimulus, 24),
            self.outcome(),
            RESET
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "pos={} | t={:.3}s | stage={} | category={} | stimulus={} | {}",
            self.result.sequence_position,
            self.at_ms as f64 / 1000.0,
            self.result.stage,
            self.result.category,
            self.result.stimulus,
            self.outcome()
        )
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        value.chars().take(max_chars - 1).chain(std::iter::once('…')).collect()
    }
}

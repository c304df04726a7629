//! Per-session mutable state
//!
//! Owned by the orchestrator and lent to the presentation engine while a
//! trial runs. The result list is append-only; the only in-place edit is the
//! press duration set by a key release.

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::core::config::{CategoryTable, MsRange, TestConfig};
use crate::core::journal::EventLog;
use crate::core::tracker::MissedStimulusTracker;
use crate::types::{Category, Stage, StimulusSpec, TrialResult};

pub struct SessionState {
    pub session_id: String,
    pub config: TestConfig,
    /// Main stimulus list
    pub stimuli: Vec<StimulusSpec>,
    pub tracker: MissedStimulusTracker,
    pub results: Vec<TrialResult>,
    pub log: EventLog,
    pub stage: Stage,
    /// Logical ms when adaptation started
    pub test_start_ms: Option<u64>,
    /// Logical ms of the last forced pause (or test start)
    pub last_pause_ms: u64,
    pub rng: ChaCha8Rng,
    pub finished: bool,
    /// Logical ms when the run finished or was aborted
    pub ended_ms: Option<u64>,
    sequence: u64,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("session_id", &self.session_id)
            .field("stage", &self.stage)
            .field("results", &self.results.len())
            .field("sequence", &self.sequence)
            .field("finished", &self.finished)
            .finish()
    }
}

impl SessionState {
    pub fn new(
        session_id: impl Into<String>,
        config: TestConfig,
        stimuli: Vec<StimulusSpec>,
        log: EventLog,
        seed: u64,
    ) -> Self {
        let tracker = MissedStimulusTracker::new(config.max_miss_attempts);
        Self {
            session_id: session_id.into(),
            config,
            stimuli,
            tracker,
            results: Vec::new(),
            log,
            stage: Stage::Adaptation,
            test_start_ms: None,
            last_pause_ms: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            finished: false,
            ended_ms: None,
            sequence: 0,
        }
    }

    /// Claim the next session-wide position (first is 1)
    pub fn next_sequence_position(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Last position handed out
    pub fn sequence_position(&self) -> u64 {
        self.sequence
    }

    /// Append a result, returning its index
    pub fn push_result(&mut self, result: TrialResult) -> usize {
        self.results.push(result);
        self.results.len() - 1
    }

    pub fn results_for(&self, stage: Stage) -> impl Iterator<Item = &TrialResult> {
        self.results.iter().filter(move |r| r.stage == stage)
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.log.epoch()
    }

    /// Whether a forced pause is due at `now`; a zero interval never fires
    pub fn pause_due(&self, now: u64) -> bool {
        let interval = self.config.pause_interval_ms();
        self.test_start_ms.is_some() && interval > 0 && now.saturating_sub(self.last_pause_ms) >= interval
    }
}

/// Session id from a respondent number and start time
pub fn session_id(respondent: u32, started: DateTime<Utc>) -> String {
    format!("Respondent_{}_{}", respondent, started.format("%Y-%m-%d_%H-%M-%S"))
}

/// Pause ranges derived from adaptation performance.
///
/// `m` is the integer mean of OK reactions (0 if none), `miss%` is over all
/// adaptation trials (100 if none).
pub fn calibrated_pause_ranges<'a>(
    adaptation: impl IntoIterator<Item = &'a TrialResult>,
) -> CategoryTable<MsRange> {
    let mut total = 0usize;
    let mut misses = 0usize;
    let mut reactions = Vec::new();
    for r in adaptation {
        total += 1;
        match r.reaction_ms {
            Some(ms) => reactions.push(ms),
            None => misses += 1,
        }
    }
    let miss_pct = if total == 0 {
        100.0
    } else {
        misses as f64 / total as f64 * 100.0
    };
    let m = if reactions.is_empty() {
        0
    } else {
        reactions.iter().sum::<u64>() / reactions.len() as u64
    };

    let lo = if miss_pct <= 15.0 && m < 700 {
        600
    } else if miss_pct <= 15.0 && m <= 950 {
        (m + 300) / 100 * 100
    } else {
        ((m + 500) / 100 * 100).min(1100).max(1000)
    };
    let hi = (lo + 500).min(1100);

    let mut table = CategoryTable::uniform(MsRange(lo, hi));
    table.set(Category::Neutral, MsRange(lo, hi));
    table.set(Category::Sensitive, MsRange((lo + 100).min(hi), hi));
    table.set(Category::Cognitive, MsRange((lo + 200).min(hi), hi));
    table
}

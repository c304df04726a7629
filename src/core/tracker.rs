//! Missed-stimulus ledger
//!
//! Every classified press and every unanswered close bumps `attempts` for
//! the stimulus key; only OK presses bump `valid_count`. A key stays in the
//! retry pool while it has fewer than three valid reactions and has not hit
//! the attempt cap.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Category, Classification, StimulusSpec};
use crate::REQUIRED_VALID_REACTIONS;

/// Attempt counts for one (stimulus, category) key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissTally {
    pub valid_count: u32,
    pub attempts: u32,
}

impl MissTally {
    pub fn is_eligible(&self, max_attempts: u32) -> bool {
        self.valid_count < REQUIRED_VALID_REACTIONS && self.attempts < max_attempts
    }

    /// Copies a repeat block may add for this key
    pub fn quantity(&self, max_attempts: u32) -> u32 {
        if !self.is_eligible(max_attempts) {
            return 0;
        }
        (REQUIRED_VALID_REACTIONS - self.valid_count).min(max_attempts - self.attempts)
    }
}

/// Per-key tallies across the whole session
#[derive(Debug, Clone)]
pub struct MissedStimulusTracker {
    entries: BTreeMap<StimulusSpec, MissTally>,
    max_attempts: u32,
}

impl MissedStimulusTracker {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn entry(&mut self, spec: &StimulusSpec) -> &mut MissTally {
        self.entries.entry(spec.clone()).or_default()
    }

    /// Count a classified press
    pub fn record_press(&mut self, spec: &StimulusSpec, classification: Classification) {
        let tally = self.entry(spec);
        tally.attempts += 1;
        if classification.is_ok() {
            tally.valid_count = (tally.valid_count + 1).min(REQUIRED_VALID_REACTIONS);
        }
    }

    /// Count a trial that closed without a press
    pub fn record_no_response(&mut self, spec: &StimulusSpec) {
        self.entry(spec).attempts += 1;
    }

    pub fn tally(&self, spec: &StimulusSpec) -> Option<MissTally> {
        self.entries.get(spec).copied()
    }

    pub fn is_eligible(&self, spec: &StimulusSpec) -> bool {
        self.tally(spec)
            .map(|t| t.is_eligible(self.max_attempts))
            .unwrap_or(false)
    }

    pub fn quantity(&self, spec: &StimulusSpec) -> u32 {
        self.tally(spec)
            .map(|t| t.quantity(self.max_attempts))
            .unwrap_or(0)
    }

    /// Eligible keys in the given categories, with their copy counts
    pub fn eligible_keys(&self, categories: &[Category]) -> Vec<(StimulusSpec, u32)> {
        self.entries
            .iter()
            .filter(|(spec, _)| categories.contains(&spec.category))
            .filter_map(|(spec, tally)| {
                let qty = tally.quantity(self.max_attempts);
                (qty > 0).then(|| (spec.clone(), qty))
            })
            .collect()
    }

    /// Drop every key that can no longer be retried
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        let max_attempts = self.max_attempts;
        self.entries.retain(|_, tally| tally.is_eligible(max_attempts));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

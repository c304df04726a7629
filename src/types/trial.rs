//! Trial results and response classification

use serde::{Deserialize, Serialize};
use crate::types::{Category, Stage, StimulusSpec};

/// Why a trial counts as a miss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    /// Press arrived before the premature threshold
    Premature,
    /// Press arrived after the late threshold
    Late,
    /// Reaction window closed without a press
    NoResponse,
}

impl MissReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissReason::Premature => "premature",
            MissReason::Late => "late",
            MissReason::NoResponse => "no_response",
        }
    }
}

impl std::fmt::Display for MissReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of classifying a single key press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Ok,
    Premature,
    Late,
}

impl Classification {
    /// Miss reason for non-OK classifications
    pub fn miss_reason(&self) -> Option<MissReason> {
        match self {
            Classification::Ok => None,
            Classification::Premature => Some(MissReason::Premature),
            Classification::Late => Some(MissReason::Late),
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == Classification::Ok
    }
}

/// One presented, scored stimulus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub stimulus: String,
    pub category: Category,
    pub stage: Stage,
    /// Session-wide presentation counter
    pub sequence_position: u64,
    /// Reaction time for OK presses
    pub reaction_ms: Option<u64>,
    pub miss: bool,
    pub miss_reason: Option<MissReason>,
    /// Set by the key release after the press
    pub press_duration_ms: Option<u64>,
    /// Raw press latency, also kept for premature/late presses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl TrialResult {
    /// Valid reaction
    pub fn reaction(spec: &StimulusSpec, stage: Stage, sequence_position: u64, reaction_ms: u64) -> Self {
        Self {
            stimulus: spec.value.clone(),
            category: spec.category,
            stage,
            sequence_position,
            reaction_ms: Some(reaction_ms),
            miss: false,
            miss_reason: None,
            press_duration_ms: None,
            elapsed_ms: Some(reaction_ms),
        }
    }

    /// Missed trial; `elapsed_ms` is None for no_response
    pub fn missed(
        spec: &StimulusSpec,
        stage: Stage,
        sequence_position: u64,
        reason: MissReason,
        elapsed_ms: Option<u64>,
    ) -> Self {
        Self {
            stimulus: spec.value.clone(),
            category: spec.category,
            stage,
            sequence_position,
            reaction_ms: None,
            miss: true,
            miss_reason: Some(reason),
            press_duration_ms: None,
            elapsed_ms,
        }
    }

    /// Exactly one of {reaction set and not miss, miss} holds
    pub fn is_consistent(&self) -> bool {
        match (self.reaction_ms, self.miss) {
            (Some(_), false) => self.miss_reason.is_none(),
            (None, true) => self.miss_reason.is_some(),
            _ => false,
        }
    }

    pub fn spec(&self) -> StimulusSpec {
        StimulusSpec::new(self.stimulus.clone(), self.category)
    }
}

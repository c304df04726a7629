//! Protocol stages

use serde::{Deserialize, Serialize};
use crate::types::Category;

/// Named phases of the test protocol, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Adaptation,
    AdaptationRepeat,
    Preparation,
    Calibration,
    CalibrationRepeat,
    Reference,
    ReferenceRepeat,
    Main,
    MainRepeat,
}

impl Stage {
    /// Full protocol order
    pub const ORDER: [Stage; 9] = [
        Stage::Adaptation,
        Stage::AdaptationRepeat,
        Stage::Preparation,
        Stage::Calibration,
        Stage::CalibrationRepeat,
        Stage::Reference,
        Stage::ReferenceRepeat,
        Stage::Main,
        Stage::MainRepeat,
    ];

    /// Stage that follows this one, None after main_repeat
    pub fn next(&self) -> Option<Stage> {
        let idx = Self::ORDER.iter().position(|s| s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }

    pub fn is_repeat(&self) -> bool {
        matches!(
            self,
            Stage::AdaptationRepeat
                | Stage::CalibrationRepeat
                | Stage::ReferenceRepeat
                | Stage::MainRepeat
        )
    }

    /// Adaptation trials use the fixed late threshold and fixed pause
    pub fn is_adaptation(&self) -> bool {
        matches!(self, Stage::Adaptation | Stage::AdaptationRepeat)
    }

    /// Preparation is shown but never scored
    pub fn is_scored(&self) -> bool {
        *self != Stage::Preparation
    }

    /// Main block stages (used by the report)
    pub fn is_main(&self) -> bool {
        matches!(self, Stage::Main | Stage::MainRepeat)
    }

    /// Categories whose missed keys a repeat stage re-presents
    pub fn repeat_categories(&self) -> &'static [Category] {
        match self {
            Stage::AdaptationRepeat => &[Category::Buffer],
            Stage::CalibrationRepeat => &[Category::Neutral, Category::Buffer],
            Stage::ReferenceRepeat => &[
                Category::Sensitive,
                Category::Neutral,
                Category::Cognitive,
                Category::Buffer,
            ],
            Stage::MainRepeat => &[
                Category::Sensitive,
                Category::Neutral,
                Category::Positive,
                Category::Buffer,
            ],
            _ => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Adaptation => "adaptation",
            Stage::AdaptationRepeat => "adaptation_repeat",
            Stage::Preparation => "preparation",
            Stage::Calibration => "calibration",
            Stage::CalibrationRepeat => "calibration_repeat",
            Stage::Reference => "reference",
            Stage::ReferenceRepeat => "reference_repeat",
            Stage::Main => "main",
            Stage::MainRepeat => "main_repeat",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ORDER.iter().copied().find(|s| s.as_str() == raw.trim())
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

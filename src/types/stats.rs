//! Scored data produced from the trial log
//!
//! Everything here is derived; nothing is stored during the run.

use serde::{Deserialize, Serialize};
use crate::types::Category;

/// Summary of one (trimmed) sample set
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    /// Samples kept after trimming
    pub n: usize,
    /// Samples dropped as outliers
    pub trimmed: usize,
    pub mean: f64,
    pub sd: f64,
    /// Coefficient of variation, sd/mean × 100
    pub cv: f64,
}

/// Baseline-relative comparison of a sample set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Percent difference against the neutral mean
    pub effect: f64,
    pub z: f64,
    /// Welch two-sided p-value
    pub p: f64,
}

impl Default for Comparison {
    fn default() -> Self {
        Self {
            effect: 0.0,
            z: 0.0,
            p: 1.0,
        }
    }
}

/// Reaction on the buffer trial right after a scored stimulus
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AfterEffect {
    pub stats: SampleStats,
    pub vs_neutral: Comparison,
}

/// Statistics shared by categories and single stimuli
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseProfile {
    /// All trials, including misses
    pub trials: usize,
    pub misses: usize,
    pub miss_pct: f64,
    pub reaction: SampleStats,
    pub vs_neutral: Comparison,
    pub after: AfterEffect,
    pub press: SampleStats,
    pub press_vs_neutral: Comparison,
}

/// Per-category statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category: Category,
    #[serde(flatten)]
    pub profile: ResponseProfile,
}

/// Named recognition metrics for one stimulus
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionMetrics {
    /// Smirnov: mean / neutral_mean
    pub kz: f64,
    /// Kostandov: neutral_mean / mean
    pub kd: f64,
    /// Luria: press_mean / neutral_press_mean
    pub kaz: f64,
    /// Luria: miss_count / n
    pub char_rate: f64,
    /// After-effect shift: after_mean - neutral_mean
    pub delta_tmr: f64,
    /// Sequence irregularity
    pub pos: f64,
    /// Composite index, percent
    pub iv: f64,
    pub smirnov_percent: u8,
    pub kostandov_percent: u8,
    pub luria_percent: u8,
}

/// Per-stimulus statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusStats {
    pub stimulus: String,
    pub category: Category,
    #[serde(flatten)]
    pub profile: ResponseProfile,
    /// Longest run of consecutive misses
    pub consecutive_misses: u32,
    pub sequence_irregularity: f64,
    pub recognition: RecognitionMetrics,
}

impl StimulusStats {
    /// Too many misses to rank
    pub fn is_unreliable(&self) -> bool {
        self.profile.miss_pct > crate::UNRELIABLE_MISS_PERCENT
    }
}

/// How a table's labels are worded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    Recognition,
    Significance,
}

/// Qualitative band of a percent score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    None,
    Weak,
    Probable,
    High,
}

impl Band {
    /// ≥80 high, ≥50 probable, ≥20 weak, else none
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 80.0 {
            Band::High
        } else if percent >= 50.0 {
            Band::Probable
        } else if percent >= 20.0 {
            Band::Weak
        } else {
            Band::None
        }
    }

    pub fn label(&self, framing: Framing) -> &'static str {
        match (framing, self) {
            (Framing::Recognition, Band::High) => "High recognition",
            (Framing::Recognition, Band::Probable) => "Probable recognition",
            (Framing::Recognition, Band::Weak) => "Weak recognition",
            (Framing::Recognition, Band::None) => "Not recognized",
            (Framing::Significance, Band::High) => "High significance",
            (Framing::Significance, Band::Probable) => "Probable significance",
            (Framing::Significance, Band::Weak) => "Weak significance",
            (Framing::Significance, Band::None) => "Not significant",
        }
    }
}

/// Which metric a ranked table orders by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    /// IV
    Composite,
    /// Kz tier
    Smirnov,
    /// Kd tier
    Kostandov,
    /// KAZ / ChAR tier
    Luria,
}

/// Named parameter shown next to a ranked stimulus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: f64,
}

impl Param {
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRow {
    pub stimulus: String,
    pub params: Vec<Param>,
    /// IV for the composite table, tier percent otherwise
    pub score: f64,
    pub band: Band,
    pub label: String,
}

/// One ranked output table, highest score first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTable {
    pub scale: Scale,
    pub framing: Framing,
    pub rows: Vec<RankedRow>,
}

/// Threshold verdict for a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Adaptation: cv < 10 and miss% < 5
    Ready,
    /// Main: cv < 15 and miss% < 5
    Stable,
    Unstable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockState {
    pub trials: usize,
    pub mean: f64,
    pub cv: f64,
    pub miss_pct: f64,
    pub verdict: Verdict,
}

/// Adaptation vs main comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RespondentState {
    pub adaptation: BlockState,
    pub main: BlockState,
    /// main cv grew by more than 25% over adaptation cv
    pub fatigue: bool,
}

/// Stimuli grouped by composite band
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conclusions {
    /// IV ≥ 80
    pub high: Vec<String>,
    /// 50 ≤ IV < 80
    pub probable: Vec<String>,
}

/// Everything the report consumer needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDataset {
    /// SHA-256 of the scored trial log, hex
    pub log_digest: String,
    pub categories: Vec<CategoryStats>,
    pub stimuli: Vec<StimulusStats>,
    pub tables: Vec<RankedTable>,
    /// Stimuli left out of the tables (miss% > 50)
    pub unreliable: Vec<String>,
    pub respondent: RespondentState,
    pub conclusions: Conclusions,
}

impl ScoredDataset {
    pub fn table(&self, scale: Scale, framing: Framing) -> Option<&RankedTable> {
        self.tables
            .iter()
            .find(|t| t.scale == scale && t.framing == framing)
    }

    pub fn category(&self, category: Category) -> Option<&CategoryStats> {
        self.categories.iter().find(|c| c.category == category)
    }

    pub fn stimulus(&self, value: &str) -> Option<&StimulusStats> {
        self.stimuli.iter().find(|s| s.stimulus == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_edges() {
        assert_eq!(Band::from_percent(80.0), Band::High);
        assert_eq!(Band::from_percent(79.99), Band::Probable);
        assert_eq!(Band::from_percent(50.0), Band::Probable);
        assert_eq!(Band::from_percent(20.0), Band::Weak);
        assert_eq!(Band::from_percent(19.9), Band::None);
    }

    #[test]
    fn test_band_labels_follow_framing() {
        assert_eq!(Band::High.label(Framing::Recognition), "High recognition");
        assert_eq!(Band::High.label(Framing::Significance), "High significance");
    }
}

//! Probe0: masked-probe reaction test engine
//!
//! Presents masked word probes to a single respondent on a logical clock,
//! classifies each key press, re-presents missed stimuli under attempt caps,
//! and scores the trial log into recognition / significance metrics.

pub mod core;
pub mod types;

// =============================================================================
// RESPONSE CLASSIFICATION [C]
// =============================================================================

/// Presses faster than this (since probe onset) are premature
pub const PREMATURE_THRESHOLD_MS: u64 = 50;

/// Fixed late threshold for adaptation trials
pub const ADAPTATION_LATE_THRESHOLD_MS: u64 = 2000;

/// Valid reactions required before a stimulus leaves the retry pool
pub const REQUIRED_VALID_REACTIONS: u32 = 3;

// =============================================================================
// SCORING [C]
// =============================================================================

/// Points further than this many sd from the mean are trimmed
pub const OUTLIER_SD_LIMIT: f64 = 3.0;

/// Stimuli above this miss% are left out of ranked tables
pub const UNRELIABLE_MISS_PERCENT: f64 = 50.0;

/// Composite index weights (Kz, 1/Kd, KAZ, ChAR)
pub const IV_WEIGHT_KZ: f64 = 0.4;
pub const IV_WEIGHT_INV_KD: f64 = 0.3;
pub const IV_WEIGHT_KAZ: f64 = 0.2;
pub const IV_WEIGHT_CHAR: f64 = 0.1;

/// Sequence irregularity weights (cv, miss%, longest miss run)
pub const POS_WEIGHT_CV: f64 = 0.5;
pub const POS_WEIGHT_MISS: f64 = 0.3;
pub const POS_WEIGHT_RUN: f64 = 10.0;

/// main_cv above adaptation_cv times this raises the fatigue flag
pub const FATIGUE_CV_RATIO: f64 = 1.25;

// =============================================================================
// SESSION [C]
// =============================================================================

/// Countdown before the adaptation block starts (seconds)
pub const PRE_TEST_COUNTDOWN_SECS: u32 = 3;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";

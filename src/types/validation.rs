//! Validation reasons for configuration and stimulus lists

use serde::{Deserialize, Serialize};

/// Reason codes for startup validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ValidationReason {
    // =========================================================================
    // R100: Accepted
    // =========================================================================
    /// Everything checked out
    R100_VALID,

    // =========================================================================
    // R101-R109: Configuration
    // =========================================================================
    /// Session language has no word list
    R101_LANGUAGE_MISSING,
    /// A Stroop colour equals the background colour
    R102_STROOP_COLOR_INVISIBLE,
    /// A duration range has lo > hi
    R103_RANGE_INVERTED,
    /// max_miss_attempts is zero
    R104_ATTEMPT_CAP_ZERO,
    /// Buffer symbol string is empty
    R105_BUFFER_EMPTY,
    /// pause_interval_min is zero
    R106_PAUSE_INTERVAL_ZERO,
    /// A probability is NaN or outside [0, 1]
    R107_PROBABILITY_INVALID,

    // =========================================================================
    // R110-R119: Stimulus list
    // =========================================================================
    /// Fewer than 5 sensitive stimuli
    R110_TOO_FEW_SENSITIVE,
    /// Fewer than 5 neutral stimuli
    R111_TOO_FEW_NEUTRAL,
    /// Fewer than 5 positive stimuli
    R112_TOO_FEW_POSITIVE,
    /// Unknown category name in a stimulus line
    R113_UNKNOWN_CATEGORY,
}

impl ValidationReason {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::R100_VALID => "R100_VALID",
            Self::R101_LANGUAGE_MISSING => "R101_LANGUAGE_MISSING",
            Self::R102_STROOP_COLOR_INVISIBLE => "R102_STROOP_COLOR_INVISIBLE",
            Self::R103_RANGE_INVERTED => "R103_RANGE_INVERTED",
            Self::R104_ATTEMPT_CAP_ZERO => "R104_ATTEMPT_CAP_ZERO",
            Self::R105_BUFFER_EMPTY => "R105_BUFFER_EMPTY",
            Self::R106_PAUSE_INTERVAL_ZERO => "R106_PAUSE_INTERVAL_ZERO",
            Self::R107_PROBABILITY_INVALID => "R107_PROBABILITY_INVALID",
            Self::R110_TOO_FEW_SENSITIVE => "R110_TOO_FEW_SENSITIVE",
            Self::R111_TOO_FEW_NEUTRAL => "R111_TOO_FEW_NEUTRAL",
            Self::R112_TOO_FEW_POSITIVE => "R112_TOO_FEW_POSITIVE",
            Self::R113_UNKNOWN_CATEGORY => "R113_UNKNOWN_CATEGORY",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::R100_VALID => "Configuration valid",
            Self::R101_LANGUAGE_MISSING => "No word list for the session language",
            Self::R102_STROOP_COLOR_INVISIBLE => "Stroop colour matches the background",
            Self::R103_RANGE_INVERTED => "Range lower bound exceeds upper bound",
            Self::R104_ATTEMPT_CAP_ZERO => "max_miss_attempts must be at least 1",
            Self::R105_BUFFER_EMPTY => "Buffer symbols must not be empty",
            Self::R106_PAUSE_INTERVAL_ZERO => "pause_interval_min must be at least 1",
            Self::R107_PROBABILITY_INVALID => "Probability must be a number in [0, 1]",
            Self::R110_TOO_FEW_SENSITIVE => "At least 5 sensitive stimuli required",
            Self::R111_TOO_FEW_NEUTRAL => "At least 5 neutral stimuli required",
            Self::R112_TOO_FEW_POSITIVE => "At least 5 positive stimuli required",
            Self::R113_UNKNOWN_CATEGORY => "Unknown stimulus category",
        }
    }
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}

/// Result of a validation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: ValidationReason,
    /// Offending key, value or line
    pub detail: Option<String>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            valid: true,
            reason: ValidationReason::R100_VALID,
            detail: None,
        }
    }

    pub fn failure(reason: ValidationReason, detail: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason,
            detail: Some(detail.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({})", self.reason, detail),
            None => write!(f, "{}", self.reason),
        }
    }
}

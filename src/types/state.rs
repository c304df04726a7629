//! Presentation state definitions

use serde::{Deserialize, Serialize};

/// The phases a single trial moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresentationState {
    /// No trial in flight
    Idle,
    /// Probe word on screen
    ShowingProbe,
    /// Digit mask on screen
    ShowingMask,
    /// Blank screen, waiting for the press or the pause timer
    ReactionWindow,
    /// Trial finished, waiting for the next request
    Closed,
}

impl PresentationState {
    /// Whether a key press can still be attributed to the current trial
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            PresentationState::ShowingProbe
                | PresentationState::ShowingMask
                | PresentationState::ReactionWindow
        )
    }
}

impl std::fmt::Display for PresentationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PresentationState::Idle => "IDLE",
            PresentationState::ShowingProbe => "SHOWING_PROBE",
            PresentationState::ShowingMask => "SHOWING_MASK",
            PresentationState::ReactionWindow => "REACTION_WINDOW",
            PresentationState::Closed => "CLOSED",
        };
        write!(f, "{}", name)
    }
}

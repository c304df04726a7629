//! Core types for Probe0

mod stimulus;
mod stage;
mod trial;
mod state;
mod validation;
mod log;
mod stats;
mod output;

pub use stimulus::{Category, StimulusSpec};
pub use stage::Stage;
pub use trial::{Classification, MissReason, TrialResult};
pub use state::PresentationState;
pub use validation::{ValidationReason, ValidationResult};
pub use log::{EventType, LogRecord};
pub use stats::{
    AfterEffect, Band, BlockState, CategoryStats, Comparison, Conclusions, Framing, Param,
    RankedRow, RankedTable, RecognitionMetrics, RespondentState, ResponseProfile, SampleStats,
    Scale, ScoredDataset, StimulusStats, Verdict,
};
pub use output::TrialOutput;

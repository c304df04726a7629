//! Core modules for Probe0

pub mod error;
pub mod config;
pub mod clock;
pub mod tracker;
pub mod journal;
pub mod stats;
pub mod session;
pub mod responder;
pub mod blocks;
pub mod presentation;
pub mod orchestrator;
pub mod scoring;
pub mod api;

pub use error::{ProbeError, Result};
pub use config::{builtin_stimuli, load_stimuli, parse_stimuli, validate_stimuli, CategoryTable, MsRange, TestConfig};
pub use clock::{Clock, Scheduler, TimerHandle, VirtualClock, WallClock};
pub use tracker::{MissTally, MissedStimulusTracker};
pub use journal::{parse_line, parse_log, EventLog, FileSink, LogSink, MemorySink};
pub use session::{calibrated_pause_ranges, session_id, SessionState};
pub use responder::{KeyAction, RespondentProfile, Responder, ScriptedResponder, SimulatedRespondent};
pub use presentation::{classify, PresentationEngine, SessionEvent, TrialClosed, TrialRequest};
pub use orchestrator::{simulate, StageOrchestrator};
pub use scoring::{composite_index, respondent_state, ScoringEngine};
pub use api::{create_router, run_server};

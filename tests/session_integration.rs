//! Integration tests for whole simulated sessions

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use probe0::core::{
    builtin_stimuli, parse_log, simulate, EventLog, FileSink, RespondentProfile, SessionState, TestConfig,
};
use probe0::types::{Category, EventType, Stage, TrialResult};
use proptest::prelude::*;
use std::collections::HashMap;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 4, 10, 30, 0).unwrap()
}

fn new_session(seed: u64, log: EventLog) -> SessionState {
    let config = TestConfig::default();
    let stimuli = builtin_stimuli(&config.lang);
    SessionState::new("Respondent_1_test", config, stimuli, log, seed)
}

fn run(seed: u64) -> SessionState {
    simulate(new_session(seed, EventLog::new(epoch())), seed, RespondentProfile::default())
}

fn counts(results: &[TrialResult], stage: Stage) -> HashMap<(String, Category), usize> {
    let mut out = HashMap::new();
    for r in results.iter().filter(|r| r.stage == stage && r.category != Category::Buffer) {
        *out.entry((r.stimulus.clone(), r.category)).or_insert(0) += 1;
    }
    out
}

#[test]
fn test_simulated_session_shape() {
    let session = run(11);
    assert!(session.finished);
    assert!(session.ended_ms.is_some());
    assert!(!session.results.is_empty());

    for (i, r) in session.results.iter().enumerate() {
        assert_eq!(r.sequence_position, i as u64 + 1);
        assert!(r.is_consistent(), "inconsistent result {:?}", r);
    }

    // Stages never go backwards and preparation is never scored
    assert!(session.results.windows(2).all(|w| w[0].stage <= w[1].stage));
    assert_eq!(session.results_for(Stage::Preparation).count(), 0);

    // Every main stimulus is shown test_repeats times in the main block
    let main = counts(&session.results, Stage::Main);
    for spec in &session.stimuli {
        assert_eq!(main.get(&(spec.value.clone(), spec.category)), Some(&3));
    }
}

#[test]
fn test_repeat_blocks_respect_caps() {
    let profile = RespondentProfile {
        miss_rate: 0.2,
        sensitive_miss_rate: 0.4,
        ..RespondentProfile::default()
    };
    let session = simulate(new_session(3, EventLog::new(epoch())), 3, profile);
    let cap = session.config.max_miss_attempts as usize;

    let main = counts(&session.results, Stage::Main);
    let repeat = counts(&session.results, Stage::MainRepeat);
    assert!(!repeat.is_empty());
    for (key, n) in &repeat {
        assert!(*n <= 3, "{:?} repeated {} times", key, n);
        let shown = main.get(key).copied().unwrap_or(0);
        assert!(*n <= cap.saturating_sub(shown), "{:?} exceeds the attempt cap", key);
    }
}

#[test]
fn test_log_text_parses_back() {
    let session = run(21);
    let parsed = parse_log(&session.log.to_text());
    assert_eq!(parsed.len(), session.log.len());
    assert_eq!(parsed.as_slice(), session.log.records());

    let shows = parsed
        .iter()
        .filter(|r| r.event == EventType::Show && r.payload.contains("pos="))
        .count();
    assert_eq!(shows, session.results.len());
    assert!(parsed.iter().any(|r| r.event == EventType::Info && r.payload == "test finished"));
}

#[test]
fn test_file_sink_mirrors_memory_log() {
    let dir = std::env::temp_dir().join(format!("probe0-session-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("log-Respondent_1_test.txt");
    let _ = std::fs::remove_file(&path);

    let sink = FileSink::open(&path).unwrap();
    let session = simulate(
        new_session(8, EventLog::with_sink(epoch(), Box::new(sink))),
        8,
        RespondentProfile::default(),
    );
    assert!(session.log.diagnostics().is_empty());

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, session.log.to_text());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(6))]

    #[test]
    fn prop_any_seed_gives_a_consistent_session(seed in any::<u64>()) {
        let session = run(seed);
        prop_assert!(session.finished);
        for (i, r) in session.results.iter().enumerate() {
            prop_assert_eq!(r.sequence_position, i as u64 + 1);
            prop_assert!(r.is_consistent());
        }
        for tally in session.stimuli.iter().filter_map(|s| session.tracker.tally(s)) {
            prop_assert!(tally.valid_count <= 3);
        }
    }
}

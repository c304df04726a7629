//! Integration tests for the per-trial state machine
//!
//! Trials are driven through the public scheduler the same way the
//! orchestrator does it: pop the next event, hand it to the engine.

use chrono::Utc;
use pretty_assertions::assert_eq;
use probe0::core::{
    CategoryTable, EventLog, KeyAction, MsRange, PresentationEngine, Scheduler, ScriptedResponder,
    SessionEvent, SessionState, TestConfig, TrialClosed, TrialRequest,
};
use probe0::types::{Category, EventType, MissReason, PresentationState, Stage, StimulusSpec};

fn fixed_pause_config() -> TestConfig {
    let mut config = TestConfig::default();
    config.pause_range_ms = CategoryTable::uniform(MsRange(1000, 1000));
    config
}

fn knife() -> StimulusSpec {
    StimulusSpec::new("ніж", Category::Sensitive)
}

/// Run one trial to completion, then drain the key release if any
fn run_trial(
    session: &mut SessionState,
    responder: &mut ScriptedResponder,
    start: u64,
    request: TrialRequest,
) -> TrialClosed {
    let mut engine = PresentationEngine::new();
    let mut sched: Scheduler<SessionEvent> = Scheduler::new();
    engine.begin(session, &mut sched, responder, start, request).unwrap();

    let mut closed = None;
    while let Some((at, event)) = sched.pop_next() {
        if let Some(c) = engine.handle(session, &mut sched, at, event) {
            closed = Some(c);
        }
    }
    assert_eq!(engine.state(), PresentationState::Closed);
    closed.unwrap()
}

#[test]
fn test_ok_press_with_release() {
    let mut session = SessionState::new("p", fixed_pause_config(), vec![], EventLog::new(Utc::now()), 1);
    let mut responder = ScriptedResponder::constant(Some(KeyAction::new(300, 120)));

    let closed = run_trial(&mut session, &mut responder, 5000, TrialRequest::scored(knife(), Stage::Main));
    assert_eq!(closed.at_ms, 5300);

    let result = &session.results[closed.result_index.unwrap()];
    assert_eq!(result.reaction_ms, Some(300));
    assert_eq!(result.press_duration_ms, Some(120));
    assert_eq!(result.sequence_position, 1);
    assert!(result.is_consistent());
    assert_eq!(session.tracker.tally(&knife()).unwrap().valid_count, 1);

    let events: Vec<EventType> = session.log.records().iter().map(|r| r.event).collect();
    assert_eq!(events, vec![EventType::Show, EventType::Reaction, EventType::Reaction]);
    assert!(session.log.records()[1].payload.ends_with("|OK"));
    assert_eq!(session.log.records()[2].payload, "press_duration=120");
}

#[test]
fn test_premature_press() {
    let mut session = SessionState::new("p", fixed_pause_config(), vec![], EventLog::new(Utc::now()), 1);
    let mut responder = ScriptedResponder::constant(Some(KeyAction::new(40, 80)));

    let closed = run_trial(&mut session, &mut responder, 0, TrialRequest::scored(knife(), Stage::Main));
    let result = &session.results[closed.result_index.unwrap()];
    assert!(result.miss);
    assert_eq!(result.miss_reason, Some(MissReason::Premature));
    assert_eq!(result.elapsed_ms, Some(40));

    let tally = session.tracker.tally(&knife()).unwrap();
    assert_eq!(tally.attempts, 1);
    assert_eq!(tally.valid_count, 0);
}

#[test]
fn test_late_press_inside_long_pause() {
    let mut config = fixed_pause_config();
    config.reaction_window_ms = 500;
    let mut session = SessionState::new("p", config, vec![], EventLog::new(Utc::now()), 1);
    // Probe 60 + mask 100 + pause 1000: the window is still open at 900
    let mut responder = ScriptedResponder::constant(Some(KeyAction::new(900, 100)));

    let closed = run_trial(&mut session, &mut responder, 0, TrialRequest::scored(knife(), Stage::Main));
    let result = &session.results[closed.result_index.unwrap()];
    assert_eq!(result.miss_reason, Some(MissReason::Late));
    assert_eq!(result.elapsed_ms, Some(900));
}

#[test]
fn test_no_press_closes_on_pause() {
    let mut session = SessionState::new("p", fixed_pause_config(), vec![], EventLog::new(Utc::now()), 1);
    let mut responder = ScriptedResponder::constant(None);

    let closed = run_trial(&mut session, &mut responder, 0, TrialRequest::scored(knife(), Stage::Main));
    assert_eq!(closed.at_ms, 1160);
    let result = &session.results[closed.result_index.unwrap()];
    assert_eq!(result.miss_reason, Some(MissReason::NoResponse));
    assert_eq!(result.press_duration_ms, None);
}

#[test]
fn test_attempt_cap_ends_eligibility() {
    let mut session = SessionState::new("p", fixed_pause_config(), vec![], EventLog::new(Utc::now()), 1);
    let mut responder = ScriptedResponder::new(vec![
        Some(KeyAction::new(20, 50)),
        None,
        Some(KeyAction::new(350, 90)),
        Some(KeyAction::new(10, 50)),
    ])
    .with_fallback(None);

    let mut start = 0;
    for n in 1..=5 {
        let closed = run_trial(&mut session, &mut responder, start, TrialRequest::scored(knife(), Stage::Main));
        start = closed.at_ms + 300;
        let tally = session.tracker.tally(&knife()).unwrap();
        assert_eq!(tally.attempts, n);
        assert_eq!(session.tracker.is_eligible(&knife()), n < 5);
    }

    let tally = session.tracker.tally(&knife()).unwrap();
    assert_eq!(tally.valid_count, 1);
    let positions: Vec<u64> = session.results.iter().map(|r| r.sequence_position).collect();
    assert_eq!(positions, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_cognitive_probe_logs_stroop_colour() {
    let mut session = SessionState::new("p", fixed_pause_config(), vec![], EventLog::new(Utc::now()), 1);
    let mut responder = ScriptedResponder::constant(None);
    let red = StimulusSpec::new("червоний", Category::Cognitive);

    run_trial(&mut session, &mut responder, 0, TrialRequest::scored(red, Stage::Reference));
    let show = &session.log.records()[0];
    assert_eq!(show.event, EventType::Show);
    assert!(show.payload.contains("color=green"));
    assert!(show.payload.contains("pos=1"));
}

#[test]
fn test_overlapping_holds_stay_with_their_trials() {
    let mut session = SessionState::new("p", fixed_pause_config(), vec![], EventLog::new(Utc::now()), 1);
    let mut responder = ScriptedResponder::constant(Some(KeyAction::new(400, 2000)));
    let mut engine = PresentationEngine::new();
    let mut sched: Scheduler<SessionEvent> = Scheduler::new();
    let cloud = StimulusSpec::new("хмара", Category::Neutral);

    engine
        .begin(&mut session, &mut sched, &mut responder, 0, TrialRequest::scored(knife(), Stage::Main))
        .unwrap();
    let mut begun = 1;
    // Second trial starts while the first key is still held
    while let Some((at, event)) = sched.pop_next() {
        if let Some(closed) = engine.handle(&mut session, &mut sched, at, event) {
            if begun < 2 {
                begun += 1;
                let request = TrialRequest::scored(cloud.clone(), Stage::Main);
                engine
                    .begin(&mut session, &mut sched, &mut responder, closed.at_ms + 300, request)
                    .unwrap();
            }
        }
    }

    let durations: Vec<Option<u64>> = session.results.iter().map(|r| r.press_duration_ms).collect();
    assert_eq!(durations, vec![Some(2000), Some(2000)]);
    let releases: Vec<Option<&str>> = session
        .log
        .records()
        .iter()
        .filter(|r| r.payload.starts_with("press_duration="))
        .map(|r| r.stimulus.as_deref())
        .collect();
    assert_eq!(releases, vec![Some("ніж"), Some("хмара")]);
}

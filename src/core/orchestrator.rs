//! Stage orchestrator: runs the protocol from countdown to main_repeat
//!
//! Flow per stage:
//! - build the block (repeat stages ask the tracker, then prune it)
//! - empty block → straight to the next stage
//! - one trial at a time through the presentation engine
//! - `post_reaction_delay_ms` after each close, check the forced pause,
//!   then request the next trial
//!
//! Leaving adaptation_repeat installs the calibrated pause ranges.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::core::blocks;
use crate::core::clock::{Clock, Scheduler, VirtualClock};
use crate::core::presentation::{
    CountdownKind, PresentationEngine, SessionEvent, TrialClosed, TrialRequest,
};
use crate::core::responder::{RespondentProfile, Responder, SimulatedRespondent};
use crate::core::session::{calibrated_pause_ranges, SessionState};
use crate::types::{Stage, TrialOutput};
use crate::PRE_TEST_COUNTDOWN_SECS;

/// Called after every scored trial closes
pub type TrialObserver = Box<dyn FnMut(&TrialOutput) + Send>;

pub struct StageOrchestrator<C: Clock, R: Responder> {
    clock: C,
    responder: R,
    scheduler: Scheduler<SessionEvent>,
    engine: PresentationEngine,
    session: SessionState,
    queue: VecDeque<TrialRequest>,
    observer: Option<TrialObserver>,
    started: bool,
}

impl<C: Clock, R: Responder> StageOrchestrator<C, R> {
    pub fn new(clock: C, responder: R, session: SessionState) -> Self {
        Self {
            clock,
            responder,
            scheduler: Scheduler::new(),
            engine: PresentationEngine::new(),
            session,
            queue: VecDeque::new(),
            observer: None,
            started: false,
        }
    }

    pub fn with_observer(mut self, observer: TrialObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn engine(&self) -> &PresentationEngine {
        &self.engine
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Items left in the current block
    pub fn remaining_in_block(&self) -> usize {
        self.queue.len()
    }

    /// Live timeline events
    pub fn pending_events(&self) -> usize {
        self.scheduler.pending()
    }

    /// Run the whole protocol and hand back the session
    pub fn run(mut self) -> SessionState {
        while self.step() {}
        self.session
    }

    /// Process one timeline event. Returns false once nothing is left.
    pub fn step(&mut self) -> bool {
        if !self.started {
            self.start();
            return true;
        }
        let Some((at, event)) = self.scheduler.pop_next() else {
            return false;
        };
        self.clock.advance_to(at);
        self.dispatch(at, event);
        true
    }

    /// Run until logical time `until_ms` (events due later stay queued)
    pub fn run_until(&mut self, until_ms: u64) {
        if !self.started {
            self.start();
        }
        while let Some(due) = self.scheduler.next_due() {
            if due > until_ms {
                break;
            }
            self.step();
        }
        self.clock.advance_to(until_ms);
    }

    /// Abrupt termination: drop every pending timer
    pub fn abort(mut self) -> SessionState {
        let now = self.clock.now_ms();
        self.engine.abort(&mut self.scheduler);
        self.scheduler.clear();
        self.session.ended_ms = Some(now);
        self.session.log.warning(now, Some(self.session.stage), "session aborted");
        info!(session = %self.session.session_id, "session aborted");
        self.session
    }

    fn start(&mut self) {
        self.started = true;
        let now = self.clock.now_ms();
        info!(session = %self.session.session_id, "session start");
        self.session.log.info(now, None, format!("session start: {}", self.session.session_id));
        self.scheduler.schedule(
            now,
            0,
            SessionEvent::Countdown {
                kind: CountdownKind::PreTest,
                remaining: PRE_TEST_COUNTDOWN_SECS,
            },
        );
    }

    fn dispatch(&mut self, now: u64, event: SessionEvent) {
        match event {
            SessionEvent::NextTrial => self.request_next(now),
            SessionEvent::Countdown { kind, remaining } => self.countdown(now, kind, remaining),
            SessionEvent::Trial { .. } | SessionEvent::KeyRelease { .. } => {
                if let Some(closed) = self.engine.handle(&mut self.session, &mut self.scheduler, now, event) {
                    self.on_trial_closed(closed);
                }
            }
        }
    }

    /// Key down from an external driver
    pub fn key_press(&mut self) {
        let now = self.clock.now_ms();
        if let Some(closed) = self.engine.key_press(&mut self.session, &mut self.scheduler, now) {
            self.on_trial_closed(closed);
        }
    }

    /// Key up from an external driver
    pub fn key_release(&mut self) -> Option<u64> {
        let now = self.clock.now_ms();
        self.engine.key_release(&mut self.session, now)
    }

    fn countdown(&mut self, now: u64, kind: CountdownKind, remaining: u32) {
        let stage = Some(self.session.stage);
        if remaining == 0 {
            match kind {
                CountdownKind::PreTest => self.begin_stage(now, Stage::Adaptation),
                CountdownKind::ForcedPause => {
                    self.session.log.info(now, stage, "pause end");
                    self.request_next(now);
                }
            }
            return;
        }
        let label = match kind {
            CountdownKind::PreTest => "countdown",
            CountdownKind::ForcedPause => "pause",
        };
        self.session.log.info(now, stage, format!("{}: {}", label, remaining));
        self.scheduler.schedule(
            now,
            1000,
            SessionEvent::Countdown {
                kind,
                remaining: remaining - 1,
            },
        );
    }

    fn begin_stage(&mut self, now: u64, stage: Stage) {
        self.session.stage = stage;
        if stage == Stage::Adaptation {
            self.session.test_start_ms = Some(now);
            self.session.last_pause_ms = now;
        }

        let specs = self.build_block(stage);
        if stage.is_repeat() {
            let pruned = self.session.tracker.prune();
            debug!(%stage, pruned, "tracker pruned");
        }

        if specs.is_empty() {
            info!(%stage, "empty block, skipping");
            self.session.log.info(now, Some(stage), "nothing to present, stage skipped");
            self.end_stage(now);
            return;
        }

        info!(%stage, items = specs.len(), "stage start");
        self.session
            .log
            .info(now, Some(stage), format!("stage start: {} items", specs.len()));
        self.queue = specs
            .into_iter()
            .map(|spec| {
                if stage == Stage::Preparation {
                    TrialRequest::relaxation(spec, stage)
                } else {
                    TrialRequest::scored(spec, stage)
                }
            })
            .collect();
        self.request_next(now);
    }

    fn build_block(&mut self, stage: Stage) -> Vec<crate::types::StimulusSpec> {
        let session = &mut self.session;
        let config = &session.config;
        let rng = &mut session.rng;
        match stage {
            Stage::Adaptation => blocks::adaptation_block(config),
            Stage::Preparation => blocks::preparation_block(config, rng),
            Stage::Calibration => blocks::calibration_block(config, rng),
            Stage::Reference => blocks::reference_block(config, rng),
            Stage::Main => blocks::main_block(config, &session.stimuli, rng),
            Stage::AdaptationRepeat
            | Stage::CalibrationRepeat
            | Stage::ReferenceRepeat
            | Stage::MainRepeat => {
                blocks::repeat_block(stage, &session.tracker, &config.buffer_spec(), rng)
            }
        }
    }

    fn end_stage(&mut self, now: u64) {
        let stage = self.session.stage;
        self.session.log.info(now, Some(stage), "stage end");

        if stage == Stage::AdaptationRepeat {
            let table = calibrated_pause_ranges(self.session.results_for(Stage::Adaptation));
            let (lo, hi) = (table.default.lo(), table.default.hi());
            info!(lo, hi, "pause ranges calibrated");
            self.session
                .log
                .info(now, Some(stage), format!("pause ranges calibrated: [{}, {}]", lo, hi));
            self.session.config.pause_range_ms = table;
        }

        match stage.next() {
            Some(next) => self.begin_stage(now, next),
            None => self.finish(now),
        }
    }

    fn finish(&mut self, now: u64) {
        self.session.finished = true;
        self.session.ended_ms = Some(now);
        self.queue.clear();
        info!(
            session = %self.session.session_id,
            trials = self.session.results.len(),
            "test finished"
        );
        self.session.log.info(now, None, "test finished");
    }

    fn request_next(&mut self, now: u64) {
        if self.session.finished {
            return;
        }
        if self.session.pause_due(now) {
            self.session.last_pause_ms = now;
            let secs = self.session.config.pause_countdown_secs;
            info!(at_ms = now, "forced pause");
            self.session
                .log
                .info(now, Some(self.session.stage), format!("pause start ({} s)", secs));
            self.countdown(now, CountdownKind::ForcedPause, secs);
            return;
        }
        match self.queue.pop_front() {
            Some(request) => {
                self.engine.begin(
                    &mut self.session,
                    &mut self.scheduler,
                    &mut self.responder,
                    now,
                    request,
                );
            }
            None => self.end_stage(now),
        }
    }

    fn on_trial_closed(&mut self, closed: TrialClosed) {
        if let (Some(index), Some(observer)) = (closed.result_index, self.observer.as_mut()) {
            let result = self.session.results[index].clone();
            let output = TrialOutput::new(self.session.log.timestamp(closed.at_ms), closed.at_ms, result);
            observer(&output);
        }
        self.scheduler.schedule(
            closed.at_ms,
            self.session.config.post_reaction_delay_ms,
            SessionEvent::NextTrial,
        );
    }
}

/// Run a whole session on the virtual clock with a seeded simulated respondent
pub fn simulate(session: SessionState, seed: u64, profile: RespondentProfile) -> SessionState {
    let respondent = SimulatedRespondent::with_profile(seed.wrapping_add(1), profile);
    StageOrchestrator::new(VirtualClock::new(), respondent, session).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{MsRange, TestConfig};
    use crate::core::journal::EventLog;
    use crate::core::responder::{KeyAction, ScriptedResponder};
    use crate::types::{Category, EventType, StimulusSpec};
    use chrono::{TimeZone, Utc};

    /// Presses at 400 ms except on one category
    struct Skips(Category);

    impl Responder for Skips {
        fn respond(&mut self, spec: &StimulusSpec, _stage: Stage) -> Option<KeyAction> {
            (spec.category != self.0).then(|| KeyAction::new(400, 100))
        }
    }

    fn session(config: TestConfig) -> SessionState {
        let epoch = Utc.with_ymd_and_hms(2025, 7, 17, 9, 0, 0).unwrap();
        let stimuli = crate::core::config::builtin_stimuli("ua");
        SessionState::new("orch", config, stimuli, EventLog::new(epoch), 9)
    }

    fn steady() -> ScriptedResponder {
        ScriptedResponder::constant(Some(KeyAction::new(400, 100)))
    }

    fn infos<'a>(session: &'a SessionState, needle: &'a str) -> impl Iterator<Item = &'a crate::types::LogRecord> {
        session
            .log
            .records()
            .iter()
            .filter(move |r| r.event == EventType::Info && r.payload.contains(needle))
    }

    #[test]
    fn test_full_run_positions_are_contiguous() {
        let done = StageOrchestrator::new(VirtualClock::new(), steady(), session(TestConfig::default())).run();
        assert!(done.finished);
        assert!(!done.results.is_empty());
        for (i, r) in done.results.iter().enumerate() {
            assert_eq!(r.sequence_position, i as u64 + 1);
            assert!(r.is_consistent());
        }
        // Preparation never produces results
        assert_eq!(done.results_for(Stage::Preparation).count(), 0);
    }

    #[test]
    fn test_clean_run_skips_empty_repeats() {
        let done = StageOrchestrator::new(VirtualClock::new(), steady(), session(TestConfig::default())).run();
        assert_eq!(infos(&done, "stage skipped").count(), 3);
        for stage in [Stage::AdaptationRepeat, Stage::ReferenceRepeat, Stage::MainRepeat] {
            assert_eq!(done.results_for(stage).count(), 0);
        }
        // Calibration words were seen once, so each comes back twice
        let words = done
            .results_for(Stage::CalibrationRepeat)
            .filter(|r| r.category == Category::Neutral)
            .count();
        assert_eq!(words, 12);
    }

    #[test]
    fn test_pause_ranges_calibrated_after_adaptation() {
        let done = StageOrchestrator::new(VirtualClock::new(), steady(), session(TestConfig::default())).run();
        // m = 400, no misses
        assert_eq!(done.config.pause_range_ms.get(Category::Neutral), MsRange(600, 1100));
        assert_eq!(done.config.pause_range_ms.get(Category::Sensitive), MsRange(700, 1100));
        assert_eq!(done.config.pause_range_ms.get(Category::Cognitive), MsRange(800, 1100));
    }

    #[test]
    fn test_missed_words_come_back_in_main_repeat() {
        let done = StageOrchestrator::new(VirtualClock::new(), Skips(Category::Sensitive), session(TestConfig::default())).run();
        let repeated: Vec<_> = done
            .results_for(Stage::MainRepeat)
            .filter(|r| r.category != Category::Buffer)
            .collect();
        // 3 attempts, 0 valid: min(3 - 0, 5 - 3) = 2 copies each
        assert_eq!(repeated.len(), 10);
        assert!(repeated.iter().all(|r| r.category == Category::Sensitive && r.miss));
        let knife = StimulusSpec::new("ніж", Category::Sensitive);
        assert_eq!(done.tracker.tally(&knife).map(|t| t.attempts), Some(5));
        assert!(!done.tracker.is_eligible(&knife));
    }

    #[test]
    fn test_forced_pause_interrupts_and_resets() {
        let config = TestConfig {
            pause_interval_min: 1,
            pause_countdown_secs: 2,
            ..TestConfig::default()
        };
        let done = StageOrchestrator::new(VirtualClock::new(), steady(), session(config)).run();
        let starts: Vec<_> = infos(&done, "pause start").map(|r| r.timestamp).collect();
        let ends: Vec<_> = infos(&done, "pause end").map(|r| r.timestamp).collect();
        assert!(starts.len() >= 2);
        assert_eq!(starts.len(), ends.len());
        for (start, end) in starts.iter().zip(&ends) {
            assert_eq!((*end - *start).num_milliseconds(), 2000);
        }
        for pair in starts.windows(2) {
            assert!((pair[1] - pair[0]).num_milliseconds() >= 60_000);
        }
        // Nothing shown during a pause
        for (start, end) in starts.iter().zip(&ends) {
            assert!(!done
                .log
                .records()
                .iter()
                .any(|r| r.event == EventType::Show && r.timestamp > *start && r.timestamp < *end));
        }
    }

    #[test]
    fn test_countdown_precedes_first_probe() {
        let done = StageOrchestrator::new(VirtualClock::new(), steady(), session(TestConfig::default())).run();
        let epoch = done.epoch();
        let first_show = done
            .log
            .records()
            .iter()
            .find(|r| r.event == EventType::Show)
            .map(|r| (r.timestamp - epoch).num_milliseconds());
        assert_eq!(first_show, Some(3000));
        assert_eq!(infos(&done, "countdown").count(), 3);
    }

    #[test]
    fn test_observer_sees_every_result() {
        use std::sync::{Arc, Mutex};
        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        let done = StageOrchestrator::new(VirtualClock::new(), steady(), session(TestConfig::default()))
            .with_observer(Box::new(move |_: &TrialOutput| *counter.lock().unwrap() += 1))
            .run();
        assert_eq!(*seen.lock().unwrap(), done.results.len());
    }

    #[test]
    fn test_simulation_is_reproducible() {
        let a = simulate(session(TestConfig::default()), 21, RespondentProfile::default());
        let b = simulate(session(TestConfig::default()), 21, RespondentProfile::default());
        assert!(a.finished);
        assert_eq!(a.results, b.results);
        assert_eq!(a.ended_ms, b.ended_ms);
    }

    #[test]
    fn test_abort_stops_timeline() {
        let mut orch = StageOrchestrator::new(VirtualClock::new(), steady(), session(TestConfig::default()));
        orch.run_until(10_000);
        assert!(orch.pending_events() > 0);
        let aborted = orch.abort();
        assert!(!aborted.finished);
        assert!(aborted.log.records().iter().any(|r| r.event == EventType::Warning));
    }

    #[test]
    fn test_zero_pause_interval_runs_without_pauses() {
        let config = TestConfig {
            pause_interval_min: 0,
            ..TestConfig::default()
        };
        let done = StageOrchestrator::new(VirtualClock::new(), steady(), session(config)).run();
        assert!(done.finished);
        assert!(!done.results.is_empty());
        assert_eq!(infos(&done, "pause start").count(), 0);
    }

    #[test]
    fn test_long_hold_credited_to_its_own_trial() {
        // The key is still down when the next trial's press arrives
        let held = ScriptedResponder::constant(Some(KeyAction::new(400, 2000)));
        let done = StageOrchestrator::new(VirtualClock::new(), held, session(TestConfig::default())).run();
        assert!(done.finished);
        let pressed: Vec<_> = done.results.iter().filter(|r| r.reaction_ms.is_some()).collect();
        assert!(!pressed.is_empty());
        for r in pressed {
            assert_eq!(r.press_duration_ms, Some(2000), "position {}", r.sequence_position);
        }
    }
}

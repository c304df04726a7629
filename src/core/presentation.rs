//! Stimulus presentation engine: one trial at a time
//!
//! State transitions:
//! - IDLE/CLOSED → SHOWING_PROBE: trial requested
//! - SHOWING_PROBE → SHOWING_MASK: probe duration elapsed
//! - SHOWING_MASK → REACTION_WINDOW: mask duration elapsed
//! - any open state → CLOSED: key press, or pause elapsed without one
//!
//! The key is armed from probe onset. The first press wins and closes the
//! trial; closing cancels every timer the trial still has armed.

use rand::Rng;
use tracing::debug;

use crate::core::clock::{Scheduler, TimerHandle};
use crate::core::config::MsRange;
use crate::core::responder::Responder;
use crate::core::session::SessionState;
use crate::types::{
    Classification, MissReason, PresentationState, Stage, StimulusSpec, TrialResult,
};
use crate::{ADAPTATION_LATE_THRESHOLD_MS, PREMATURE_THRESHOLD_MS};

/// How a trial treats the key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialMode {
    /// Key armed, result recorded, sequence position claimed
    Scored,
    /// Show, mask, pause; nothing captured
    Relaxation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialRequest {
    pub spec: StimulusSpec,
    pub stage: Stage,
    pub mode: TrialMode,
}

impl TrialRequest {
    pub fn scored(spec: StimulusSpec, stage: Stage) -> Self {
        Self { spec, stage, mode: TrialMode::Scored }
    }

    pub fn relaxation(spec: StimulusSpec, stage: Stage) -> Self {
        Self { spec, stage, mode: TrialMode::Relaxation }
    }
}

/// Timers scoped to one trial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialTimer {
    ProbeElapsed,
    MaskElapsed,
    PauseElapsed,
    /// Planned press from the responder
    ResponderPress { hold_ms: u64 },
}

/// Countdown purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownKind {
    PreTest,
    ForcedPause,
}

/// Everything that can sit on the session timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Trial { trial: u64, timer: TrialTimer },
    /// Release of the press recorded at `index` in the session results
    KeyRelease { index: usize, pressed_at: u64 },
    /// Post-reaction delay over, request the next trial
    NextTrial,
    Countdown { kind: CountdownKind, remaining: u32 },
}

/// Notification that a trial closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialClosed {
    pub trial: u64,
    pub at_ms: u64,
    /// Index into the session results; None for relaxation trials
    pub result_index: Option<usize>,
}

#[derive(Debug)]
struct ActiveTrial {
    id: u64,
    request: TrialRequest,
    shown_at: u64,
    timers: Vec<TimerHandle>,
}

#[derive(Debug, Clone, Copy)]
struct PendingRelease {
    index: usize,
    pressed_at: u64,
}

/// Classify a press by its latency from probe onset
pub fn classify(elapsed_ms: u64, stage: Stage, reaction_window_ms: u64) -> Classification {
    let late_after = if stage.is_adaptation() {
        ADAPTATION_LATE_THRESHOLD_MS
    } else {
        reaction_window_ms
    };
    if elapsed_ms < PREMATURE_THRESHOLD_MS {
        Classification::Premature
    } else if elapsed_ms > late_after {
        Classification::Late
    } else {
        Classification::Ok
    }
}

/// Random digit mask of the given length
pub fn generate_mask<R: Rng>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

fn draw_pause<R: Rng>(rng: &mut R, range: MsRange) -> u64 {
    if range.lo() >= range.hi() {
        range.lo()
    } else {
        rng.gen_range(range.lo()..=range.hi())
    }
}

fn record_release(session: &mut SessionState, pending: PendingRelease, now: u64) -> Option<u64> {
    let duration = now.saturating_sub(pending.pressed_at);
    let result = session.results.get_mut(pending.index)?;
    result.press_duration_ms = Some(duration);
    let (stage, spec) = (result.stage, result.spec());
    session
        .log
        .reaction(now, stage, &spec, format!("press_duration={}", duration));
    Some(duration)
}

/// Per-trial state machine
#[derive(Debug)]
pub struct PresentationEngine {
    state: PresentationState,
    next_id: u64,
    active: Option<ActiveTrial>,
    pending_release: Option<PendingRelease>,
}

impl Default for PresentationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationEngine {
    pub fn new() -> Self {
        Self {
            state: PresentationState::Idle,
            next_id: 1,
            active: None,
            pending_release: None,
        }
    }

    pub fn state(&self) -> PresentationState {
        self.state
    }

    /// Id of the open trial
    pub fn current_trial(&self) -> Option<u64> {
        self.active.as_ref().map(|t| t.id)
    }

    pub fn current_request(&self) -> Option<&TrialRequest> {
        self.active.as_ref().map(|t| &t.request)
    }

    /// Start a trial. Returns its id, or None if one is already open.
    pub fn begin(
        &mut self,
        session: &mut SessionState,
        scheduler: &mut Scheduler<SessionEvent>,
        responder: &mut dyn Responder,
        now: u64,
        request: TrialRequest,
    ) -> Option<u64> {
        if self.state.is_open() {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;

        let scored = request.mode == TrialMode::Scored;
        let spec = &request.spec;
        let position = scored.then(|| session.next_sequence_position());
        let probe_ms = if scored {
            session.config.probe_duration_ms.get(spec.category)
        } else {
            session.config.preparation_probe_ms
        };
        let mask_length = session.config.mask_length;
        let mask = generate_mask(&mut session.rng, mask_length);
        let color = session.config.stroop_color(spec).to_string();

        let payload = match position {
            Some(pos) => format!("start|pos={}|probe={}|color={}|mask={}", pos, probe_ms, color, mask),
            None => format!("start|probe={}|color={}|mask={}", probe_ms, color, mask),
        };
        session.log.show(now, request.stage, spec, payload);

        let mut timers = vec![scheduler.schedule(
            now,
            probe_ms,
            SessionEvent::Trial { trial: id, timer: TrialTimer::ProbeElapsed },
        )];
        if scored {
            if let Some(action) = responder.respond(spec, request.stage) {
                timers.push(scheduler.schedule(
                    now,
                    action.press_after_ms,
                    SessionEvent::Trial {
                        trial: id,
                        timer: TrialTimer::ResponderPress { hold_ms: action.hold_ms },
                    },
                ));
            }
        }

        debug!(trial = id, stage = %request.stage, stimulus = %spec.value, "probe shown");
        self.active = Some(ActiveTrial {
            id,
            request,
            shown_at: now,
            timers,
        });
        self.state = PresentationState::ShowingProbe;
        Some(id)
    }

    /// Feed a timeline event. Returns the close notice if the trial ended.
    pub fn handle(
        &mut self,
        session: &mut SessionState,
        scheduler: &mut Scheduler<SessionEvent>,
        now: u64,
        event: SessionEvent,
    ) -> Option<TrialClosed> {
        match event {
            SessionEvent::KeyRelease { index, pressed_at } => {
                if self.pending_release.map(|p| p.index) == Some(index) {
                    self.pending_release = None;
                }
                record_release(session, PendingRelease { index, pressed_at }, now);
                None
            }
            SessionEvent::Trial { trial, timer } => {
                if self.current_trial() != Some(trial) {
                    return None;
                }
                match timer {
                    TrialTimer::ProbeElapsed => {
                        self.on_probe_elapsed(session, scheduler, now);
                        None
                    }
                    TrialTimer::MaskElapsed => {
                        self.on_mask_elapsed(session, scheduler, now);
                        None
                    }
                    TrialTimer::PauseElapsed => self.on_pause_elapsed(session, scheduler, now),
                    TrialTimer::ResponderPress { hold_ms } => {
                        let closed = self.key_press(session, scheduler, now)?;
                        if let Some(index) = closed.result_index {
                            scheduler.schedule(now, hold_ms, SessionEvent::KeyRelease { index, pressed_at: now });
                        }
                        Some(closed)
                    }
                }
            }
            _ => None,
        }
    }

    fn on_probe_elapsed(&mut self, session: &SessionState, scheduler: &mut Scheduler<SessionEvent>, now: u64) {
        if self.state != PresentationState::ShowingProbe {
            return;
        }
        let Some(trial) = self.active.as_mut() else {
            return;
        };
        let handle = scheduler.schedule(
            now,
            session.config.mask_duration_ms,
            SessionEvent::Trial { trial: trial.id, timer: TrialTimer::MaskElapsed },
        );
        trial.timers.push(handle);
        self.state = PresentationState::ShowingMask;
    }

    fn on_mask_elapsed(&mut self, session: &mut SessionState, scheduler: &mut Scheduler<SessionEvent>, now: u64) {
        if self.state != PresentationState::ShowingMask {
            return;
        }
        let Some(trial) = self.active.as_mut() else {
            return;
        };
        let request = &trial.request;
        let pause_ms = match request.mode {
            TrialMode::Relaxation => draw_pause(&mut session.rng, session.config.preparation_pause_range_ms),
            TrialMode::Scored if request.stage.is_adaptation() => session.config.adaptation_pause_ms,
            TrialMode::Scored => {
                let range = session.config.pause_range_ms.get(request.spec.category);
                draw_pause(&mut session.rng, range)
            }
        };
        let handle = scheduler.schedule(
            now,
            pause_ms,
            SessionEvent::Trial { trial: trial.id, timer: TrialTimer::PauseElapsed },
        );
        trial.timers.push(handle);
        self.state = PresentationState::ReactionWindow;
    }

    fn on_pause_elapsed(
        &mut self,
        session: &mut SessionState,
        scheduler: &mut Scheduler<SessionEvent>,
        now: u64,
    ) -> Option<TrialClosed> {
        if self.state != PresentationState::ReactionWindow {
            return None;
        }
        let trial = self.active.as_ref()?;
        let request = trial.request.clone();
        if request.mode == TrialMode::Relaxation {
            return Some(self.close(scheduler, now, None));
        }

        let position = session.sequence_position();
        let result = TrialResult::missed(&request.spec, request.stage, position, MissReason::NoResponse, None);
        session.tracker.record_no_response(&request.spec);
        session.log.miss(now, request.stage, &request.spec, MissReason::NoResponse.as_str());
        let index = session.push_result(result);
        debug!(trial = trial.id, "no response");
        Some(self.close(scheduler, now, Some(index)))
    }

    /// Key down. Ignored unless a scored trial is open.
    pub fn key_press(
        &mut self,
        session: &mut SessionState,
        scheduler: &mut Scheduler<SessionEvent>,
        now: u64,
    ) -> Option<TrialClosed> {
        if !self.state.is_open() {
            return None;
        }
        let trial = self.active.as_ref()?;
        if trial.request.mode != TrialMode::Scored {
            return None;
        }
        let request = trial.request.clone();
        let elapsed = now.saturating_sub(trial.shown_at);
        let classification = classify(elapsed, request.stage, session.config.reaction_window_ms);
        let position = session.sequence_position();

        let result = match classification.miss_reason() {
            None => {
                session.log.reaction(now, request.stage, &request.spec, format!("{}|OK", elapsed));
                TrialResult::reaction(&request.spec, request.stage, position, elapsed)
            }
            Some(reason) => {
                session.log.miss(now, request.stage, &request.spec, format!("{}|{}", elapsed, reason));
                TrialResult::missed(&request.spec, request.stage, position, reason, Some(elapsed))
            }
        };
        session.tracker.record_press(&request.spec, classification);
        let index = session.push_result(result);
        self.pending_release = Some(PendingRelease { index, pressed_at: now });
        debug!(trial = trial.id, elapsed, ?classification, "key press");
        Some(self.close(scheduler, now, Some(index)))
    }

    /// Key up. Sets the press duration on the last recorded press.
    pub fn key_release(&mut self, session: &mut SessionState, now: u64) -> Option<u64> {
        let pending = self.pending_release.take()?;
        record_release(session, pending, now)
    }

    fn close(&mut self, scheduler: &mut Scheduler<SessionEvent>, now: u64, result_index: Option<usize>) -> TrialClosed {
        let id = match self.active.take() {
            Some(trial) => {
                for handle in trial.timers {
                    scheduler.cancel(handle);
                }
                trial.id
            }
            None => 0,
        };
        self.state = PresentationState::Closed;
        TrialClosed {
            trial: id,
            at_ms: now,
            result_index,
        }
    }

    /// Drop the open trial and its timers without recording anything
    pub fn abort(&mut self, scheduler: &mut Scheduler<SessionEvent>) {
        if let Some(trial) = self.active.take() {
            for handle in trial.timers {
                scheduler.cancel(handle);
            }
        }
        self.pending_release = None;
        self.state = PresentationState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TestConfig;
    use crate::core::journal::EventLog;
    use crate::core::responder::ScriptedResponder;
    use crate::types::Category;
    use chrono::Utc;
    use rand::SeedableRng;

    fn session() -> SessionState {
        SessionState::new("t", TestConfig::default(), vec![], EventLog::new(Utc::now()), 5)
    }

    fn knife() -> StimulusSpec {
        StimulusSpec::new("ніж", Category::Sensitive)
    }

    #[test]
    fn test_classify_examples() {
        assert_eq!(classify(40, Stage::Main, 2000), Classification::Premature);
        assert_eq!(classify(2500, Stage::Main, 2000), Classification::Late);
        assert_eq!(classify(300, Stage::Main, 2000), Classification::Ok);
        assert_eq!(classify(50, Stage::Main, 2000), Classification::Ok);
        assert_eq!(classify(2000, Stage::Main, 2000), Classification::Ok);
    }

    #[test]
    fn test_adaptation_uses_fixed_late_bound() {
        assert_eq!(classify(1800, Stage::Adaptation, 1500), Classification::Ok);
        assert_eq!(classify(1800, Stage::Main, 1500), Classification::Late);
        assert_eq!(classify(2001, Stage::AdaptationRepeat, 5000), Classification::Late);
    }

    #[test]
    fn test_mask_is_digits() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        let mask = generate_mask(&mut rng, 32);
        assert_eq!(mask.len(), 32);
        assert!(mask.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_probe_mask_window_progression() {
        let mut session = session();
        let mut sched = Scheduler::new();
        let mut engine = PresentationEngine::new();
        let mut nobody = ScriptedResponder::constant(None);
        engine.begin(&mut session, &mut sched, &mut nobody, 0, TrialRequest::scored(knife(), Stage::Main));
        assert_eq!(engine.state(), PresentationState::ShowingProbe);

        let (at, ev) = sched.pop_next().unwrap();
        assert_eq!(at, 60);
        engine.handle(&mut session, &mut sched, at, ev);
        assert_eq!(engine.state(), PresentationState::ShowingMask);

        let (at, ev) = sched.pop_next().unwrap();
        assert_eq!(at, 160);
        engine.handle(&mut session, &mut sched, at, ev);
        assert_eq!(engine.state(), PresentationState::ReactionWindow);

        let (at, ev) = sched.pop_next().unwrap();
        assert!((660..=1660).contains(&at));
        let closed = engine.handle(&mut session, &mut sched, at, ev).unwrap();
        assert_eq!(engine.state(), PresentationState::Closed);
        let result = &session.results[closed.result_index.unwrap()];
        assert_eq!(result.miss_reason, Some(MissReason::NoResponse));
        assert_eq!(result.elapsed_ms, None);
        assert!(sched.is_empty());
    }

    #[test]
    fn test_press_closes_and_cancels_timers() {
        let mut session = session();
        let mut sched = Scheduler::new();
        let mut engine = PresentationEngine::new();
        let mut nobody = ScriptedResponder::constant(None);
        engine.begin(&mut session, &mut sched, &mut nobody, 1000, TrialRequest::scored(knife(), Stage::Main));
        let closed = engine.key_press(&mut session, &mut sched, 1300).unwrap();
        assert_eq!(session.results[closed.result_index.unwrap()].reaction_ms, Some(300));
        assert_eq!(session.tracker.tally(&knife()).unwrap().valid_count, 1);
        assert!(sched.is_empty());

        // Second press in the same trial is ignored
        assert!(engine.key_press(&mut session, &mut sched, 1400).is_none());
        assert_eq!(session.results.len(), 1);
    }

    #[test]
    fn test_release_sets_press_duration() {
        let mut session = session();
        let mut sched = Scheduler::new();
        let mut engine = PresentationEngine::new();
        let mut nobody = ScriptedResponder::constant(None);
        engine.begin(&mut session, &mut sched, &mut nobody, 0, TrialRequest::scored(knife(), Stage::Main));
        engine.key_press(&mut session, &mut sched, 20);
        assert_eq!(engine.key_release(&mut session, 140), Some(120));
        assert_eq!(session.results[0].press_duration_ms, Some(120));
        assert_eq!(session.results[0].miss_reason, Some(MissReason::Premature));
        // Only one release per press
        assert_eq!(engine.key_release(&mut session, 200), None);
    }

    #[test]
    fn test_relaxation_ignores_key() {
        let mut session = session();
        let mut sched = Scheduler::new();
        let mut engine = PresentationEngine::new();
        let mut nobody = ScriptedResponder::constant(None);
        let spec = StimulusSpec::new("тиша", Category::Neutral);
        engine.begin(&mut session, &mut sched, &mut nobody, 0, TrialRequest::relaxation(spec, Stage::Preparation));
        assert!(engine.key_press(&mut session, &mut sched, 100).is_none());
        let mut closed = None;
        while let Some((at, ev)) = sched.pop_next() {
            closed = engine.handle(&mut session, &mut sched, at, ev);
        }
        assert_eq!(closed.unwrap().result_index, None);
        assert!(session.results.is_empty());
        assert_eq!(session.sequence_position(), 0);
    }

    #[test]
    fn test_cannot_begin_while_open() {
        let mut session = session();
        let mut sched = Scheduler::new();
        let mut engine = PresentationEngine::new();
        let mut nobody = ScriptedResponder::constant(None);
        assert!(engine.begin(&mut session, &mut sched, &mut nobody, 0, TrialRequest::scored(knife(), Stage::Main)).is_some());
        assert!(engine.begin(&mut session, &mut sched, &mut nobody, 10, TrialRequest::scored(knife(), Stage::Main)).is_none());
    }
}

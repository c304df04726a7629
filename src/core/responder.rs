//! Sources of key presses
//!
//! The presentation engine asks the responder once per scored trial, at
//! probe onset, when the key will go down and how long it will be held.
//! `None` means no press at all.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::types::{Category, Stage, StimulusSpec};

/// One planned key press, relative to probe onset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAction {
    pub press_after_ms: u64,
    pub hold_ms: u64,
}

impl KeyAction {
    pub fn new(press_after_ms: u64, hold_ms: u64) -> Self {
        Self { press_after_ms, hold_ms }
    }
}

pub trait Responder {
    fn respond(&mut self, spec: &StimulusSpec, stage: Stage) -> Option<KeyAction>;
}

impl<R: Responder + ?Sized> Responder for Box<R> {
    fn respond(&mut self, spec: &StimulusSpec, stage: Stage) -> Option<KeyAction> {
        (**self).respond(spec, stage)
    }
}

/// Replays a fixed script, then falls back to a constant answer
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponder {
    script: VecDeque<Option<KeyAction>>,
    fallback: Option<KeyAction>,
}

impl ScriptedResponder {
    pub fn new(script: impl IntoIterator<Item = Option<KeyAction>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback: None,
        }
    }

    /// Same answer for every trial
    pub fn constant(action: Option<KeyAction>) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: action,
        }
    }

    pub fn with_fallback(mut self, action: Option<KeyAction>) -> Self {
        self.fallback = action;
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Responder for ScriptedResponder {
    fn respond(&mut self, _spec: &StimulusSpec, _stage: Stage) -> Option<KeyAction> {
        self.script.pop_front().unwrap_or(self.fallback)
    }
}

/// Tunables for [`SimulatedRespondent`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RespondentProfile {
    pub base_rt_ms: f64,
    pub rt_sd_ms: f64,
    /// Extra latency on sensitive words
    pub sensitive_delay_ms: f64,
    pub hold_ms: f64,
    pub hold_sd_ms: f64,
    /// Extra hold on sensitive words
    pub sensitive_hold_ms: f64,
    pub miss_rate: f64,
    pub sensitive_miss_rate: f64,
    pub premature_rate: f64,
}

impl Default for RespondentProfile {
    fn default() -> Self {
        Self {
            base_rt_ms: 430.0,
            rt_sd_ms: 40.0,
            sensitive_delay_ms: 140.0,
            hold_ms: 110.0,
            hold_sd_ms: 20.0,
            sensitive_hold_ms: 45.0,
            miss_rate: 0.02,
            sensitive_miss_rate: 0.08,
            premature_rate: 0.01,
        }
    }
}

/// Seeded synthetic respondent who hesitates on sensitive words
#[derive(Debug, Clone)]
pub struct SimulatedRespondent {
    rng: ChaCha8Rng,
    profile: RespondentProfile,
}

impl SimulatedRespondent {
    pub fn new(seed: u64) -> Self {
        Self::with_profile(seed, RespondentProfile::default())
    }

    pub fn with_profile(seed: u64, profile: RespondentProfile) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            profile,
        }
    }

    pub fn profile(&self) -> &RespondentProfile {
        &self.profile
    }

    /// Normal draw; a zero or invalid sd gives the mean
    fn normal(&mut self, mean: f64, sd: f64) -> f64 {
        match Normal::new(mean, sd) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => mean,
        }
    }
}

/// Rate clamped to [0, 1]; NaN counts as never
fn chance(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

impl Responder for SimulatedRespondent {
    fn respond(&mut self, spec: &StimulusSpec, _stage: Stage) -> Option<KeyAction> {
        let p = self.profile;
        let sensitive = spec.category == Category::Sensitive;

        let miss_rate = if sensitive { p.sensitive_miss_rate } else { p.miss_rate };
        if self.rng.gen_bool(chance(miss_rate)) {
            return None;
        }

        let hold_mean = p.hold_ms + if sensitive { p.sensitive_hold_ms } else { 0.0 };
        let hold = self.normal(hold_mean, p.hold_sd_ms).max(30.0) as u64;

        if self.rng.gen_bool(chance(p.premature_rate)) {
            let early = self.rng.gen_range(5..crate::PREMATURE_THRESHOLD_MS);
            return Some(KeyAction::new(early, hold));
        }

        let rt_mean = p.base_rt_ms + if sensitive { p.sensitive_delay_ms } else { 0.0 };
        let rt = self.normal(rt_mean, p.rt_sd_ms).max(crate::PREMATURE_THRESHOLD_MS as f64) as u64;
        Some(KeyAction::new(rt, hold))
    }
}

//! Stage block construction
//!
//! Scored words are wrapped `buffer, word, buffer`. Calibration keeps the
//! leading buffer only with a configured probability. Repeat blocks draw
//! from the missed-stimulus tracker.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::config::TestConfig;
use crate::core::tracker::MissedStimulusTracker;
use crate::types::{Category, Stage, StimulusSpec};

/// Surround every item with the buffer pattern
pub fn wrap_with_buffers(items: Vec<StimulusSpec>, buffer: &StimulusSpec) -> Vec<StimulusSpec> {
    let mut block = Vec::with_capacity(items.len() * 3);
    for item in items {
        block.push(buffer.clone());
        block.push(item);
        block.push(buffer.clone());
    }
    block
}

/// `adaptation_buffer_count` raw buffer probes
pub fn adaptation_block(config: &TestConfig) -> Vec<StimulusSpec> {
    vec![config.buffer_spec(); config.adaptation_buffer_count]
}

/// Relaxation words, repeated and shuffled. Never scored.
pub fn preparation_block<R: Rng>(config: &TestConfig, rng: &mut R) -> Vec<StimulusSpec> {
    let mut block: Vec<StimulusSpec> = config
        .relaxation_list()
        .iter()
        .flat_map(|w| std::iter::repeat(StimulusSpec::new(w.clone(), Category::Neutral)).take(config.preparation_repeats))
        .collect();
    block.shuffle(rng);
    block
}

/// First N neutral words, shuffled, each with a trailing buffer and a
/// leading buffer kept with `calibration_buffer_probability`
pub fn calibration_block<R: Rng>(config: &TestConfig, rng: &mut R) -> Vec<StimulusSpec> {
    let mut words: Vec<StimulusSpec> = config
        .neutral_list()
        .iter()
        .take(config.calibration_neutral_count)
        .map(|w| StimulusSpec::new(w.clone(), Category::Neutral))
        .collect();
    words = repeat_all(words, config.calibration_repeats);
    words.shuffle(rng);

    let buffer = config.buffer_spec();
    // NaN falls through clamp and would panic in gen_bool
    let p = match config.calibration_buffer_probability {
        p if p.is_nan() => 0.0,
        p => p.clamp(0.0, 1.0),
    };
    let mut block = Vec::with_capacity(words.len() * 3);
    for word in words {
        if rng.gen_bool(p) {
            block.push(buffer.clone());
        }
        block.push(word);
        block.push(buffer.clone());
    }
    block
}

/// Reference words x `reference_repetitions`, shuffled and wrapped
pub fn reference_block<R: Rng>(config: &TestConfig, rng: &mut R) -> Vec<StimulusSpec> {
    let mut words = repeat_all(config.reference_list(), config.reference_repetitions);
    words.shuffle(rng);
    wrap_with_buffers(words, &config.buffer_spec())
}

/// Main list x `test_repeats`, shuffled and wrapped
pub fn main_block<R: Rng>(config: &TestConfig, stimuli: &[StimulusSpec], rng: &mut R) -> Vec<StimulusSpec> {
    let mut words = repeat_all(stimuli.to_vec(), config.test_repeats);
    words.shuffle(rng);
    wrap_with_buffers(words, &config.buffer_spec())
}

/// Missed keys of the stage's repeat categories, each as many times as the
/// tracker allows. adaptation_repeat items are not wrapped.
pub fn repeat_block<R: Rng>(
    stage: Stage,
    tracker: &MissedStimulusTracker,
    buffer: &StimulusSpec,
    rng: &mut R,
) -> Vec<StimulusSpec> {
    let mut items: Vec<StimulusSpec> = tracker
        .eligible_keys(stage.repeat_categories())
        .into_iter()
        .flat_map(|(spec, qty)| std::iter::repeat(spec).take(qty as usize))
        .collect();
    items.shuffle(rng);
    if stage == Stage::AdaptationRepeat {
        items
    } else {
        wrap_with_buffers(items, buffer)
    }
}

fn repeat_all(words: Vec<StimulusSpec>, times: usize) -> Vec<StimulusSpec> {
    let mut out = Vec::with_capacity(words.len() * times);
    for _ in 0..times {
        out.extend(words.iter().cloned());
    }
    out
}

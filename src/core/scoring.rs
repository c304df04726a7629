//! Scoring engine
//!
//! Turns the trial log into category and stimulus statistics, the named
//! recognition metrics and the ranked tables. Scoring reads the main block
//! (main + main_repeat) in presentation order; the respondent-state block
//! comparison and the log digest read everything.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::core::session::SessionState;
use crate::core::stats::{cv, mean, sample_sd, summarize, welch_p};
use crate::types::{
    AfterEffect, Band, BlockState, Category, CategoryStats, Comparison, Conclusions, Framing, Param,
    RankedRow, RankedTable, RecognitionMetrics, RespondentState, ResponseProfile, SampleStats, Scale,
    ScoredDataset, StimulusSpec, StimulusStats, TrialResult, Verdict,
};
use crate::{
    FATIGUE_CV_RATIO, IV_WEIGHT_CHAR, IV_WEIGHT_INV_KD, IV_WEIGHT_KAZ, IV_WEIGHT_KZ, POS_WEIGHT_CV,
    POS_WEIGHT_MISS, POS_WEIGHT_RUN,
};

// =============================================================================
// TIERS
// =============================================================================

/// Smirnov tier from Kz (strict inequalities)
pub fn smirnov_tier(kz: f64) -> u8 {
    if kz > 1.5 {
        90
    } else if kz > 1.2 {
        80
    } else if kz > 1.0 {
        50
    } else {
        0
    }
}

/// Kostandov tier from Kd (strict inequalities)
pub fn kostandov_tier(kd: f64) -> u8 {
    if kd < 0.6 {
        90
    } else if kd < 0.8 {
        80
    } else if kd < 1.0 {
        50
    } else {
        0
    }
}

/// Luria tier from KAZ and ChAR
pub fn luria_tier(kaz: f64, char_rate: f64) -> u8 {
    if kaz > 1.5 || char_rate > 0.2 {
        90
    } else if kaz > 1.2 || char_rate > 0.1 {
        80
    } else if kaz > 1.0 || char_rate > 0.05 {
        50
    } else {
        0
    }
}

/// IV = 100 × (0.4·Kz + 0.3·(1/Kd) + 0.2·KAZ + 0.1·ChAR); 1/Kd counts as 0 when Kd is 0
pub fn composite_index(kz: f64, kd: f64, kaz: f64, char_rate: f64) -> f64 {
    let inv_kd = if kd > 0.0 { 1.0 / kd } else { 0.0 };
    100.0 * (IV_WEIGHT_KZ * kz + IV_WEIGHT_INV_KD * inv_kd + IV_WEIGHT_KAZ * kaz + IV_WEIGHT_CHAR * char_rate)
}

/// 0.5·cv + 0.3·miss% + 10·longest miss run
pub fn sequence_irregularity(cv: f64, miss_pct: f64, consecutive_misses: u32) -> f64 {
    POS_WEIGHT_CV * cv + POS_WEIGHT_MISS * miss_pct + POS_WEIGHT_RUN * consecutive_misses as f64
}

// =============================================================================
// BASELINE
// =============================================================================

/// Neutral reference the other sets are compared against
#[derive(Debug, Clone, Default)]
struct Baseline {
    reaction: SampleStats,
    reaction_kept: Vec<f64>,
    press: SampleStats,
    press_kept: Vec<f64>,
}

impl Baseline {
    fn from_results(ordered: &[&TrialResult]) -> Self {
        let neutral: Vec<&TrialResult> = ordered
            .iter()
            .copied()
            .filter(|r| r.category == Category::Neutral)
            .collect();
        let (reaction, reaction_kept) = summarize(&reactions(&neutral));
        let (press, press_kept) = summarize(&presses(&neutral));
        Self {
            reaction,
            reaction_kept,
            press,
            press_kept,
        }
    }
}

fn reactions(items: &[&TrialResult]) -> Vec<f64> {
    items.iter().filter_map(|r| r.reaction_ms).map(|ms| ms as f64).collect()
}

fn presses(items: &[&TrialResult]) -> Vec<f64> {
    items.iter().filter_map(|r| r.press_duration_ms).map(|ms| ms as f64).collect()
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// `diff` is the signed distance from the baseline mean, already oriented
fn compare(diff: f64, value: f64, base: &SampleStats, kept: &[f64], base_kept: &[f64]) -> Comparison {
    if kept.is_empty() || base_kept.is_empty() {
        return Comparison::default();
    }
    let effect = if base.mean == 0.0 || value == 0.0 {
        0.0
    } else {
        diff / base.mean * 100.0
    };
    let z = if base.sd > 0.0 && value != 0.0 { diff / base.sd } else { 0.0 };
    Comparison {
        effect,
        z,
        p: welch_p(kept, base_kept),
    }
}

/// Statistics for the items picked by `matches`, in presentation order
fn profile<F>(ordered: &[&TrialResult], baseline: &Baseline, matches: F) -> ResponseProfile
where
    F: Fn(&TrialResult) -> bool,
{
    let picked: Vec<&TrialResult> = ordered.iter().copied().filter(|r| matches(r)).collect();
    let misses = picked.iter().filter(|r| r.miss).count();

    let (reaction, reaction_kept) = summarize(&reactions(&picked));
    let vs_neutral = compare(
        baseline.reaction.mean - reaction.mean,
        reaction.mean,
        &baseline.reaction,
        &reaction_kept,
        &baseline.reaction_kept,
    );

    // Reaction on the buffer right after each answered occurrence
    let mut after_samples = Vec::new();
    for (i, r) in ordered.iter().enumerate() {
        if !matches(r) || r.miss {
            continue;
        }
        if let Some(next) = ordered.get(i + 1) {
            if next.category == Category::Buffer && !next.miss {
                after_samples.extend(next.reaction_ms.map(|ms| ms as f64));
            }
        }
    }
    let after_mean = mean(&after_samples);
    let after_sd = sample_sd(&after_samples);
    let after = AfterEffect {
        stats: SampleStats {
            n: after_samples.len(),
            trimmed: 0,
            mean: after_mean,
            sd: after_sd,
            cv: cv(after_mean, after_sd),
        },
        vs_neutral: compare(
            after_mean - baseline.reaction.mean,
            after_mean,
            &baseline.reaction,
            &after_samples,
            &baseline.reaction_kept,
        ),
    };

    let (press, press_kept) = summarize(&presses(&picked));
    let press_vs_neutral = compare(
        baseline.press.mean - press.mean,
        press.mean,
        &baseline.press,
        &press_kept,
        &baseline.press_kept,
    );

    ResponseProfile {
        trials: picked.len(),
        misses,
        miss_pct: percent(misses, picked.len()),
        reaction,
        vs_neutral,
        after,
        press,
        press_vs_neutral,
    }
}

fn recognition(profile: &ResponseProfile, baseline: &Baseline, pos: f64) -> RecognitionMetrics {
    let nm = baseline.reaction.mean;
    let npm = baseline.press.mean;
    let m = profile.reaction.mean;

    let kz = if nm > 0.0 { m / nm } else { 0.0 };
    let kd = if nm > 0.0 && m > 0.0 { nm / m } else { 0.0 };
    let kaz = if npm > 0.0 { profile.press.mean / npm } else { 0.0 };
    let char_rate = if profile.trials > 0 {
        profile.misses as f64 / profile.trials as f64
    } else {
        0.0
    };
    let delta_tmr = if profile.after.stats.n > 0 {
        profile.after.stats.mean - nm
    } else {
        0.0
    };

    RecognitionMetrics {
        kz,
        kd,
        kaz,
        char_rate,
        delta_tmr,
        pos,
        iv: composite_index(kz, kd, kaz, char_rate),
        smirnov_percent: smirnov_tier(kz),
        kostandov_percent: kostandov_tier(kd),
        luria_percent: luria_tier(kaz, char_rate),
    }
}

fn longest_miss_run<'a, I>(occurrences: I) -> u32
where
    I: IntoIterator<Item = &'a TrialResult>,
{
    let (mut run, mut longest) = (0u32, 0u32);
    for r in occurrences {
        if r.miss {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    longest
}

fn block_state(results: &[TrialResult], adaptation: bool) -> BlockState {
    let block: Vec<&TrialResult> = results
        .iter()
        .filter(|r| if adaptation { r.stage.is_adaptation() } else { r.stage.is_main() })
        .collect();
    let samples = reactions(&block);
    let misses = block.iter().filter(|r| r.miss).count();
    let m = mean(&samples);
    let block_cv = cv(m, sample_sd(&samples));
    let miss_pct = percent(misses, block.len());

    let verdict = match (adaptation, block_cv, miss_pct) {
        (true, c, p) if c < 10.0 && p < 5.0 => Verdict::Ready,
        (false, c, p) if c < 15.0 && p < 5.0 => Verdict::Stable,
        _ => Verdict::Unstable,
    };
    BlockState {
        trials: block.len(),
        mean: m,
        cv: block_cv,
        miss_pct,
        verdict,
    }
}

/// Adaptation(+repeat) against main(+repeat)
pub fn respondent_state(results: &[TrialResult]) -> RespondentState {
    let adaptation = block_state(results, true);
    let main = block_state(results, false);
    RespondentState {
        adaptation,
        main,
        fatigue: main.cv > adaptation.cv * FATIGUE_CV_RATIO,
    }
}

/// SHA-256 over every result, fields separated by a zero byte, hex encoded
pub fn log_digest(results: &[TrialResult]) -> String {
    let mut hasher = Sha256::new();
    for r in results {
        hasher.update(r.sequence_position.to_le_bytes());
        hasher.update(r.stage.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(r.category.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(r.stimulus.as_bytes());
        hasher.update([0u8]);
        hasher.update(r.reaction_ms.unwrap_or(u64::MAX).to_le_bytes());
        hasher.update(r.press_duration_ms.unwrap_or(u64::MAX).to_le_bytes());
        hasher.update([r.miss as u8]);
        hasher.update(r.miss_reason.map(|m| m.as_str()).unwrap_or("").as_bytes());
        hasher.update([0u8]);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

// =============================================================================
// ENGINE
// =============================================================================

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    /// Category whose stimuli are ranked
    ranked: Category,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self {
            ranked: Category::Sensitive,
        }
    }

    /// Rank another category's stimuli instead of the sensitive ones
    pub fn ranking(mut self, category: Category) -> Self {
        self.ranked = category;
        self
    }

    /// Score a result list. Pure: warnings are derived with [`Self::warnings`].
    pub fn score(&self, results: &[TrialResult]) -> ScoredDataset {
        let mut ordered: Vec<&TrialResult> = results.iter().filter(|r| r.stage.is_main()).collect();
        ordered.sort_by_key(|r| r.sequence_position);

        let baseline = Baseline::from_results(&ordered);

        let categories: Vec<CategoryStats> = Category::ALL
            .iter()
            .copied()
            .filter(|c| ordered.iter().any(|r| r.category == *c))
            .map(|category| CategoryStats {
                category,
                profile: profile(&ordered, &baseline, |r| r.category == category),
            })
            .collect();

        let keys: BTreeSet<StimulusSpec> = ordered
            .iter()
            .filter(|r| r.category != Category::Buffer)
            .map(|r| r.spec())
            .collect();
        let stimuli: Vec<StimulusStats> = keys
            .into_iter()
            .map(|spec| self.stimulus_stats(&ordered, &baseline, spec))
            .collect();

        let unreliable: Vec<String> = stimuli
            .iter()
            .filter(|s| s.is_unreliable())
            .map(|s| s.stimulus.clone())
            .collect();

        let ranked: Vec<&StimulusStats> = stimuli
            .iter()
            .filter(|s| s.category == self.ranked && !s.is_unreliable())
            .collect();
        let mut tables = Vec::with_capacity(8);
        for framing in [Framing::Recognition, Framing::Significance] {
            for scale in [Scale::Composite, Scale::Smirnov, Scale::Kostandov, Scale::Luria] {
                tables.push(ranked_table(&ranked, scale, framing));
            }
        }
        let conclusions = conclusions(&ranked);

        ScoredDataset {
            log_digest: log_digest(results),
            categories,
            stimuli,
            tables,
            unreliable,
            respondent: respondent_state(results),
            conclusions,
        }
    }

    fn stimulus_stats(&self, ordered: &[&TrialResult], baseline: &Baseline, spec: StimulusSpec) -> StimulusStats {
        let is_it = |r: &TrialResult| r.category == spec.category && r.stimulus == spec.value;
        let profile = profile(ordered, baseline, is_it);
        let consecutive_misses = longest_miss_run(ordered.iter().copied().filter(|r| is_it(r)));
        let pos = sequence_irregularity(profile.reaction.cv, profile.miss_pct, consecutive_misses);
        let recognition = recognition(&profile, baseline, pos);
        StimulusStats {
            stimulus: spec.value,
            category: spec.category,
            profile,
            consecutive_misses,
            sequence_irregularity: pos,
            recognition,
        }
    }

    /// Operator warnings for a scored dataset
    pub fn warnings(&self, dataset: &ScoredDataset) -> Vec<String> {
        let mut out = Vec::new();
        if dataset.categories.is_empty() {
            out.push("no main-block data to analyse".to_string());
        }
        for s in dataset.stimuli.iter().filter(|s| s.is_unreliable()) {
            out.push(format!(
                "stimulus {} ({}) has {:.1}% misses, marked unreliable",
                s.stimulus, s.category, s.profile.miss_pct
            ));
        }
        out
    }

    /// Score a session and record the warnings in its event log
    pub fn score_session(&self, session: &mut SessionState, at_ms: u64) -> ScoredDataset {
        let dataset = self.score(&session.results);
        for message in self.warnings(&dataset) {
            warn!(session = %session.session_id, "{}", message);
            session.log.warning(at_ms, None, message);
        }
        dataset
    }
}

fn ranked_table(stimuli: &[&StimulusStats], scale: Scale, framing: Framing) -> RankedTable {
    let mut rows: Vec<RankedRow> = stimuli
        .iter()
        .map(|s| {
            let m = &s.recognition;
            let (params, score) = match scale {
                Scale::Composite => (
                    vec![
                        Param::new("Kz", m.kz),
                        Param::new("Kd", m.kd),
                        Param::new("KAZ", m.kaz),
                        Param::new("ChAR", m.char_rate),
                        Param::new("dTMR", m.delta_tmr),
                        Param::new("POS", m.pos),
                    ],
                    m.iv,
                ),
                Scale::Smirnov => (vec![Param::new("Kz", m.kz)], m.smirnov_percent as f64),
                Scale::Kostandov => (vec![Param::new("Kd", m.kd)], m.kostandov_percent as f64),
                Scale::Luria => (
                    vec![Param::new("KAZ", m.kaz), Param::new("ChAR", m.char_rate)],
                    m.luria_percent as f64,
                ),
            };
            let band = Band::from_percent(score);
            RankedRow {
                stimulus: s.stimulus.clone(),
                params,
                score,
                band,
                label: band.label(framing).to_string(),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.score.total_cmp(&a.score));
    RankedTable { scale, framing, rows }
}

fn conclusions(ranked: &[&StimulusStats]) -> Conclusions {
    let mut out = Conclusions::default();
    let mut by_iv: Vec<&&StimulusStats> = ranked.iter().collect();
    by_iv.sort_by(|a, b| b.recognition.iv.total_cmp(&a.recognition.iv));
    for s in by_iv {
        match Band::from_percent(s.recognition.iv) {
            Band::High => out.high.push(s.stimulus.clone()),
            Band::Probable => out.probable.push(s.stimulus.clone()),
            _ => {}
        }
    }
    out
}

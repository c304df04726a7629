//! Test configuration and stimulus list loading
//!
//! Every option lives in [`TestConfig`] with its default. Files are TOML or
//! JSON, picked by extension; missing keys fall back to the defaults.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::core::error::{ProbeError, Result};
use crate::types::{Category, StimulusSpec, ValidationReason, ValidationResult};

/// Minimum stimuli per required category in a stimulus list
pub const MIN_STIMULI_PER_CATEGORY: usize = 5;

/// Inclusive millisecond range, written as `[lo, hi]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsRange(pub u64, pub u64);

impl MsRange {
    pub fn lo(&self) -> u64 {
        self.0
    }

    pub fn hi(&self) -> u64 {
        self.1
    }

    pub fn is_valid(&self) -> bool {
        self.0 <= self.1
    }
}

/// Probe duration when neither the category nor the file sets one
pub const DEFAULT_PROBE_MS: u64 = 60;

/// Inter-trial pause range when neither the category nor the file sets one
pub const DEFAULT_PAUSE_RANGE_MS: MsRange = MsRange(500, 1500);

/// Per-category value with a fallback
///
/// In a config file any key may be left out, `default` included; a missing
/// `default` keeps the built-in value for that table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTable<T> {
    pub default: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neutral: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cognitive: Option<T>,
}

/// A table as written in a file, every key optional
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialTable<T> {
    default: Option<T>,
    buffer: Option<T>,
    neutral: Option<T>,
    sensitive: Option<T>,
    positive: Option<T>,
    cognitive: Option<T>,
}

impl<T> PartialTable<T> {
    fn with_fallback(self, fallback: T) -> CategoryTable<T> {
        CategoryTable {
            default: self.default.unwrap_or(fallback),
            buffer: self.buffer,
            neutral: self.neutral,
            sensitive: self.sensitive,
            positive: self.positive,
            cognitive: self.cognitive,
        }
    }
}

fn duration_table<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<CategoryTable<u64>, D::Error> {
    Ok(PartialTable::deserialize(d)?.with_fallback(DEFAULT_PROBE_MS))
}

fn pause_table<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<CategoryTable<MsRange>, D::Error> {
    Ok(PartialTable::deserialize(d)?.with_fallback(DEFAULT_PAUSE_RANGE_MS))
}

impl<T: Copy> CategoryTable<T> {
    /// Same value for every category
    pub fn uniform(default: T) -> Self {
        Self {
            default,
            buffer: None,
            neutral: None,
            sensitive: None,
            positive: None,
            cognitive: None,
        }
    }

    fn slot(&self, category: Category) -> &Option<T> {
        match category {
            Category::Buffer => &self.buffer,
            Category::Neutral => &self.neutral,
            Category::Sensitive => &self.sensitive,
            Category::Positive => &self.positive,
            Category::Cognitive => &self.cognitive,
        }
    }

    /// Category value, falling back to the default
    pub fn get(&self, category: Category) -> T {
        self.slot(category).unwrap_or(self.default)
    }

    pub fn set(&mut self, category: Category, value: T) {
        let slot = match category {
            Category::Buffer => &mut self.buffer,
            Category::Neutral => &mut self.neutral,
            Category::Sensitive => &mut self.sensitive,
            Category::Positive => &mut self.positive,
            Category::Cognitive => &mut self.cognitive,
        };
        *slot = Some(value);
    }

    /// Default first, then the explicitly set categories
    pub fn values(&self) -> Vec<T> {
        let mut out = vec![self.default];
        out.extend(Category::ALL.iter().filter_map(|c| *self.slot(*c)));
        out
    }
}

/// Reference block words for one language
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceWords {
    pub sensitive: Vec<String>,
    pub neutral: Vec<String>,
    pub cognitive: Vec<String>,
}

impl ReferenceWords {
    /// (word, category) pairs in sensitive, neutral, cognitive order
    pub fn specs(&self) -> Vec<StimulusSpec> {
        let tagged = [
            (&self.sensitive, Category::Sensitive),
            (&self.neutral, Category::Neutral),
            (&self.cognitive, Category::Cognitive),
        ];
        tagged
            .iter()
            .flat_map(|(words, cat)| words.iter().map(move |w| StimulusSpec::new(w.clone(), *cat)))
            .collect()
    }
}

/// Complete test configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Session language key into the word lists
    pub lang: String,
    pub bg_color: String,

    // Buffer and adaptation
    pub buffer_symbols: String,
    pub adaptation_buffer_count: usize,
    pub adaptation_pause_ms: u64,

    // Trial timing
    #[serde(deserialize_with = "duration_table")]
    pub probe_duration_ms: CategoryTable<u64>,
    pub mask_duration_ms: u64,
    pub mask_length: usize,
    pub reaction_window_ms: u64,
    #[serde(deserialize_with = "pause_table")]
    pub pause_range_ms: CategoryTable<MsRange>,
    pub post_reaction_delay_ms: u64,

    // Retry and pauses
    pub max_miss_attempts: u32,
    pub pause_interval_min: u64,
    pub pause_countdown_secs: u32,

    // Preparation
    pub preparation_repeats: usize,
    pub preparation_probe_ms: u64,
    pub preparation_pause_range_ms: MsRange,

    // Calibration
    pub calibration_neutral_count: usize,
    pub calibration_repeats: usize,
    pub calibration_buffer_probability: f64,

    // Reference and main
    pub reference_repetitions: usize,
    pub test_repeats: usize,

    // Word lists, keyed by language
    pub relaxation_words: BTreeMap<String, Vec<String>>,
    pub neutral_words: BTreeMap<String, Vec<String>>,
    pub reference_words: BTreeMap<String, ReferenceWords>,
    /// Display colour per cognitive word, keyed by language
    pub stroop_colors: BTreeMap<String, BTreeMap<String, String>>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

fn colors(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(w, c)| (w.to_string(), c.to_string()))
        .collect()
}

impl Default for TestConfig {
    fn default() -> Self {
        let mut relaxation_words = BTreeMap::new();
        relaxation_words.insert("ua".to_string(), words(&["спокій", "тиша", "море", "небо"]));
        relaxation_words.insert("ru".to_string(), words(&["покой", "тишина", "море", "небо"]));

        let mut neutral_words = BTreeMap::new();
        neutral_words.insert(
            "ua".to_string(),
            words(&["стіл", "вікно", "дерево", "книга", "олівець", "двері", "лампа"]),
        );
        neutral_words.insert(
            "ru".to_string(),
            words(&["стол", "окно", "дерево", "книга", "карандаш", "дверь", "лампа"]),
        );

        let mut reference_words = BTreeMap::new();
        reference_words.insert(
            "ua".to_string(),
            ReferenceWords {
                sensitive: words(&["зброя", "гроші", "вибух"]),
                neutral: words(&["стілець", "чашка", "папір"]),
                cognitive: words(&["червоний", "зелений", "синій"]),
            },
        );
        reference_words.insert(
            "ru".to_string(),
            ReferenceWords {
                sensitive: words(&["оружие", "деньги", "взрыв"]),
                neutral: words(&["стул", "чашка", "бумага"]),
                cognitive: words(&["красный", "зелёный", "синий"]),
            },
        );

        let mut stroop_colors = BTreeMap::new();
        stroop_colors.insert(
            "ua".to_string(),
            colors(&[("червоний", "green"), ("зелений", "blue"), ("синій", "red")]),
        );
        stroop_colors.insert(
            "ru".to_string(),
            colors(&[("красный", "green"), ("зелёный", "blue"), ("синий", "red")]),
        );

        Self {
            lang: "ua".to_string(),
            bg_color: "#000000".to_string(),
            buffer_symbols: "01010010110010101001011010011001".to_string(),
            adaptation_buffer_count: 30,
            adaptation_pause_ms: 1000,
            probe_duration_ms: CategoryTable::uniform(DEFAULT_PROBE_MS),
            mask_duration_ms: 100,
            mask_length: 32,
            reaction_window_ms: 2000,
            pause_range_ms: CategoryTable::uniform(DEFAULT_PAUSE_RANGE_MS),
            post_reaction_delay_ms: 300,
            max_miss_attempts: 5,
            pause_interval_min: 5,
            pause_countdown_secs: 10,
            preparation_repeats: 3,
            preparation_probe_ms: 60,
            preparation_pause_range_ms: MsRange(1000, 2000),
            calibration_neutral_count: 6,
            calibration_repeats: 1,
            calibration_buffer_probability: 0.67,
            reference_repetitions: 3,
            test_repeats: 3,
            relaxation_words,
            neutral_words,
            reference_words,
            stroop_colors,
        }
    }
}

impl TestConfig {
    /// Load from a `.toml` or `.json` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        debug!(path = %path.display(), "loading config");
        match ext.as_str() {
            "toml" => Self::from_toml_str(&text),
            "json" => Self::from_json_str(&text),
            other => Err(ProbeError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Check the startup invariants, first failure wins
    pub fn validate(&self) -> ValidationResult {
        if self.buffer_symbols.trim().is_empty() {
            return ValidationResult::failure(ValidationReason::R105_BUFFER_EMPTY, "buffer_symbols");
        }
        if self.max_miss_attempts == 0 {
            return ValidationResult::failure(ValidationReason::R104_ATTEMPT_CAP_ZERO, "max_miss_attempts");
        }
        if self.pause_interval_min == 0 {
            return ValidationResult::failure(ValidationReason::R106_PAUSE_INTERVAL_ZERO, "pause_interval_min");
        }
        if !(0.0..=1.0).contains(&self.calibration_buffer_probability) {
            return ValidationResult::failure(
                ValidationReason::R107_PROBABILITY_INVALID,
                format!("calibration_buffer_probability = {}", self.calibration_buffer_probability),
            );
        }

        if !self.relaxation_words.contains_key(&self.lang) {
            return ValidationResult::failure(ValidationReason::R101_LANGUAGE_MISSING, format!("relaxation_words.{}", self.lang));
        }
        if !self.neutral_words.contains_key(&self.lang) {
            return ValidationResult::failure(ValidationReason::R101_LANGUAGE_MISSING, format!("neutral_words.{}", self.lang));
        }
        if !self.reference_words.contains_key(&self.lang) {
            return ValidationResult::failure(ValidationReason::R101_LANGUAGE_MISSING, format!("reference_words.{}", self.lang));
        }

        // Every language is checked, not only the session one
        for (lang, table) in &self.stroop_colors {
            for (word, color) in table {
                if color.eq_ignore_ascii_case(&self.bg_color) {
                    return ValidationResult::failure(
                        ValidationReason::R102_STROOP_COLOR_INVISIBLE,
                        format!("{}.{} = {}", lang, word, color),
                    );
                }
            }
        }

        if let Some(bad) = self.pause_range_ms.values().into_iter().find(|r| !r.is_valid()) {
            return ValidationResult::failure(
                ValidationReason::R103_RANGE_INVERTED,
                format!("pause_range_ms [{}, {}]", bad.lo(), bad.hi()),
            );
        }
        if !self.preparation_pause_range_ms.is_valid() {
            return ValidationResult::failure(ValidationReason::R103_RANGE_INVERTED, "preparation_pause_range_ms");
        }

        ValidationResult::success()
    }

    /// Display colour of a stimulus; only cognitive words are coloured
    pub fn stroop_color(&self, spec: &StimulusSpec) -> &str {
        if spec.category != Category::Cognitive {
            return "white";
        }
        self.stroop_colors
            .get(&self.lang)
            .and_then(|t| t.get(&spec.value))
            .map(String::as_str)
            .unwrap_or("white")
    }

    pub fn relaxation_list(&self) -> &[String] {
        self.relaxation_words.get(&self.lang).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn neutral_list(&self) -> &[String] {
        self.neutral_words.get(&self.lang).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn reference_list(&self) -> Vec<StimulusSpec> {
        self.reference_words
            .get(&self.lang)
            .map(ReferenceWords::specs)
            .unwrap_or_default()
    }

    pub fn buffer_spec(&self) -> StimulusSpec {
        StimulusSpec::buffer(self.buffer_symbols.clone())
    }

    /// Pause interval in logical ms
    pub fn pause_interval_ms(&self) -> u64 {
        self.pause_interval_min * 60_000
    }
}

// =============================================================================
// STIMULUS LISTS
// =============================================================================

/// Parse `value,category` lines; blank or single-field lines are skipped
pub fn parse_stimuli(text: &str) -> Result<Vec<StimulusSpec>> {
    let mut out = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let mut fields = raw.splitn(2, ',');
        let (value, category) = match (fields.next(), fields.next()) {
            (Some(v), Some(c)) => (v.trim(), c.trim()),
            _ => continue,
        };
        if value.is_empty() {
            return Err(ProbeError::StimulusFormat {
                line,
                reason: "empty stimulus value".to_string(),
            });
        }
        let category = Category::parse(category).ok_or_else(|| {
            ProbeError::Validation(ValidationResult::failure(
                ValidationReason::R113_UNKNOWN_CATEGORY,
                format!("line {}: {}", line, category),
            ))
        })?;
        out.push(StimulusSpec::new(value, category));
    }
    Ok(out)
}

/// Require enough sensitive, neutral and positive stimuli
pub fn validate_stimuli(stimuli: &[StimulusSpec]) -> ValidationResult {
    let required = [
        (Category::Sensitive, ValidationReason::R110_TOO_FEW_SENSITIVE),
        (Category::Neutral, ValidationReason::R111_TOO_FEW_NEUTRAL),
        (Category::Positive, ValidationReason::R112_TOO_FEW_POSITIVE),
    ];
    for (category, reason) in required {
        let count = stimuli.iter().filter(|s| s.category == category).count();
        if count < MIN_STIMULI_PER_CATEGORY {
            return ValidationResult::failure(reason, format!("{} {}", count, category));
        }
    }
    ValidationResult::success()
}

/// Read, parse and validate a stimulus file
pub fn load_stimuli(path: impl AsRef<Path>) -> Result<Vec<StimulusSpec>> {
    let text = std::fs::read_to_string(path)?;
    let stimuli = parse_stimuli(&text)?;
    let check = validate_stimuli(&stimuli);
    if !check.is_valid() {
        return Err(ProbeError::Validation(check));
    }
    Ok(stimuli)
}

/// Demonstration main list for runs without a stimulus file
pub fn builtin_stimuli(lang: &str) -> Vec<StimulusSpec> {
    let (sensitive, neutral, positive): (&[&str], &[&str], &[&str]) = match lang {
        "ru" => (
            &["кража", "нож", "наркотики", "взятка", "побег"],
            &["облако", "ручка", "тарелка", "окно", "шкаф"],
            &["радость", "семья", "отпуск", "солнце", "друг"],
        ),
        _ => (
            &["крадіжка", "ніж", "наркотики", "хабар", "втеча"],
            &["хмара", "ручка", "тарілка", "вікно", "шафа"],
            &["радість", "родина", "відпустка", "сонце", "друг"],
        ),
    };
    let mut out = Vec::new();
    for (list, category) in [
        (sensitive, Category::Sensitive),
        (neutral, Category::Neutral),
        (positive, Category::Positive),
    ] {
        out.extend(list.iter().map(|w| StimulusSpec::new(*w, category)));
    }
    out
}

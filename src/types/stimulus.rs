//! Stimulus definitions

use serde::{Deserialize, Serialize};

/// Semantic category of a stimulus (fixed for the whole session)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Digit-pattern filler around scored stimuli
    Buffer,
    /// Baseline words
    Neutral,
    /// Words under examination
    Sensitive,
    /// Positively loaded control words
    Positive,
    /// Stroop-coloured words
    Cognitive,
}

impl Category {
    /// All categories in canonical order
    pub const ALL: [Category; 5] = [
        Category::Buffer,
        Category::Neutral,
        Category::Sensitive,
        Category::Positive,
        Category::Cognitive,
    ];

    /// Lowercase name used in log lines and stimulus files
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Buffer => "buffer",
            Category::Neutral => "neutral",
            Category::Sensitive => "sensitive",
            Category::Positive => "positive",
            Category::Cognitive => "cognitive",
        }
    }

    /// Parse a category name (case-insensitive)
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(raw))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One stimulus: its text and its category
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StimulusSpec {
    pub value: String,
    pub category: Category,
}

impl StimulusSpec {
    pub fn new(value: impl Into<String>, category: Category) -> Self {
        Self {
            value: value.into(),
            category,
        }
    }

    /// Buffer probe with the given digit pattern
    pub fn buffer(pattern: impl Into<String>) -> Self {
        Self::new(pattern, Category::Buffer)
    }

    pub fn is_buffer(&self) -> bool {
        self.category == Category::Buffer
    }
}

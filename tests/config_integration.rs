//! Integration tests for configuration and stimulus files

use pretty_assertions::assert_eq;
use probe0::core::{load_stimuli, MsRange, ProbeError, TestConfig};
use probe0::types::{Category, ValidationReason};
use std::path::PathBuf;

fn scratch_file(name: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("probe0-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_toml_overrides_and_defaults() {
    let path = scratch_file(
        "partial.toml",
        r#"
lang = "ru"
reaction_window_ms = 1500
max_miss_attempts = 4

[pause_range_ms]
default = [400, 900]
sensitive = [600, 900]

[probe_duration_ms]
default = 60
cognitive = 80
"#,
    );
    let config = TestConfig::load(&path).unwrap();
    assert_eq!(config.lang, "ru");
    assert_eq!(config.reaction_window_ms, 1500);
    assert_eq!(config.max_miss_attempts, 4);
    assert_eq!(config.pause_range_ms.get(Category::Neutral), MsRange(400, 900));
    assert_eq!(config.pause_range_ms.get(Category::Sensitive), MsRange(600, 900));
    assert_eq!(config.probe_duration_ms.get(Category::Cognitive), 80);
    // Untouched keys keep their defaults
    assert_eq!(config.mask_duration_ms, 100);
    assert_eq!(config.test_repeats, 3);
    assert!(config.validate().is_valid());
}

#[test]
fn test_json_config() {
    let path = scratch_file("config.json", r##"{"bg_color": "#ffffff", "pause_interval_min": 2}"##);
    let config = TestConfig::load(&path).unwrap();
    assert_eq!(config.bg_color, "#ffffff");
    assert_eq!(config.pause_interval_ms(), 120_000);
}

#[test]
fn test_unsupported_extension() {
    let path = scratch_file("config.yaml", "lang: ua");
    match TestConfig::load(&path) {
        Err(ProbeError::UnsupportedFormat(ext)) => assert_eq!(ext, "yaml"),
        other => panic!("expected UnsupportedFormat, got {:?}", other),
    }
}

#[test]
fn test_malformed_toml() {
    let path = scratch_file("broken.toml", "lang = ");
    assert!(matches!(TestConfig::load(&path), Err(ProbeError::Toml(_))));
}

#[test]
fn test_stroop_colour_in_other_language_rejected() {
    let path = scratch_file(
        "stroop.toml",
        r##"
bg_color = "#000000"

[stroop_colors.ru]
"красный" = "#000000"
"##,
    );
    let config = TestConfig::load(&path).unwrap();
    let check = config.validate();
    assert_eq!(check.reason, ValidationReason::R102_STROOP_COLOR_INVISIBLE);
}

#[test]
fn test_stimulus_file_round_trip() {
    let path = scratch_file(
        "stimuli.txt",
        "крадіжка,sensitive\nніж,sensitive\nнаркотики,sensitive\nхабар,sensitive\nвтеча,sensitive\n\
         хмара,neutral\nручка,neutral\nтарілка,neutral\nвікно,neutral\nшафа,neutral\n\
         радість,positive\nродина,positive\nвідпустка,positive\nсонце,positive\nдруг,positive\n\
         \n\
         comment line without category\n\
         червоний, Cognitive\n",
    );
    let stimuli = load_stimuli(&path).unwrap();
    assert_eq!(stimuli.len(), 16);
    assert_eq!(stimuli[15].category, Category::Cognitive);
    assert_eq!(stimuli[15].value, "червоний");
}

#[test]
fn test_stimulus_file_too_few_positive() {
    let path = scratch_file(
        "few.txt",
        "a,sensitive\nb,sensitive\nc,sensitive\nd,sensitive\ne,sensitive\n\
         f,neutral\ng,neutral\nh,neutral\ni,neutral\nj,neutral\nk,positive\n",
    );
    match load_stimuli(&path) {
        Err(ProbeError::Validation(check)) => {
            assert_eq!(check.reason, ValidationReason::R112_TOO_FEW_POSITIVE)
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[test]
fn test_stimulus_file_unknown_category() {
    let path = scratch_file("unknown.txt", "ніж,sensitive\nмісяць,lunar\n");
    match load_stimuli(&path) {
        Err(ProbeError::Validation(check)) => {
            assert_eq!(check.reason, ValidationReason::R113_UNKNOWN_CATEGORY)
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}

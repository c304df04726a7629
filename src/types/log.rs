//! Protocol event log records
//!
//! Line format: `timestamp|eventType|stage|stimulus|category|payload`
//! with empty fields where a record has no stage/stimulus/category.

use serde::{Deserialize, Serialize};
use chrono::{DateTime, SecondsFormat, Utc};
use crate::types::{Category, Stage};

/// Kind of protocol event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Show,
    Reaction,
    Miss,
    Info,
    Warning,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Show => "SHOW",
            EventType::Reaction => "REACTION",
            EventType::Miss => "MISS",
            EventType::Info => "INFO",
            EventType::Warning => "WARNING",
            EventType::Error => "ERROR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SHOW" => Some(EventType::Show),
            "REACTION" => Some(EventType::Reaction),
            "MISS" => Some(EventType::Miss),
            "INFO" => Some(EventType::Info),
            "WARNING" => Some(EventType::Warning),
            "ERROR" => Some(EventType::Error),
            _ => None,
        }
    }
}

/// One structured log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub event: EventType,
    pub stage: Option<Stage>,
    pub stimulus: Option<String>,
    pub category: Option<Category>,
    pub payload: String,
}

impl LogRecord {
    /// Session-level record with no stimulus
    pub fn info(timestamp: DateTime<Utc>, event: EventType, stage: Option<Stage>, payload: impl Into<String>) -> Self {
        Self {
            timestamp,
            event,
            stage,
            stimulus: None,
            category: None,
            payload: payload.into(),
        }
    }

    /// Pipe-separated line for persistence
    pub fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.event.as_str(),
            self.stage.map(|s| s.as_str()).unwrap_or(""),
            self.stimulus.as_deref().unwrap_or(""),
            self.category.map(|c| c.as_str()).unwrap_or(""),
            self.payload,
        )
    }
}

impl std::fmt::Display for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_line())
    }
}

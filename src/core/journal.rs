//! Protocol event log
//!
//! Records are kept in memory and mirrored line by line to an optional sink.
//! A failed sink write never stops the session: the failure goes to the
//! diagnostic trail and an ERROR record is appended in memory.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::types::{Category, EventType, LogRecord, Stage, StimulusSpec};

lazy_static! {
    // timestamp|EVENT|stage|stimulus|category|payload
    static ref RE_LOG_LINE: Regex = Regex::new(
        r"^([^|]+)\|([A-Z]+)\|([a-z_]*)\|([^|]*)\|([a-z]*)\|(.*)$"
    ).unwrap();
}

/// Destination for persisted log lines
pub trait LogSink: Send + Sync {
    fn write_line(&mut self, line: &str) -> std::io::Result<()>;
}

/// Appends lines to a file
#[derive(Debug)]
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl LogSink for FileSink {
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        writeln!(self.file, "{}", line)
    }
}

/// Collects lines in a shared buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl LogSink for MemorySink {
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.lines
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "memory sink poisoned"))?
            .push(line.to_string());
        Ok(())
    }
}

/// Append-only session log
pub struct EventLog {
    epoch: DateTime<Utc>,
    records: Vec<LogRecord>,
    sink: Option<Box<dyn LogSink>>,
    diagnostics: Vec<String>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("epoch", &self.epoch)
            .field("records", &self.records.len())
            .field("has_sink", &self.sink.is_some())
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl EventLog {
    /// In-memory log anchored at `epoch` (logical time 0)
    pub fn new(epoch: DateTime<Utc>) -> Self {
        Self {
            epoch,
            records: Vec::new(),
            sink: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_sink(epoch: DateTime<Utc>, sink: Box<dyn LogSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::new(epoch)
        }
    }

    pub fn set_sink(&mut self, sink: Box<dyn LogSink>) {
        self.sink = Some(sink);
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Wall timestamp for a logical instant
    pub fn timestamp(&self, at_ms: u64) -> DateTime<Utc> {
        self.epoch + Duration::milliseconds(at_ms as i64)
    }

    pub fn push(&mut self, record: LogRecord) {
        let line = record.to_line();
        self.records.push(record);
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(err) = sink.write_line(&line) {
            warn!(error = %err, "log write failed");
            let message = format!("log write failed: {}", err);
            self.diagnostics.push(message.clone());
            let stage = self.records.last().and_then(|r| r.stage);
            let failed_at = self.records.last().map(|r| r.timestamp).unwrap_or(self.epoch);
            self.records.push(LogRecord::info(failed_at, EventType::Error, stage, message));
        }
    }

    fn stimulus_record(
        &mut self,
        at_ms: u64,
        event: EventType,
        stage: Stage,
        spec: &StimulusSpec,
        payload: String,
    ) {
        let record = LogRecord {
            timestamp: self.timestamp(at_ms),
            event,
            stage: Some(stage),
            stimulus: Some(spec.value.clone()),
            category: Some(spec.category),
            payload,
        };
        self.push(record);
    }

    pub fn show(&mut self, at_ms: u64, stage: Stage, spec: &StimulusSpec, payload: impl Into<String>) {
        self.stimulus_record(at_ms, EventType::Show, stage, spec, payload.into());
    }

    pub fn reaction(&mut self, at_ms: u64, stage: Stage, spec: &StimulusSpec, payload: impl Into<String>) {
        self.stimulus_record(at_ms, EventType::Reaction, stage, spec, payload.into());
    }

    pub fn miss(&mut self, at_ms: u64, stage: Stage, spec: &StimulusSpec, payload: impl Into<String>) {
        self.stimulus_record(at_ms, EventType::Miss, stage, spec, payload.into());
    }

    pub fn info(&mut self, at_ms: u64, stage: Option<Stage>, message: impl Into<String>) {
        let ts = self.timestamp(at_ms);
        self.push(LogRecord::info(ts, EventType::Info, stage, message));
    }

    pub fn warning(&mut self, at_ms: u64, stage: Option<Stage>, message: impl Into<String>) {
        let ts = self.timestamp(at_ms);
        self.push(LogRecord::info(ts, EventType::Warning, stage, message));
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sink failures, in order
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Every record, one line each
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&record.to_line());
            out.push('\n');
        }
        out
    }
}

/// Parse one persisted line back into a record
pub fn parse_line(line: &str) -> Option<LogRecord> {
    let caps = RE_LOG_LINE.captures(line.trim_end())?;
    let timestamp = DateTime::parse_from_rfc3339(&caps[1]).ok()?.with_timezone(&Utc);
    let event = EventType::parse(&caps[2])?;
    let stage = match &caps[3] {
        "" => None,
        raw => Some(Stage::parse(raw)?),
    };
    let stimulus = match &caps[4] {
        "" => None,
        raw => Some(raw.to_string()),
    };
    let category = match &caps[5] {
        "" => None,
        raw => Some(Category::parse(raw)?),
    };
    Some(LogRecord {
        timestamp,
        event,
        stage,
        stimulus,
        category,
        payload: caps[6].to_string(),
    })
}

/// Parse a whole log file body, skipping lines that do not match
pub fn parse_log(text: &str) -> Vec<LogRecord> {
    text.lines().filter_map(parse_line).collect()
}

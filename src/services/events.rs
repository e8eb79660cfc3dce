//! Durable record of processing passes.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{MailError, Result};
use crate::result::Summary;

/// What happened to one incoming message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProcessEvent {
    /// The message could not be parsed; nothing else ran.
    ParseFailed {
        deliverer: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// Analyzers and handlers ran.
    Processed {
        message_id: Option<String>,
        deliverer: String,
        /// Analyzer result summaries by topic.
        results: BTreeMap<String, Summary>,
        /// Rendered log messages by source.
        log: BTreeMap<String, Vec<String>>,
        timestamp: DateTime<Utc>,
    },
}

impl ProcessEvent {
    pub fn deliverer(&self) -> &str {
        match self {
            Self::ParseFailed { deliverer, .. } | Self::Processed { deliverer, .. } => deliverer,
        }
    }
}

/// Receives one event per processed message.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &ProcessEvent) -> Result<()>;
}

/// Emits events through `tracing`.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: &ProcessEvent) -> Result<()> {
        match serde_json::to_string(event) {
            Ok(json) => info!(target: "mailbounce::events", event = %json, "Processed message"),
            Err(e) => warn!(error = %e, "Could not serialize event"),
        }
        Ok(())
    }
}

/// Appends events as JSON lines to a file.
#[derive(Debug)]
pub struct JsonLinesEventSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesEventSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MailError::io(&path, e))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonLinesEventSink {
    fn record(&self, event: &ProcessEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)
            .map_err(|e| MailError::io(&self.path, std::io::Error::other(e)))?;
        line.push('\n');
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())
            .map_err(|e| MailError::io(&self.path, e))
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<ProcessEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProcessEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: &ProcessEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    fn parse_failed() -> ProcessEvent {
        ProcessEvent::ParseFailed {
            deliverer: "test".into(),
            error: "Failed to split header from body".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemoryEventSink::new();
        sink.record(&parse_failed()).unwrap();
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].deliverer(), "test");
    }

    #[test]
    fn test_json_lines_sink_appends() {
        let dir = assert_fs::TempDir::new().unwrap();
        let log = dir.child("events.jsonl");
        let sink = JsonLinesEventSink::open(log.path()).unwrap();
        sink.record(&parse_failed()).unwrap();
        sink.record(&ProcessEvent::Processed {
            message_id: Some("<id@example.com>".into()),
            deliverer: "test".into(),
            results: BTreeMap::new(),
            log: BTreeMap::new(),
            timestamp: Utc::now(),
        })
        .unwrap();

        log.assert(predicate::str::contains("\"event\":\"parse_failed\""));
        log.assert(predicate::str::contains("\"message_id\":\"<id@example.com>\""));
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}

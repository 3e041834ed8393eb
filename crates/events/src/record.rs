use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relaunch_core::{RunFailureReason, RunId};

use crate::engine::EngineEventData;

/// Severity of an event, as shown to users next to the run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Discriminant of [`RunEventKind`], used to filter event log queries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RunEnqueued,
    RunStart,
    RunSuccess,
    RunFailure,
    RunCanceled,
    StepSuccess,
    StepFailure,
    EngineEvent,
}

/// What happened to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEventKind {
    RunEnqueued,
    RunStart,
    RunSuccess,
    RunFailure { reason: Option<RunFailureReason> },
    RunCanceled,
    StepSuccess { step_key: String },
    StepFailure { step_key: String },
    /// User-visible log entry attached to a run by the framework (as opposed to
    /// step-level execution output).
    EngineEvent(EngineEventData),
}

impl RunEventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            RunEventKind::RunEnqueued => EventType::RunEnqueued,
            RunEventKind::RunStart => EventType::RunStart,
            RunEventKind::RunSuccess => EventType::RunSuccess,
            RunEventKind::RunFailure { .. } => EventType::RunFailure,
            RunEventKind::RunCanceled => EventType::RunCanceled,
            RunEventKind::StepSuccess { .. } => EventType::StepSuccess,
            RunEventKind::StepFailure { .. } => EventType::StepFailure,
            RunEventKind::EngineEvent(_) => EventType::EngineEvent,
        }
    }
}

/// An event ready to be appended to the event log (not yet assigned a storage id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub run_id: RunId,
    pub level: EventLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub kind: RunEventKind,
}

impl NewEvent {
    pub fn new(run_id: RunId, level: EventLevel, message: impl Into<String>, kind: RunEventKind) -> Self {
        Self {
            run_id,
            level,
            message: message.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn engine_event(run_id: RunId, message: impl Into<String>, data: EngineEventData) -> Self {
        let level = if data.error().is_some() {
            EventLevel::Error
        } else {
            EventLevel::Info
        };
        Self::new(run_id, level, message, RunEventKind::EngineEvent(data))
    }

    pub fn with_level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }
}

/// A stored event (assigned a storage id).
///
/// Notes:
/// - `storage_id` is monotonically increasing across the whole log, which makes it
///   usable as a consumer cursor.
/// - Records are append-only and never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    storage_id: u64,
    run_id: RunId,
    level: EventLevel,
    message: String,
    timestamp: DateTime<Utc>,
    kind: RunEventKind,
}

impl EventRecord {
    pub fn new(storage_id: u64, event: NewEvent) -> Self {
        Self {
            storage_id,
            run_id: event.run_id,
            level: event.level,
            message: event.message,
            timestamp: event.timestamp,
            kind: event.kind,
        }
    }

    pub fn storage_id(&self) -> u64 {
        self.storage_id
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn level(&self) -> EventLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn kind(&self) -> &RunEventKind {
        &self.kind
    }

    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// Engine event payload, if this record is an engine event.
    pub fn engine_event_data(&self) -> Option<&EngineEventData> {
        match &self.kind {
            RunEventKind::EngineEvent(data) => Some(data),
            _ => None,
        }
    }
}

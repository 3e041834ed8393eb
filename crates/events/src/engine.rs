//! Engine event payloads: structured metadata and captured errors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use relaunch_core::RunId;

/// A typed metadata entry attached to an engine event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
    Text(String),
    Int(i64),
    Bool(bool),
    /// Link to another run (rendered as a navigable reference).
    Run(RunId),
    Json(serde_json::Value),
}

impl MetadataValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_run(&self) -> Option<RunId> {
        match self {
            MetadataValue::Run(id) => Some(*id),
            _ => None,
        }
    }
}

/// Serializable snapshot of an error and its cause chain.
///
/// Errors cross process boundaries as data (they end up in the event log), so the
/// original error value is flattened into strings at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    /// `source()` chain, outermost first (excluding `message` itself).
    pub causes: Vec<String>,
    /// Where the error was captured.
    pub context: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            causes: Vec::new(),
            context: None,
        }
    }

    /// Capture an error together with its full `source()` chain.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            message: err.to_string(),
            causes,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl core::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{context}: ")?;
        }
        f.write_str(&self.message)?;
        for cause in &self.causes {
            write!(f, "\n  caused by: {cause}")?;
        }
        Ok(())
    }
}

/// Payload of an engine event: optional metadata entries plus an optional error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineEventData {
    metadata: BTreeMap<String, MetadataValue>,
    error: Option<ErrorInfo>,
}

impl EngineEventData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    pub fn metadata(&self) -> &BTreeMap<String, MetadataValue> {
        &self.metadata
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }
}

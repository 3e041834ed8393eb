//! Runs, their statuses and failure reasons.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::RunId;
use crate::tags::{RUN_FAILURE_REASON_TAG, RunTags};

/// Lifecycle status of a run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Queued,
    NotStarted,
    Starting,
    Started,
    Success,
    Failure,
    Canceling,
    Canceled,
}

impl RunStatus {
    pub const ALL: [RunStatus; 8] = [
        RunStatus::Queued,
        RunStatus::NotStarted,
        RunStatus::Starting,
        RunStatus::Started,
        RunStatus::Success,
        RunStatus::Failure,
        RunStatus::Canceling,
        RunStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "QUEUED",
            RunStatus::NotStarted => "NOT_STARTED",
            RunStatus::Starting => "STARTING",
            RunStatus::Started => "STARTED",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failure => "FAILURE",
            RunStatus::Canceling => "CANCELING",
            RunStatus::Canceled => "CANCELED",
        }
    }

    /// Terminal states: the run will not transition again.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failure | RunStatus::Canceled
        )
    }
}

impl core::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::unknown_variant("run status", s))
    }
}

/// Why a run failed.
///
/// `StepFailure` means user code (an asset or op) raised inside the run; every
/// other reason is a framework-level failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunFailureReason {
    StepFailure,
    RunException,
    JobInitializationFailure,
    StartTimeout,
    Unexpected,
    Unknown,
}

impl RunFailureReason {
    pub const ALL: [RunFailureReason; 6] = [
        RunFailureReason::StepFailure,
        RunFailureReason::RunException,
        RunFailureReason::JobInitializationFailure,
        RunFailureReason::StartTimeout,
        RunFailureReason::Unexpected,
        RunFailureReason::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunFailureReason::StepFailure => "STEP_FAILURE",
            RunFailureReason::RunException => "RUN_EXCEPTION",
            RunFailureReason::JobInitializationFailure => "JOB_INITIALIZATION_FAILURE",
            RunFailureReason::StartTimeout => "START_TIMEOUT",
            RunFailureReason::Unexpected => "UNEXPECTED",
            RunFailureReason::Unknown => "UNKNOWN",
        }
    }
}

impl core::fmt::Display for RunFailureReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunFailureReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunFailureReason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| DomainError::unknown_variant("run failure reason", s))
    }
}

/// Where the job a run executes was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobOrigin {
    pub location_name: String,
    pub repository_name: String,
    pub job_name: String,
}

impl JobOrigin {
    pub fn new(
        location_name: impl Into<String>,
        repository_name: impl Into<String>,
        job_name: impl Into<String>,
    ) -> Self {
        Self {
            location_name: location_name.into(),
            repository_name: repository_name.into(),
            job_name: job_name.into(),
        }
    }
}

/// One execution attempt of a job.
///
/// Runs are append-mostly: status transitions and tag additions happen in place,
/// everything else is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub job_name: String,
    pub status: RunStatus,
    pub tags: RunTags,
    pub origin: Option<JobOrigin>,
    /// Run this run re-executes, if any.
    pub parent_run_id: Option<RunId>,
    /// First run of the lineage, if this is a re-execution.
    pub root_run_id: Option<RunId>,
    pub op_selection: Option<Vec<String>>,
    pub asset_selection: Option<BTreeSet<String>>,
    /// Execution plan restriction; `None` executes every step of the job.
    pub step_keys_to_execute: Option<Vec<String>>,
}

impl Run {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            job_name: job_name.into(),
            status: RunStatus::NotStarted,
            tags: RunTags::new(),
            origin: None,
            parent_run_id: None,
            root_run_id: None,
            op_selection: None,
            asset_selection: None,
            step_keys_to_execute: None,
        }
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_tags(mut self, tags: RunTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }

    pub fn with_origin(mut self, origin: JobOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_op_selection<I, S>(mut self, ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.op_selection = Some(ops.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_asset_selection<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.asset_selection = Some(assets.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_step_keys<I, S>(mut self, step_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.step_keys_to_execute = Some(step_keys.into_iter().map(Into::into).collect());
        self
    }

    /// Root of the lineage this run belongs to (itself for an original run).
    pub fn lineage_root(&self) -> RunId {
        self.root_run_id.unwrap_or(self.run_id)
    }

    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failure
    }

    /// Failure reason recorded on the run. Unrecognized values read as `None`.
    pub fn failure_reason(&self) -> Option<RunFailureReason> {
        self.tags
            .get(RUN_FAILURE_REASON_TAG)
            .and_then(|raw| raw.parse().ok())
    }
}

/// A run as persisted by a run store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Monotonically increasing insertion position in the store.
    pub storage_id: u64,
    pub run: Run,
    pub create_timestamp: DateTime<Utc>,
    pub update_timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_parse_back() {
        for status in RunStatus::ALL {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("RUNNING".parse::<RunStatus>().is_err());
    }

    #[test]
    fn only_terminal_statuses_are_finished() {
        assert!(RunStatus::Failure.is_finished());
        assert!(RunStatus::Success.is_finished());
        assert!(RunStatus::Canceled.is_finished());
        assert!(!RunStatus::Started.is_finished());
        assert!(!RunStatus::Canceling.is_finished());
    }

    #[test]
    fn failure_reason_is_read_from_tags() {
        let run = Run::new("etl").with_tag(RUN_FAILURE_REASON_TAG, "STEP_FAILURE");
        assert_eq!(run.failure_reason(), Some(RunFailureReason::StepFailure));

        let run = Run::new("etl").with_tag(RUN_FAILURE_REASON_TAG, "cosmic rays");
        assert_eq!(run.failure_reason(), None);
    }

    #[test]
    fn lineage_root_defaults_to_self() {
        let run = Run::new("etl");
        assert_eq!(run.lineage_root(), run.run_id);

        let root = RunId::new();
        let mut child = Run::new("etl");
        child.root_run_id = Some(root);
        assert_eq!(child.lineage_root(), root);
    }
}

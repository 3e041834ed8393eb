use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use relaunch_core::{Run, RunGroup, RunId, RunRecord, RunStatus, RunTags};

/// Run store operation error.
///
/// These are **infrastructure errors** (storage, missing records) as opposed to
/// domain errors (parsing, validation).
#[derive(Debug, Clone, Error)]
pub enum RunStoreError {
    #[error("run not found: {0}")]
    NotFound(RunId),

    #[error("run already exists: {0}")]
    AlreadyExists(RunId),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Filter criteria for run queries. Empty criteria match every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunsFilter {
    pub run_ids: Option<Vec<RunId>>,
    pub statuses: Vec<RunStatus>,
    /// Every listed tag must be present with the same value.
    pub tags: RunTags,
}

impl RunsFilter {
    pub fn statuses(statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn run_ids(run_ids: impl IntoIterator<Item = RunId>) -> Self {
        Self {
            run_ids: Some(run_ids.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }

    pub fn matches(&self, run: &Run) -> bool {
        if let Some(ids) = &self.run_ids {
            if !ids.contains(&run.run_id) {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&run.status) {
            return false;
        }
        self.tags.iter().all(|(k, v)| run.tags.get(k) == Some(v))
    }
}

/// Persistent run store boundary.
///
/// ## Semantics
///
/// - Runs are append-mostly: `add_run` inserts, status and tags change in place,
///   nothing is ever deleted through this interface.
/// - `add_run_tags` merges per key, last write wins. It is the only write the
///   re-execution daemon performs on existing runs.
/// - `get_run_group` returns the lineage the run belongs to, or `None` when the
///   run itself is unknown.
pub trait RunStore: Send + Sync {
    fn add_run(&self, run: Run) -> Result<RunRecord, RunStoreError>;

    fn get_run_by_id(&self, run_id: RunId) -> Result<Option<Run>, RunStoreError>;

    /// Records matching `filter`, ordered by storage id (oldest first).
    fn get_run_records(
        &self,
        filter: &RunsFilter,
        limit: Option<usize>,
    ) -> Result<Vec<RunRecord>, RunStoreError>;

    fn get_runs(&self, filter: &RunsFilter) -> Result<Vec<Run>, RunStoreError> {
        Ok(self
            .get_run_records(filter, None)?
            .into_iter()
            .map(|record| record.run)
            .collect())
    }

    fn add_run_tags(&self, run_id: RunId, tags: &RunTags) -> Result<(), RunStoreError>;

    fn update_run_status(&self, run_id: RunId, status: RunStatus) -> Result<(), RunStoreError>;

    fn get_run_group(&self, run_id: RunId) -> Result<Option<RunGroup>, RunStoreError>;
}

impl<S> RunStore for Arc<S>
where
    S: RunStore + ?Sized,
{
    fn add_run(&self, run: Run) -> Result<RunRecord, RunStoreError> {
        (**self).add_run(run)
    }

    fn get_run_by_id(&self, run_id: RunId) -> Result<Option<Run>, RunStoreError> {
        (**self).get_run_by_id(run_id)
    }

    fn get_run_records(
        &self,
        filter: &RunsFilter,
        limit: Option<usize>,
    ) -> Result<Vec<RunRecord>, RunStoreError> {
        (**self).get_run_records(filter, limit)
    }

    fn add_run_tags(&self, run_id: RunId, tags: &RunTags) -> Result<(), RunStoreError> {
        (**self).add_run_tags(run_id, tags)
    }

    fn update_run_status(&self, run_id: RunId, status: RunStatus) -> Result<(), RunStoreError> {
        (**self).update_run_status(run_id, status)
    }

    fn get_run_group(&self, run_id: RunId) -> Result<Option<RunGroup>, RunStoreError> {
        (**self).get_run_group(run_id)
    }
}

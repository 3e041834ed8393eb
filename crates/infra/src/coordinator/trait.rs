use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use relaunch_core::{ReexecutionStrategy, Run, RunId, RunTags};

use crate::event_log::EventLogError;
use crate::run_store::RunStoreError;
use crate::workspace::RemoteJob;

/// Run submission error.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Store(#[from] RunStoreError),

    #[error(transparent)]
    EventLog(#[from] EventLogError),

    #[error("run {0} cannot be submitted from status {1}")]
    InvalidStatus(RunId, String),

    #[error("run queue unavailable: {0}")]
    QueueUnavailable(String),
}

/// Everything needed to create a re-execution of `parent_run`.
#[derive(Debug, Clone)]
pub struct ReexecutionRequest {
    pub parent_run: Run,
    pub remote_job: RemoteJob,
    pub strategy: ReexecutionStrategy,
    /// Applied on top of (inherited) tags.
    pub extra_tags: RunTags,
    /// Copy the parent's user tags to the new run.
    pub use_parent_run_tags: bool,
    /// Steps the parent completed; FROM_FAILURE leaves them out of the child's plan.
    pub succeeded_steps: BTreeSet<String>,
}

impl ReexecutionRequest {
    pub fn new(parent_run: Run, remote_job: RemoteJob, strategy: ReexecutionStrategy) -> Self {
        Self {
            parent_run,
            remote_job,
            strategy,
            extra_tags: RunTags::new(),
            use_parent_run_tags: true,
            succeeded_steps: BTreeSet::new(),
        }
    }

    pub fn with_extra_tags(mut self, tags: RunTags) -> Self {
        self.extra_tags = tags;
        self
    }

    pub fn with_use_parent_run_tags(mut self, use_parent_run_tags: bool) -> Self {
        self.use_parent_run_tags = use_parent_run_tags;
        self
    }

    pub fn with_succeeded_steps<I, K>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.succeeded_steps = steps.into_iter().map(Into::into).collect();
        self
    }
}

/// Run creation and submission boundary.
///
/// Creation and submission are separate steps: a created run is persisted
/// (NOT_STARTED) before anything is enqueued, so callers can link it in the
/// event log first.
pub trait RunCoordinator: Send + Sync {
    fn create_reexecuted_run(&self, request: ReexecutionRequest) -> Result<Run, CoordinatorError>;

    fn submit_run(&self, run_id: RunId) -> Result<Run, CoordinatorError>;
}

impl<C> RunCoordinator for Arc<C>
where
    C: RunCoordinator + ?Sized,
{
    fn create_reexecuted_run(&self, request: ReexecutionRequest) -> Result<Run, CoordinatorError> {
        (**self).create_reexecuted_run(request)
    }

    fn submit_run(&self, run_id: RunId) -> Result<Run, CoordinatorError> {
        (**self).submit_run(run_id)
    }
}

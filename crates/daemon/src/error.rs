use thiserror::Error;

use relaunch_infra::{CoordinatorError, CursorStoreError, EventLogError, RunStoreError, WorkspaceError};

/// Failure while retrying one run.
///
/// Caught at the consumer loop boundary: it is captured, reported on the failed
/// run and never aborts the rest of the batch.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("run store: {0}")]
    Store(#[from] RunStoreError),

    #[error("event log: {0}")]
    EventLog(#[from] EventLogError),

    #[error("workspace: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("run submission: {0}")]
    Coordinator(#[from] CoordinatorError),
}

/// Failure of a whole daemon iteration (storage unreachable). Handed to the
/// worker's supervisor logic, which logs it and backs off.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("run store unavailable: {0}")]
    Store(#[from] RunStoreError),

    #[error("event log unavailable: {0}")]
    EventLog(#[from] EventLogError),

    #[error("cursor store unavailable: {0}")]
    Cursor(#[from] CursorStoreError),
}

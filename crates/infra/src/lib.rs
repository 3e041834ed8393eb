//! Infrastructure layer: run storage, event log, workspace resolution, run
//! submission, cursor persistence and configuration.
//!
//! Every boundary is a sync trait with an in-memory implementation; the daemon
//! depends only on the traits.

pub mod config;
pub mod coordinator;
pub mod cursor_store;
pub mod event_log;
pub mod lifecycle;
pub mod run_store;
pub mod workspace;

pub use config::DaemonConfig;
pub use coordinator::{CoordinatorError, QueuedRunCoordinator, ReexecutionRequest, RunCoordinator};
pub use cursor_store::{CursorStoreError, DaemonCursorStore, InMemoryCursorStore, PostgresCursorStore};
pub use event_log::{EventLog, EventLogError, InMemoryEventLog, PublishingEventLog};
pub use lifecycle::{
    LifecycleError, report_run_failure, report_run_success, report_step_outcome, succeeded_steps,
};
pub use run_store::{InMemoryRunStore, RunStore, RunStoreError, RunsFilter};
pub use workspace::{CodeLocation, InMemoryCodeLocation, InMemoryWorkspace, Workspace, WorkspaceError};

//! Run creation / submission boundary.

pub mod queued;
pub mod reexecution;
pub mod r#trait;

pub use queued::QueuedRunCoordinator;
pub use reexecution::build_reexecution_run;
pub use r#trait::{CoordinatorError, ReexecutionRequest, RunCoordinator};

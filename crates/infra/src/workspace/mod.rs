//! Code location / workspace boundary.
//!
//! The daemon only needs to resolve a failed run's origin back to a job snapshot,
//! so this boundary is lookup-only.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{InMemoryCodeLocation, InMemoryWorkspace};
pub use r#trait::{
    CodeLocation, JobDefinition, JobSubsetSelector, OpDefinition, RemoteJob, RemoteRepository,
    Workspace, WorkspaceError,
};

//! Run store boundary.
//!
//! The re-execution daemon only reads runs, merges tags onto them, and walks
//! their lineage. Creating runs is the run coordinator's job.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryRunStore;
pub use r#trait::{RunStore, RunStoreError, RunsFilter};

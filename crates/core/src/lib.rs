//! `relaunch-core`: run model building blocks.
//!
//! This crate contains **pure** run/lineage primitives (no infrastructure concerns).
//! Everything the re-execution daemon decides is derived from these types and the
//! string tags stored on each run.

pub mod error;
pub mod group;
pub mod id;
pub mod run;
pub mod settings;
pub mod strategy;
pub mod tags;

pub use error::{DomainError, DomainResult};
pub use group::RunGroup;
pub use id::RunId;
pub use run::{JobOrigin, Run, RunFailureReason, RunRecord, RunStatus};
pub use settings::RunRetriesSettings;
pub use strategy::ReexecutionStrategy;
pub use tags::RunTags;

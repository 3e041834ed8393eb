//! Run groups (retry lineages).

use serde::{Deserialize, Serialize};

use crate::id::RunId;
use crate::run::Run;

/// A run and every run produced by re-executing it, transitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunGroup {
    pub root_run_id: RunId,
    /// Members ordered by creation, root first.
    pub runs: Vec<Run>,
}

impl RunGroup {
    pub fn new(root_run_id: RunId, runs: Vec<Run>) -> Self {
        Self { root_run_id, runs }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn run_ids(&self) -> impl Iterator<Item = RunId> + '_ {
        self.runs.iter().map(|r| r.run_id)
    }

    /// First member that re-executes `run_id`, if any.
    pub fn child_of(&self, run_id: RunId) -> Option<&Run> {
        self.runs.iter().find(|r| r.parent_run_id == Some(run_id))
    }
}

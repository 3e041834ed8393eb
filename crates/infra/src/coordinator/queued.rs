use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use relaunch_core::{ReexecutionStrategy, Run, RunId, RunStatus};

use super::r#trait::{CoordinatorError, ReexecutionRequest, RunCoordinator};
use super::reexecution::build_reexecution_run;
use crate::event_log::EventLog;
use crate::lifecycle::succeeded_steps;
use crate::run_store::{RunStore, RunStoreError};

/// Coordinator that persists runs to a `RunStore` and hands submitted runs to
/// an in-process FIFO queue (a run launcher pops from it).
///
/// With an event log attached, FROM_FAILURE re-executions leave out the steps
/// the parent run completed.
pub struct QueuedRunCoordinator<S> {
    store: S,
    event_log: Option<Arc<dyn EventLog>>,
    queue: Mutex<VecDeque<RunId>>,
}

impl<S> QueuedRunCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            event_log: None,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Snapshot of submitted run ids, oldest first.
    pub fn queue(&self) -> Vec<RunId> {
        self.queue
            .lock()
            .map(|q| q.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Take the next submitted run id.
    pub fn dequeue(&self) -> Option<RunId> {
        self.queue.lock().ok().and_then(|mut q| q.pop_front())
    }

    pub fn clear(&self) {
        if let Ok(mut q) = self.queue.lock() {
            q.clear();
        }
    }
}

impl<S> RunCoordinator for QueuedRunCoordinator<S>
where
    S: RunStore,
{
    fn create_reexecuted_run(&self, mut request: ReexecutionRequest) -> Result<Run, CoordinatorError> {
        if request.strategy == ReexecutionStrategy::FromFailure {
            if let Some(log) = &self.event_log {
                request
                    .succeeded_steps
                    .extend(succeeded_steps(&**log, request.parent_run.run_id)?);
            }
        }

        let run = build_reexecution_run(&request);
        self.store.add_run(run.clone())?;

        debug!(
            run_id = %run.run_id,
            parent_run_id = %request.parent_run.run_id,
            strategy = %request.strategy,
            "created re-execution run"
        );
        Ok(run)
    }

    fn submit_run(&self, run_id: RunId) -> Result<Run, CoordinatorError> {
        let run = self
            .store
            .get_run_by_id(run_id)?
            .ok_or(RunStoreError::NotFound(run_id))?;

        if run.status != RunStatus::NotStarted {
            return Err(CoordinatorError::InvalidStatus(run_id, run.status.to_string()));
        }

        let mut queue = self
            .queue
            .lock()
            .map_err(|_| CoordinatorError::QueueUnavailable("lock poisoned".to_string()))?;

        self.store.update_run_status(run_id, RunStatus::Queued)?;
        queue.push_back(run_id);

        info!(run_id = %run_id, job = %run.job_name, "run queued");
        Ok(run.with_status(RunStatus::Queued))
    }
}

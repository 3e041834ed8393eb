//! Shared setup for unit tests.

use std::sync::Arc;

use relaunch_core::{JobOrigin, Run, RunFailureReason, RunId, RunRetriesSettings, RunStatus};
use relaunch_infra::coordinator::ReexecutionRequest;
use relaunch_infra::workspace::{JobDefinition, OpDefinition, RemoteRepository};
use relaunch_infra::{
    CoordinatorError, EventLog, InMemoryCodeLocation, InMemoryEventLog, InMemoryRunStore,
    InMemoryWorkspace, QueuedRunCoordinator, RunCoordinator, RunStore, report_run_failure,
};

use crate::context::ReexecutionContext;

pub const LOCATION: &str = "etl_location";
pub const REPOSITORY: &str = "etl_repo";
pub const JOB: &str = "etl";

pub fn origin() -> JobOrigin {
    JobOrigin::new(LOCATION, REPOSITORY, JOB)
}

pub fn code_location() -> InMemoryCodeLocation {
    InMemoryCodeLocation::new(LOCATION).with_repository(
        RemoteRepository::new(REPOSITORY).with_job(
            JobDefinition::new(JOB)
                .with_op(OpDefinition::new("extract").with_assets(["raw"]))
                .with_op(OpDefinition::new("transform").with_assets(["clean"]))
                .with_op(OpDefinition::new("load").with_assets(["warehouse"])),
        ),
    )
}

pub struct Harness {
    pub store: Arc<InMemoryRunStore>,
    pub log: Arc<InMemoryEventLog>,
    pub workspace: Arc<InMemoryWorkspace>,
    pub coordinator: Arc<QueuedRunCoordinator<Arc<InMemoryRunStore>>>,
    pub ctx: ReexecutionContext,
}

impl Harness {
    pub fn new(settings: RunRetriesSettings) -> Self {
        let store = Arc::new(InMemoryRunStore::new());
        let log = Arc::new(InMemoryEventLog::new());
        let workspace = Arc::new(InMemoryWorkspace::new().with_location(code_location()));
        let coordinator =
            Arc::new(QueuedRunCoordinator::new(store.clone()).with_event_log(log.clone()));
        let ctx = ReexecutionContext::new(
            store.clone(),
            log.clone(),
            workspace.clone(),
            coordinator.clone(),
            settings,
        );

        Self {
            store,
            log,
            workspace,
            coordinator,
            ctx,
        }
    }

    /// Store `run` as started, then fail it through the lifecycle API.
    pub fn fail(&self, run: Run, reason: Option<RunFailureReason>) -> Run {
        let run_id = run.run_id;
        if self.store.get_run_by_id(run_id).unwrap().is_none() {
            self.store.add_run(run.with_status(RunStatus::Started)).unwrap();
        }
        report_run_failure(&*self.store, &*self.log, run_id, reason, "run failed").unwrap();
        self.run(run_id)
    }

    pub fn failed_run(&self) -> Run {
        self.fail(Run::new(JOB).with_origin(origin()), None)
    }

    pub fn run(&self, run_id: RunId) -> Run {
        self.store.get_run_by_id(run_id).unwrap().unwrap()
    }

    pub fn messages(&self, run_id: RunId) -> Vec<String> {
        self.log
            .logs_for_run(run_id)
            .unwrap()
            .iter()
            .filter(|r| r.engine_event_data().is_some())
            .map(|r| r.message().to_string())
            .collect()
    }
}

/// Creates runs normally but refuses every submission.
pub struct RejectingCoordinator<C>(pub C);

impl<C: RunCoordinator> RunCoordinator for RejectingCoordinator<C> {
    fn create_reexecuted_run(&self, request: ReexecutionRequest) -> Result<Run, CoordinatorError> {
        self.0.create_reexecuted_run(request)
    }

    fn submit_run(&self, _run_id: RunId) -> Result<Run, CoordinatorError> {
        Err(CoordinatorError::QueueUnavailable("queue is full".to_string()))
    }
}

//! Deployment harness: in-memory collaborators wired the way a host process
//! wires real ones.

#![allow(dead_code)]

use std::sync::Arc;

use relaunch_core::{JobOrigin, Run, RunFailureReason, RunId, RunRetriesSettings, RunStatus};
use relaunch_daemon::{EventLogConsumer, ReexecutionContext};
use relaunch_events::{EventBus, EventRecord, InMemoryEventBus, Subscription};
use relaunch_infra::workspace::{JobDefinition, OpDefinition, RemoteRepository};
use relaunch_infra::{
    EventLog, InMemoryCodeLocation, InMemoryCursorStore, InMemoryEventLog, InMemoryRunStore,
    InMemoryWorkspace, PublishingEventLog, QueuedRunCoordinator, RunStore, report_run_failure,
    report_step_outcome,
};

pub const LOCATION: &str = "warehouse_location";
pub const REPOSITORY: &str = "warehouse_repo";
pub const JOB: &str = "nightly_load";
pub const DAEMON_NAME: &str = "auto-reexecution";

pub type Log = PublishingEventLog<InMemoryEventLog, Arc<InMemoryEventBus<EventRecord>>>;

pub struct Deployment {
    pub store: Arc<InMemoryRunStore>,
    pub log: Arc<Log>,
    pub bus: Arc<InMemoryEventBus<EventRecord>>,
    pub workspace: Arc<InMemoryWorkspace>,
    pub coordinator: Arc<QueuedRunCoordinator<Arc<InMemoryRunStore>>>,
    pub cursors: Arc<InMemoryCursorStore>,
    pub ctx: ReexecutionContext,
}

impl Deployment {
    pub fn new(settings: RunRetriesSettings) -> Self {
        let store = Arc::new(InMemoryRunStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let log = Arc::new(PublishingEventLog::new(InMemoryEventLog::new(), bus.clone()));
        let workspace = Arc::new(InMemoryWorkspace::new().with_location(code_location()));
        let coordinator =
            Arc::new(QueuedRunCoordinator::new(store.clone()).with_event_log(log.clone()));
        let cursors = Arc::new(InMemoryCursorStore::new());
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
            bus,
            workspace,
            coordinator,
            cursors,
            ctx,
        }
    }

    pub fn subscribe(&self) -> Subscription<EventRecord> {
        self.bus.subscribe()
    }

    /// Consumer with its cursor already initialised (so later failures are seen).
    pub fn consumer(&self) -> EventLogConsumer {
        let consumer = EventLogConsumer::new(DAEMON_NAME, self.ctx.clone(), self.cursors.clone());
        consumer.cursor().unwrap();
        consumer
    }

    /// A new run of the job, started and then failed.
    pub fn start_and_fail(&self, run: Run, reason: Option<RunFailureReason>) -> RunId {
        let run_id = run.run_id;
        self.store.add_run(run.with_status(RunStatus::Started)).unwrap();
        self.fail(run_id, reason);
        run_id
    }

    /// Record step outcomes for a started run.
    pub fn steps(&self, run_id: RunId, outcomes: &[(&str, bool)]) {
        for (step_key, succeeded) in outcomes {
            report_step_outcome(&*self.log, run_id, step_key, *succeeded).unwrap();
        }
    }

    pub fn fail(&self, run_id: RunId, reason: Option<RunFailureReason>) {
        report_run_failure(&*self.store, &*self.log, run_id, reason, "Execution of run failed.")
            .unwrap();
    }

    /// Launch the oldest queued run (a retry) and fail it.
    pub fn launch_and_fail(&self, reason: Option<RunFailureReason>) -> Option<RunId> {
        let run_id = self.coordinator.dequeue()?;
        self.store.update_run_status(run_id, RunStatus::Started).unwrap();
        self.fail(run_id, reason);
        Some(run_id)
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

pub fn origin() -> JobOrigin {
    JobOrigin::new(LOCATION, REPOSITORY, JOB)
}

pub fn job_run() -> Run {
    Run::new(JOB).with_origin(origin())
}

pub fn code_location() -> InMemoryCodeLocation {
    InMemoryCodeLocation::new(LOCATION).with_repository(
        RemoteRepository::new(REPOSITORY).with_job(
            JobDefinition::new(JOB)
                .with_op(OpDefinition::new("fetch_orders").with_assets(["orders_raw"]))
                .with_op(OpDefinition::new("fetch_customers").with_assets(["customers_raw"]))
                .with_op(OpDefinition::new("join").with_assets(["orders_enriched"]))
                .with_op(OpDefinition::new("publish").with_assets(["orders_report"])),
        ),
    )
}

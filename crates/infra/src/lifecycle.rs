//! Run lifecycle ingestion: terminal status transitions reported by launchers.
//!
//! Each report updates the run first and then appends the run event, so a
//! consumer reading the event always finds the run in its terminal state.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::debug;

use relaunch_core::tags::RUN_FAILURE_REASON_TAG;
use relaunch_core::{RunFailureReason, RunId, RunStatus, RunTags};
use relaunch_events::{EventLevel, EventRecord, NewEvent, RunEventKind};

use crate::event_log::{EventLog, EventLogError};
use crate::run_store::{RunStore, RunStoreError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Store(#[from] RunStoreError),

    #[error(transparent)]
    EventLog(#[from] EventLogError),
}

/// Record that `run_id` failed: RUN_FAILURE event, FAILURE status, and the
/// `run_failure_reason` tag when a reason is known.
pub fn report_run_failure<S, L>(
    store: &S,
    log: &L,
    run_id: RunId,
    reason: Option<RunFailureReason>,
    message: &str,
) -> Result<EventRecord, LifecycleError>
where
    S: RunStore + ?Sized,
    L: EventLog + ?Sized,
{
    if store.get_run_by_id(run_id)?.is_none() {
        return Err(RunStoreError::NotFound(run_id).into());
    }

    if let Some(reason) = reason {
        store.add_run_tags(run_id, &RunTags::new().with(RUN_FAILURE_REASON_TAG, reason.as_str()))?;
    }
    store.update_run_status(run_id, RunStatus::Failure)?;

    let record = log.store_event(NewEvent::new(
        run_id,
        EventLevel::Error,
        message,
        RunEventKind::RunFailure { reason },
    ))?;

    debug!(run_id = %run_id, reason = ?reason, storage_id = record.storage_id(), "run failure recorded");
    Ok(record)
}

/// Record that `run_id` succeeded.
pub fn report_run_success<S, L>(store: &S, log: &L, run_id: RunId) -> Result<EventRecord, LifecycleError>
where
    S: RunStore + ?Sized,
    L: EventLog + ?Sized,
{
    store.update_run_status(run_id, RunStatus::Success)?;

    let record = log.store_event(NewEvent::new(
        run_id,
        EventLevel::Info,
        "Finished execution of run",
        RunEventKind::RunSuccess,
    ))?;

    debug!(run_id = %run_id, storage_id = record.storage_id(), "run success recorded");
    Ok(record)
}

/// Record the outcome of one step of `run_id`.
pub fn report_step_outcome<L>(
    log: &L,
    run_id: RunId,
    step_key: &str,
    succeeded: bool,
) -> Result<EventRecord, EventLogError>
where
    L: EventLog + ?Sized,
{
    let step_key = step_key.to_string();
    let event = if succeeded {
        NewEvent::new(
            run_id,
            EventLevel::Debug,
            format!("Finished execution of step \"{step_key}\""),
            RunEventKind::StepSuccess { step_key },
        )
    } else {
        NewEvent::new(
            run_id,
            EventLevel::Error,
            format!("Execution of step \"{step_key}\" failed"),
            RunEventKind::StepFailure { step_key },
        )
    };
    log.store_event(event)
}

/// Steps of `run_id` whose latest recorded outcome is a success.
pub fn succeeded_steps<L>(log: &L, run_id: RunId) -> Result<BTreeSet<String>, EventLogError>
where
    L: EventLog + ?Sized,
{
    let mut succeeded = BTreeSet::new();
    for record in log.logs_for_run(run_id)? {
        match record.kind() {
            RunEventKind::StepSuccess { step_key } => {
                succeeded.insert(step_key.clone());
            }
            RunEventKind::StepFailure { step_key } => {
                succeeded.remove(step_key);
            }
            _ => {}
        }
    }
    Ok(succeeded)
}

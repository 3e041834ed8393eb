//! Retry submitter: resolves a failed run's job and submits its re-execution.

use tracing::{debug, info};

use relaunch_core::tags::{AUTO_RETRY_RUN_ID_TAG, RETRY_NUMBER_TAG};
use relaunch_core::{Run, RunId, RunTags};
use relaunch_events::{EngineEventData, MetadataValue};
use relaunch_infra::coordinator::ReexecutionRequest;
use relaunch_infra::workspace::JobSubsetSelector;
use relaunch_infra::{
    CodeLocation, EventLog, RunCoordinator, RunStore, RunStoreError, Workspace, WorkspaceError,
};

use crate::context::ReexecutionContext;
use crate::error::RetryError;
use crate::policy::reexecution_strategy;

/// What `retry_run` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Submitted { retry_run_id: RunId },
    /// The run already carries `auto_retry_run_id`.
    AlreadyRetried,
    /// The run's job cannot be resolved; explained on the run, nothing submitted.
    Unresolvable { message: String },
}

/// Submit a re-execution of `failed_run` carrying `retry_number`.
///
/// Resolution problems that a later attempt cannot fix (no origin, missing
/// location, repository or job) are reported on the run and return `Ok`.
/// Everything else is an error, and `auto_retry_run_id` is only written after a
/// successful submission, so an error leaves the run retryable.
pub fn retry_run(
    ctx: &ReexecutionContext,
    failed_run: &Run,
    retry_number: usize,
) -> Result<RetryOutcome, RetryError> {
    // Re-read: another replica or an earlier pass may have retried it meanwhile.
    let failed_run = ctx
        .run_store
        .get_run_by_id(failed_run.run_id)?
        .ok_or(RunStoreError::NotFound(failed_run.run_id))?;
    if failed_run.tags.contains(AUTO_RETRY_RUN_ID_TAG) {
        debug!(run_id = %failed_run.run_id, "run already retried");
        return Ok(RetryOutcome::AlreadyRetried);
    }

    let Some(origin) = failed_run.origin.as_ref() else {
        return unresolvable(
            ctx,
            &failed_run,
            "Run does not have an external job origin, unable to retry the run.".to_string(),
        );
    };

    let code_location = match ctx.workspace.get_code_location(&origin.location_name) {
        Ok(location) => location,
        Err(WorkspaceError::LocationNotFound(name)) => {
            return unresolvable(
                ctx,
                &failed_run,
                format!(
                    "Could not find code location {name}, unable to retry the run. It was likely renamed or deleted."
                ),
            );
        }
        Err(err) => return Err(err.into()),
    };

    let repository_name = &origin.repository_name;
    if !code_location.has_repository(repository_name) {
        return unresolvable(
            ctx,
            &failed_run,
            format!(
                "Could not find repository {repository_name} in location {}, unable to retry the run. It was likely renamed or deleted.",
                code_location.name()
            ),
        );
    }

    let repository = code_location.get_repository(repository_name)?;
    if !repository.has_job(&failed_run.job_name) {
        return unresolvable(
            ctx,
            &failed_run,
            format!(
                "Could not find job {} in repository {repository_name}, unable to retry the run. It was likely renamed or deleted.",
                failed_run.job_name
            ),
        );
    }

    let mut selector = JobSubsetSelector::new(origin)
        .with_op_selection(failed_run.op_selection.clone())
        .with_asset_selection(failed_run.asset_selection.clone());
    selector.job_name = failed_run.job_name.clone();
    let remote_job = code_location.get_job(&selector)?;

    let strategy = reexecution_strategy(&failed_run, ctx.event_log.as_ref()).unwrap_or_default();

    let request = ReexecutionRequest::new(failed_run.clone(), remote_job, strategy)
        .with_extra_tags(RunTags::new().with(RETRY_NUMBER_TAG, retry_number.to_string()))
        .with_use_parent_run_tags(true);
    let new_run = ctx.coordinator.create_reexecuted_run(request)?;

    ctx.event_log.report_engine_event(
        failed_run.run_id,
        "Retrying the run",
        EngineEventData::new().with_metadata("new run", MetadataValue::Run(new_run.run_id)),
    )?;
    ctx.event_log.report_engine_event(
        new_run.run_id,
        "Launched as an automatic retry",
        EngineEventData::new().with_metadata("failed run", MetadataValue::Run(failed_run.run_id)),
    )?;

    ctx.coordinator.submit_run(new_run.run_id)?;
    ctx.run_store.add_run_tags(
        failed_run.run_id,
        &RunTags::new().with(AUTO_RETRY_RUN_ID_TAG, new_run.run_id.to_string()),
    )?;

    info!(
        run_id = %failed_run.run_id,
        retry_run_id = %new_run.run_id,
        retry_number,
        strategy = %strategy,
        "submitted automatic retry"
    );

    Ok(RetryOutcome::Submitted {
        retry_run_id: new_run.run_id,
    })
}

fn unresolvable(
    ctx: &ReexecutionContext,
    run: &Run,
    message: String,
) -> Result<RetryOutcome, RetryError> {
    debug!(run_id = %run.run_id, reason = %message, "cannot retry run");
    ctx.event_log
        .report_engine_event(run.run_id, &message, EngineEventData::new())?;
    Ok(RetryOutcome::Unresolvable { message })
}

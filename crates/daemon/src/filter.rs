//! Run filter: turns a batch of runs into retry candidates.
//!
//! The per-run decision is computed once and cached in the `will_retry` tag;
//! later passes (and other daemon replicas) read the cached value instead of
//! re-evaluating. The stored run is consulted before evaluating, so a stale
//! copy in the batch never overwrites a decision already made.

use tracing::{debug, warn};

use relaunch_core::tags::{AUTO_RETRY_RUN_ID_TAG, WILL_RETRY_TAG, bool_tag_value, boolean_tag_value};
use relaunch_core::{Run, RunId, RunStatus, RunTags};
use relaunch_events::EngineEventData;
use relaunch_infra::{EventLog, RunStore, RunStoreError};

use crate::capture::capture_error;
use crate::context::ReexecutionContext;
use crate::policy::{ASSET_OR_OP_FAILURE_SKIP_MESSAGE, RetryPolicyEvaluator};

/// A run to retry and the ordinal its retry will carry (1 = first retry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryCandidate {
    pub run: Run,
    pub retry_number: usize,
}

/// Lazy filter over `runs`; see [`filter_runs_to_should_retry`].
pub struct FilterRunsToShouldRetry<'a, I> {
    ctx: &'a ReexecutionContext,
    evaluator: RetryPolicyEvaluator,
    runs: I,
    skipped: u64,
    errored: Vec<RunId>,
}

/// Yield the runs that should be retried, in input order.
///
/// Nothing happens until the iterator is pulled; each pull evaluates runs until
/// one qualifies. Runs that are not FAILURE and carry no cached decision are
/// skipped without any write.
pub fn filter_runs_to_should_retry<I>(
    runs: I,
    ctx: &ReexecutionContext,
) -> FilterRunsToShouldRetry<'_, I::IntoIter>
where
    I: IntoIterator<Item = Run>,
{
    FilterRunsToShouldRetry {
        ctx,
        evaluator: RetryPolicyEvaluator::new(ctx.settings),
        runs: runs.into_iter(),
        skipped: 0,
        errored: Vec::new(),
    }
}

impl<I> FilterRunsToShouldRetry<'_, I> {
    /// Runs passed over so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Runs that could not be evaluated; they were neither decided nor yielded.
    pub fn errored(&self) -> &[RunId] {
        &self.errored
    }

    fn consider(&self, run: &Run) -> Result<Option<usize>, RunStoreError> {
        let mut group = None;

        if !run.tags.contains(WILL_RETRY_TAG) && run.status != RunStatus::Failure {
            return Ok(None);
        }

        let stored;
        let run = if run.tags.contains(WILL_RETRY_TAG) {
            run
        } else {
            stored = self
                .ctx
                .run_store
                .get_run_by_id(run.run_id)?
                .ok_or(RunStoreError::NotFound(run.run_id))?;
            &stored
        };

        let will_retry = match run.tags.get(WILL_RETRY_TAG) {
            Some(cached) => boolean_tag_value(Some(cached), false),
            None => {
                if run.status != RunStatus::Failure {
                    return Ok(None);
                }

                group = self.ctx.run_store.get_run_group(run.run_id)?;
                let decision = self.evaluator.evaluate(run, group.as_ref());
                self.ctx.run_store.add_run_tags(
                    run.run_id,
                    &RunTags::new().with(WILL_RETRY_TAG, bool_tag_value(decision.should_retry())),
                )?;

                if let Some(reason) = decision.skip_reason() {
                    debug!(run_id = %run.run_id, reason = %reason, "run will not be retried");
                }
                decision.should_retry()
            }
        };

        if !will_retry {
            if self.evaluator.is_blocked_asset_or_op_failure(run) {
                self.report(run, ASSET_OR_OP_FAILURE_SKIP_MESSAGE, EngineEventData::new());
            }
            return Ok(None);
        }

        if run.tags.contains(AUTO_RETRY_RUN_ID_TAG) {
            return Ok(None);
        }

        let group = match group {
            Some(group) => Some(group),
            None => self.ctx.run_store.get_run_group(run.run_id)?,
        };
        let group = group.ok_or(RunStoreError::NotFound(run.run_id))?;

        Ok(Some(group.len()))
    }

    fn report(&self, run: &Run, message: &str, data: EngineEventData) {
        if let Err(err) = self.ctx.event_log.report_engine_event(run.run_id, message, data) {
            warn!(run_id = %run.run_id, error = %err, "failed to report engine event");
        }
    }
}

impl<I> Iterator for FilterRunsToShouldRetry<'_, I>
where
    I: Iterator<Item = Run>,
{
    type Item = RetryCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(run) = self.runs.next() {
            match self.consider(&run) {
                Ok(Some(retry_number)) => return Some(RetryCandidate { run, retry_number }),
                Ok(None) => self.skipped += 1,
                Err(err) => {
                    let info = capture_error("evaluating run for retry", &err);
                    self.report(
                        &run,
                        "Failed to evaluate run for retry",
                        EngineEventData::new().with_error(info),
                    );
                    self.skipped += 1;
                    self.errored.push(run.run_id);
                }
            }
        }
        None
    }
}

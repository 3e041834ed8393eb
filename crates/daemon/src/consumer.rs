//! Consumer loop: drives the filter and the submitter over newly failed runs.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use relaunch_core::{RunId, RunRecord};
use relaunch_events::{EngineEventData, ErrorInfo, EventType};
use relaunch_infra::{DaemonCursorStore, EventLog, RunStore, RunsFilter};

use crate::capture::capture_error;
use crate::context::ReexecutionContext;
use crate::error::DaemonError;
use crate::filter::{FilterRunsToShouldRetry, filter_runs_to_should_retry};
use crate::submitter::{RetryOutcome, retry_run};

/// Progress for one retry candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryAttempt {
    Submitted {
        run_id: RunId,
        retry_run_id: RunId,
        retry_number: usize,
    },
    AlreadyRetried { run_id: RunId },
    Unresolvable { run_id: RunId },
    /// Retrying raised; captured and reported on the run.
    Failed { run_id: RunId, error: ErrorInfo },
}

impl RetryAttempt {
    pub fn run_id(&self) -> RunId {
        match self {
            RetryAttempt::Submitted { run_id, .. }
            | RetryAttempt::AlreadyRetried { run_id }
            | RetryAttempt::Unresolvable { run_id }
            | RetryAttempt::Failed { run_id, .. } => *run_id,
        }
    }
}

/// Iterator returned by [`consume_new_runs_for_automatic_reexecution`].
pub struct ConsumeNewRuns<'a, I> {
    ctx: &'a ReexecutionContext,
    candidates: FilterRunsToShouldRetry<'a, I>,
}

impl<I> ConsumeNewRuns<'_, I> {
    /// Runs the filter passed over so far.
    pub fn skipped(&self) -> u64 {
        self.candidates.skipped()
    }

    /// Runs the filter could not evaluate.
    pub fn errored(&self) -> &[RunId] {
        self.candidates.errored()
    }
}

/// Retry every run in `run_records` that should be retried.
///
/// Yields once per candidate, after its retry attempt; callers may stop pulling
/// between items. A failing retry is reported on its run and never ends the
/// sequence. Safe to call repeatedly on the same runs: a run that already has a
/// retry is not retried again.
pub fn consume_new_runs_for_automatic_reexecution<I>(
    ctx: &ReexecutionContext,
    run_records: I,
) -> ConsumeNewRuns<'_, impl Iterator<Item = relaunch_core::Run>>
where
    I: IntoIterator<Item = RunRecord>,
{
    ConsumeNewRuns {
        ctx,
        candidates: filter_runs_to_should_retry(run_records.into_iter().map(|r| r.run), ctx),
    }
}

impl<I> Iterator for ConsumeNewRuns<'_, I>
where
    I: Iterator<Item = relaunch_core::Run>,
{
    type Item = RetryAttempt;

    fn next(&mut self) -> Option<Self::Item> {
        let candidate = self.candidates.next()?;
        let run_id = candidate.run.run_id;

        let attempt = match retry_run(self.ctx, &candidate.run, candidate.retry_number) {
            Ok(RetryOutcome::Submitted { retry_run_id }) => RetryAttempt::Submitted {
                run_id,
                retry_run_id,
                retry_number: candidate.retry_number,
            },
            Ok(RetryOutcome::AlreadyRetried) => RetryAttempt::AlreadyRetried { run_id },
            Ok(RetryOutcome::Unresolvable { .. }) => RetryAttempt::Unresolvable { run_id },
            Err(err) => {
                let error = capture_error("retrying run", &err);
                if let Err(report_err) = self.ctx.event_log.report_engine_event(
                    run_id,
                    "Failed to retry run",
                    EngineEventData::new().with_error(error.clone()),
                ) {
                    warn!(run_id = %run_id, error = %report_err, "failed to report retry failure");
                }
                RetryAttempt::Failed { run_id, error }
            }
        };

        Some(attempt)
    }
}

/// Counters for one consumer iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IterationSummary {
    /// Failure events read from the log.
    pub events: usize,
    pub submitted: u64,
    /// Candidates not submitted (already retried elsewhere, or unresolvable).
    pub not_submitted: u64,
    /// Runs the filter passed over.
    pub skipped: u64,
    pub failed: u64,
    /// Runs left for a later iteration: their retry failed or they could not be
    /// evaluated. The cursor stops before the first of their failure events.
    pub pending: u64,
    /// Stopped before the batch was drained; the cursor was not advanced.
    pub cancelled: bool,
    /// Cursor after the iteration.
    pub cursor: Option<u64>,
}

/// Event-log driven consumer: reads RUN_FAILURE records after its persisted
/// cursor and feeds the referenced runs through the consumer loop.
pub struct EventLogConsumer {
    name: String,
    ctx: ReexecutionContext,
    cursors: Arc<dyn DaemonCursorStore>,
    fetch_limit: usize,
}

impl EventLogConsumer {
    pub const DEFAULT_FETCH_LIMIT: usize = 500;

    pub fn new(
        name: impl Into<String>,
        ctx: ReexecutionContext,
        cursors: Arc<dyn DaemonCursorStore>,
    ) -> Self {
        Self {
            name: name.into(),
            ctx,
            cursors,
            fetch_limit: Self::DEFAULT_FETCH_LIMIT,
        }
    }

    pub fn with_fetch_limit(mut self, fetch_limit: usize) -> Self {
        self.fetch_limit = fetch_limit.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &ReexecutionContext {
        &self.ctx
    }

    /// Current cursor, initialising it to the newest event on first use so a
    /// fresh daemon does not replay history.
    pub fn cursor(&self) -> Result<u64, DaemonError> {
        if let Some(cursor) = self.cursors.get_cursor(&self.name)? {
            return Ok(cursor);
        }

        let cursor = self.ctx.event_log.max_storage_id()?.unwrap_or(0);
        self.cursors.set_cursor(&self.name, cursor)?;
        info!(daemon = %self.name, cursor, "initialised event log cursor");
        Ok(cursor)
    }

    /// Process one batch. `should_stop` is polled between runs; when it returns
    /// true the batch is abandoned and will be re-read next time.
    ///
    /// The cursor moves past a failure event only once its run was retried or
    /// ruled out. A run whose retry failed keeps its event ahead of the cursor,
    /// so the next iteration reads it (and everything after it) again.
    pub fn run_iteration(&self, should_stop: &dyn Fn() -> bool) -> Result<IterationSummary, DaemonError> {
        let cursor = self.cursor()?;
        let records = self.ctx.event_log.get_records_after(
            Some(cursor),
            &[EventType::RunFailure],
            self.fetch_limit,
        )?;

        let mut summary = IterationSummary {
            events: records.len(),
            cursor: Some(cursor),
            ..Default::default()
        };
        let Some(last) = records.last().map(|r| r.storage_id()) else {
            return Ok(summary);
        };

        let mut run_ids: Vec<RunId> = Vec::with_capacity(records.len());
        for record in &records {
            if !run_ids.contains(&record.run_id()) {
                run_ids.push(record.run_id());
            }
        }
        let run_records = self
            .ctx
            .run_store
            .get_run_records(&RunsFilter::run_ids(run_ids), None)?;

        debug!(
            daemon = %self.name,
            events = records.len(),
            runs = run_records.len(),
            cursor,
            "consuming run failures"
        );

        let mut pending: Vec<RunId> = Vec::new();
        let mut attempts = consume_new_runs_for_automatic_reexecution(&self.ctx, run_records);
        loop {
            if should_stop() {
                summary.cancelled = true;
                break;
            }
            let Some(attempt) = attempts.next() else {
                break;
            };
            match attempt {
                RetryAttempt::Submitted { .. } => summary.submitted += 1,
                RetryAttempt::AlreadyRetried { .. } | RetryAttempt::Unresolvable { .. } => {
                    summary.not_submitted += 1
                }
                RetryAttempt::Failed { run_id, .. } => {
                    summary.failed += 1;
                    pending.push(run_id);
                }
            }
        }
        summary.skipped = attempts.skipped();
        pending.extend_from_slice(attempts.errored());
        summary.pending = pending.len() as u64;

        if summary.cancelled {
            debug!(daemon = %self.name, cursor, "iteration cancelled before the batch was drained");
            return Ok(summary);
        }

        let next = records
            .iter()
            .find(|record| pending.contains(&record.run_id()))
            .map_or(last, |record| record.storage_id().saturating_sub(1).max(cursor));
        if next < last {
            warn!(
                daemon = %self.name,
                cursor = next,
                pending = pending.len(),
                "holding cursor for runs that still need a retry"
            );
        }

        if next != cursor {
            self.cursors.set_cursor(&self.name, next)?;
        }
        summary.cursor = Some(next);
        Ok(summary)
    }
}

//! Retry policy: whether a failed run gets an automatic re-execution, and with
//! which strategy.
//!
//! Evaluation is pure. Reporting the outcome (tags, engine events) is left to the
//! run filter.

use relaunch_core::tags::{
    MAX_RETRIES_TAG, RETRY_NUMBER_TAG, RETRY_ON_ASSET_OR_OP_FAILURE_TAG, RETRY_STRATEGY_TAG,
};
use relaunch_core::{ReexecutionStrategy, Run, RunFailureReason, RunGroup, RunId, RunRetriesSettings, RunStatus};
use relaunch_events::{EngineEventData, EventLevel, NewEvent};
use relaunch_infra::EventLog;
use tracing::warn;

/// Shown on a run that failed in user code while asset/op failure retries are off.
pub const ASSET_OR_OP_FAILURE_SKIP_MESSAGE: &str = "Not retrying run since it failed due to an asset or op failure and run retries are configured with retry_on_asset_or_op_failure set to false.";

/// Why a run is not retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotFailed(RunStatus),
    RetriesDisabled,
    /// `max_retries` tag could not be read as a number.
    InvalidMaxRetries(String),
    RetriesExhausted { depth: u64, max_retries: u64 },
    /// The lineage already holds a re-execution of this run.
    AlreadyReexecuted(RunId),
    AssetOrOpFailure,
}

impl core::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SkipReason::NotFailed(status) => write!(f, "run status is {status}"),
            SkipReason::RetriesDisabled => f.write_str("run retries are disabled"),
            SkipReason::InvalidMaxRetries(raw) => write!(f, "invalid {MAX_RETRIES_TAG} tag {raw:?}"),
            SkipReason::RetriesExhausted { depth, max_retries } => {
                write!(f, "retry {depth} of {max_retries} already used")
            }
            SkipReason::AlreadyReexecuted(child) => write!(f, "already re-executed as {child}"),
            SkipReason::AssetOrOpFailure => f.write_str("asset or op failure retries are disabled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Skip(SkipReason),
}

impl RetryDecision {
    pub fn should_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry)
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            RetryDecision::Retry => None,
            RetryDecision::Skip(reason) => Some(reason),
        }
    }
}

/// Decides retries against the deployment's settings, with per-run tag overrides.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicyEvaluator {
    settings: RunRetriesSettings,
}

impl RetryPolicyEvaluator {
    pub fn new(settings: RunRetriesSettings) -> Self {
        Self { settings }
    }

    /// Decide for `run`. `group` is the run's lineage when known; without it the
    /// run's `retry_number` tag is the only depth signal.
    pub fn evaluate(&self, run: &Run, group: Option<&RunGroup>) -> RetryDecision {
        if run.status != RunStatus::Failure {
            return RetryDecision::Skip(SkipReason::NotFailed(run.status));
        }
        if !self.settings.enabled {
            return RetryDecision::Skip(SkipReason::RetriesDisabled);
        }

        let max_retries = match self.max_retries(run) {
            Ok(max) => max,
            Err(raw) => return RetryDecision::Skip(SkipReason::InvalidMaxRetries(raw)),
        };

        let depth = retry_depth(run, group);
        if depth >= max_retries {
            return RetryDecision::Skip(SkipReason::RetriesExhausted { depth, max_retries });
        }

        if let Some(child) = group.and_then(|g| g.child_of(run.run_id)) {
            return RetryDecision::Skip(SkipReason::AlreadyReexecuted(child.run_id));
        }

        if run.failure_reason() == Some(RunFailureReason::StepFailure)
            && !self.retry_on_asset_or_op_failure(run)
        {
            return RetryDecision::Skip(SkipReason::AssetOrOpFailure);
        }

        RetryDecision::Retry
    }

    pub fn should_retry(&self, run: &Run, group: Option<&RunGroup>) -> bool {
        self.evaluate(run, group).should_retry()
    }

    /// Retry ceiling for the run's lineage.
    ///
    /// The tag wins over the deployment default. Negative values mean zero;
    /// anything non-numeric is returned as `Err` with the raw value.
    pub fn max_retries(&self, run: &Run) -> Result<u64, String> {
        match run.tags.get(MAX_RETRIES_TAG) {
            None => Ok(u64::from(self.settings.max_retries)),
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map(|n| u64::try_from(n).unwrap_or(0))
                .map_err(|_| raw.to_string()),
        }
    }

    /// Effective asset/op failure policy (run tag over deployment setting).
    pub fn retry_on_asset_or_op_failure(&self, run: &Run) -> bool {
        run.tags.get_bool(
            RETRY_ON_ASSET_OR_OP_FAILURE_TAG,
            self.settings.retry_on_asset_or_op_failure,
        )
    }

    /// True when the run failed in user code and the effective policy excludes
    /// such failures. Independent of every other rule.
    pub fn is_blocked_asset_or_op_failure(&self, run: &Run) -> bool {
        run.failure_reason() == Some(RunFailureReason::StepFailure)
            && !self.retry_on_asset_or_op_failure(run)
    }
}

/// Retries already used in the run's lineage.
fn retry_depth(run: &Run, group: Option<&RunGroup>) -> u64 {
    let from_group = group.map(|g| g.len().saturating_sub(1) as u64);
    let from_tag = run
        .tags
        .get(RETRY_NUMBER_TAG)
        .and_then(|raw| raw.trim().parse::<u64>().ok());

    from_group.into_iter().chain(from_tag).max().unwrap_or(0)
}

/// Strategy requested by the run's `retry_strategy` tag.
///
/// `Ok(None)` when the tag is absent; `Err(raw)` when it names no strategy.
pub fn parse_reexecution_strategy(run: &Run) -> Result<Option<ReexecutionStrategy>, String> {
    match run.tags.get(RETRY_STRATEGY_TAG) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| raw.to_string()),
    }
}

/// Like [`parse_reexecution_strategy`], but an unrecognized value is reported as
/// a warning on the run and treated as absent.
pub fn reexecution_strategy(run: &Run, event_log: &dyn EventLog) -> Option<ReexecutionStrategy> {
    match parse_reexecution_strategy(run) {
        Ok(strategy) => strategy,
        Err(raw) => {
            let message = format!("Error parsing retry strategy from tag '{RETRY_STRATEGY_TAG}: {raw}'");
            warn!(run_id = %run.run_id, value = %raw, "unrecognized retry strategy");

            let event = NewEvent::engine_event(run.run_id, message, EngineEventData::new())
                .with_level(EventLevel::Warning);
            if let Err(err) = event_log.store_event(event) {
                warn!(run_id = %run.run_id, error = %err, "failed to report retry strategy warning");
            }
            None
        }
    }
}

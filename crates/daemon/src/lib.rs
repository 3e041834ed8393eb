//! `relaunch-daemon`: automatic re-execution of failed runs.
//!
//! ```text
//! event log (RUN_FAILURE) → EventLogConsumer → filter (policy, will_retry tag)
//!                                             → submitter (resolve job, create, submit,
//!                                                          tag auto_retry_run_id)
//! ```
//!
//! All decision state lives in run tags, so the daemon can crash, restart or run
//! as several replicas without losing or (in the common case) duplicating work.

pub mod capture;
pub mod consumer;
pub mod context;
pub mod daemon;
pub mod error;
pub mod filter;
pub mod policy;
pub mod submitter;

#[cfg(test)]
mod fixtures;

pub use consumer::{
    ConsumeNewRuns, EventLogConsumer, IterationSummary, RetryAttempt,
    consume_new_runs_for_automatic_reexecution,
};
pub use context::ReexecutionContext;
pub use daemon::{
    AutoReexecutionDaemon, DAEMON_TYPE, DaemonHandle, DaemonStats, is_daemon_required,
    required_daemon_types,
};
pub use error::{DaemonError, RetryError};
pub use filter::{FilterRunsToShouldRetry, RetryCandidate, filter_runs_to_should_retry};
pub use policy::{
    RetryDecision, RetryPolicyEvaluator, SkipReason, parse_reexecution_strategy,
    reexecution_strategy,
};
pub use submitter::{RetryOutcome, retry_run};

//! Re-execution strategies.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Which steps a re-execution runs.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReexecutionStrategy {
    /// Resume from the point of failure: only steps that did not succeed.
    #[default]
    FromFailure,
    /// Execute every step of the (possibly subset-selected) job again.
    AllSteps,
}

impl ReexecutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReexecutionStrategy::FromFailure => "FROM_FAILURE",
            ReexecutionStrategy::AllSteps => "ALL_STEPS",
        }
    }

    pub fn is_resume(&self) -> bool {
        matches!(self, ReexecutionStrategy::FromFailure)
    }
}

impl core::fmt::Display for ReexecutionStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReexecutionStrategy {
    type Err = DomainError;

    /// Only the exact enumeration member names are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FROM_FAILURE" => Ok(ReexecutionStrategy::FromFailure),
            "ALL_STEPS" => Ok(ReexecutionStrategy::AllSteps),
            other => Err(DomainError::unknown_variant("re-execution strategy", other)),
        }
    }
}

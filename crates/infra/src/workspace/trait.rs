use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use relaunch_core::JobOrigin;

/// Workspace resolution error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error("code location not found: {0}")]
    LocationNotFound(String),

    #[error("code location {name} is unavailable: {reason}")]
    LocationUnavailable { name: String, reason: String },

    #[error("repository {repository} not found in location {location}")]
    RepositoryNotFound { location: String, repository: String },

    #[error("job {job} not found in repository {repository}")]
    JobNotFound { repository: String, job: String },

    #[error("invalid selection for job {job}: {reason}")]
    InvalidSelection { job: String, reason: String },
}

/// One op of a job. Each op executes as a single step keyed by its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpDefinition {
    pub name: String,
    /// Asset keys this op materializes.
    pub assets: BTreeSet<String>,
}

impl OpDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assets: BTreeSet::new(),
        }
    }

    pub fn with_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets.extend(assets.into_iter().map(Into::into));
        self
    }
}

/// A job as defined in user code: ops in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    pub ops: Vec<OpDefinition>,
}

impl JobDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: Vec::new(),
        }
    }

    pub fn with_op(mut self, op: OpDefinition) -> Self {
        self.ops.push(op);
        self
    }
}

/// A repository loaded from a code location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepository {
    pub name: String,
    jobs: BTreeMap<String, JobDefinition>,
}

impl RemoteRepository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobs: BTreeMap::new(),
        }
    }

    pub fn with_job(mut self, job: JobDefinition) -> Self {
        self.jobs.insert(job.name.clone(), job);
        self
    }

    pub fn has_job(&self, job_name: &str) -> bool {
        self.jobs.contains_key(job_name)
    }

    pub fn job(&self, job_name: &str) -> Option<&JobDefinition> {
        self.jobs.get(job_name)
    }

    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }
}

/// Identifies a job, optionally restricted to a subset of its ops or assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubsetSelector {
    pub location_name: String,
    pub repository_name: String,
    pub job_name: String,
    pub op_selection: Option<Vec<String>>,
    pub asset_selection: Option<BTreeSet<String>>,
}

impl JobSubsetSelector {
    pub fn new(origin: &JobOrigin) -> Self {
        Self {
            location_name: origin.location_name.clone(),
            repository_name: origin.repository_name.clone(),
            job_name: origin.job_name.clone(),
            op_selection: None,
            asset_selection: None,
        }
    }

    pub fn with_op_selection(mut self, ops: Option<Vec<String>>) -> Self {
        self.op_selection = ops;
        self
    }

    pub fn with_asset_selection(mut self, assets: Option<BTreeSet<String>>) -> Self {
        self.asset_selection = assets;
        self
    }
}

/// A job snapshot resolved from a code location, already narrowed to the
/// requested selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteJob {
    pub origin: JobOrigin,
    pub op_selection: Option<Vec<String>>,
    pub asset_selection: Option<BTreeSet<String>>,
    /// Steps of the (subset) job in execution order.
    pub step_keys: Vec<String>,
}

impl RemoteJob {
    pub fn name(&self) -> &str {
        &self.origin.job_name
    }

    pub fn is_subset(&self) -> bool {
        self.op_selection.is_some() || self.asset_selection.is_some()
    }
}

/// A loaded code location (a user code server).
pub trait CodeLocation: Send + Sync {
    fn name(&self) -> &str;

    fn has_repository(&self, repository_name: &str) -> bool;

    fn get_repository(&self, repository_name: &str) -> Result<RemoteRepository, WorkspaceError>;

    /// Resolve a job snapshot, honouring the selector's op/asset subset.
    fn get_job(&self, selector: &JobSubsetSelector) -> Result<RemoteJob, WorkspaceError>;
}

/// Named code locations available to the daemon.
pub trait Workspace: Send + Sync {
    fn get_code_location(&self, location_name: &str) -> Result<Arc<dyn CodeLocation>, WorkspaceError>;
}

impl<W> Workspace for Arc<W>
where
    W: Workspace + ?Sized,
{
    fn get_code_location(&self, location_name: &str) -> Result<Arc<dyn CodeLocation>, WorkspaceError> {
        (**self).get_code_location(location_name)
    }
}

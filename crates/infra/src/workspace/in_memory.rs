use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use relaunch_core::JobOrigin;

use super::r#trait::{
    CodeLocation, JobDefinition, JobSubsetSelector, RemoteJob, RemoteRepository, Workspace,
    WorkspaceError,
};

/// Code location backed by in-process repository definitions.
#[derive(Debug, Clone)]
pub struct InMemoryCodeLocation {
    name: String,
    repositories: BTreeMap<String, RemoteRepository>,
}

impl InMemoryCodeLocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repositories: BTreeMap::new(),
        }
    }

    pub fn with_repository(mut self, repository: RemoteRepository) -> Self {
        self.repositories.insert(repository.name.clone(), repository);
        self
    }

    fn job_definition(&self, selector: &JobSubsetSelector) -> Result<&JobDefinition, WorkspaceError> {
        let repository = self.repositories.get(&selector.repository_name).ok_or_else(|| {
            WorkspaceError::RepositoryNotFound {
                location: self.name.clone(),
                repository: selector.repository_name.clone(),
            }
        })?;

        repository
            .job(&selector.job_name)
            .ok_or_else(|| WorkspaceError::JobNotFound {
                repository: selector.repository_name.clone(),
                job: selector.job_name.clone(),
            })
    }
}

/// Step keys of `job` restricted to the selector's op and asset subset.
fn select_steps(job: &JobDefinition, selector: &JobSubsetSelector) -> Result<Vec<String>, WorkspaceError> {
    let invalid = |reason: String| WorkspaceError::InvalidSelection {
        job: job.name.clone(),
        reason,
    };

    if let Some(ops) = &selector.op_selection {
        if let Some(unknown) = ops.iter().find(|op| !job.ops.iter().any(|o| &o.name == *op)) {
            return Err(invalid(format!("unknown op {unknown}")));
        }
    }

    if let Some(assets) = &selector.asset_selection {
        let known: BTreeSet<&String> = job.ops.iter().flat_map(|o| o.assets.iter()).collect();
        if let Some(unknown) = assets.iter().find(|a| !known.contains(a)) {
            return Err(invalid(format!("unknown asset {unknown}")));
        }
    }

    let steps: Vec<String> = job
        .ops
        .iter()
        .filter(|op| {
            selector
                .op_selection
                .as_ref()
                .is_none_or(|ops| ops.contains(&op.name))
        })
        .filter(|op| {
            selector
                .asset_selection
                .as_ref()
                .is_none_or(|assets| !op.assets.is_disjoint(assets))
        })
        .map(|op| op.name.clone())
        .collect();

    if steps.is_empty() {
        return Err(invalid("selection matches no steps".to_string()));
    }

    Ok(steps)
}

impl CodeLocation for InMemoryCodeLocation {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_repository(&self, repository_name: &str) -> bool {
        self.repositories.contains_key(repository_name)
    }

    fn get_repository(&self, repository_name: &str) -> Result<RemoteRepository, WorkspaceError> {
        self.repositories
            .get(repository_name)
            .cloned()
            .ok_or_else(|| WorkspaceError::RepositoryNotFound {
                location: self.name.clone(),
                repository: repository_name.to_string(),
            })
    }

    fn get_job(&self, selector: &JobSubsetSelector) -> Result<RemoteJob, WorkspaceError> {
        let job = self.job_definition(selector)?;
        let step_keys = select_steps(job, selector)?;

        Ok(RemoteJob {
            origin: JobOrigin::new(
                self.name.clone(),
                selector.repository_name.clone(),
                job.name.clone(),
            ),
            op_selection: selector.op_selection.clone(),
            asset_selection: selector.asset_selection.clone(),
            step_keys,
        })
    }
}

#[derive(Debug, Clone)]
enum LocationEntry {
    Loaded(Arc<InMemoryCodeLocation>),
    Unavailable(String),
}

/// In-memory workspace. Locations can be swapped or marked unreachable at runtime.
#[derive(Debug, Default)]
pub struct InMemoryWorkspace {
    locations: RwLock<BTreeMap<String, LocationEntry>>,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(self, location: InMemoryCodeLocation) -> Self {
        self.add_location(location);
        self
    }

    /// Add or replace a location.
    pub fn add_location(&self, location: InMemoryCodeLocation) {
        if let Ok(mut locations) = self.locations.write() {
            locations.insert(location.name.clone(), LocationEntry::Loaded(Arc::new(location)));
        }
    }

    pub fn remove_location(&self, name: &str) {
        if let Ok(mut locations) = self.locations.write() {
            locations.remove(name);
        }
    }

    /// Keep the location registered but fail every lookup (server down, load error).
    pub fn mark_unavailable(&self, name: &str, reason: impl Into<String>) {
        if let Ok(mut locations) = self.locations.write() {
            locations.insert(name.to_string(), LocationEntry::Unavailable(reason.into()));
        }
    }
}

impl Workspace for InMemoryWorkspace {
    fn get_code_location(&self, location_name: &str) -> Result<Arc<dyn CodeLocation>, WorkspaceError> {
        let locations = self.locations.read().map_err(|_| WorkspaceError::LocationUnavailable {
            name: location_name.to_string(),
            reason: "lock poisoned".to_string(),
        })?;

        match locations.get(location_name) {
            Some(LocationEntry::Loaded(location)) => Ok(location.clone() as Arc<dyn CodeLocation>),
            Some(LocationEntry::Unavailable(reason)) => Err(WorkspaceError::LocationUnavailable {
                name: location_name.to_string(),
                reason: reason.clone(),
            }),
            None => Err(WorkspaceError::LocationNotFound(location_name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::OpDefinition;

    fn location() -> InMemoryCodeLocation {
        InMemoryCodeLocation::new("etl_location").with_repository(
            RemoteRepository::new("etl_repo").with_job(
                JobDefinition::new("etl")
                    .with_op(OpDefinition::new("extract").with_assets(["raw"]))
                    .with_op(OpDefinition::new("transform").with_assets(["clean"]))
                    .with_op(OpDefinition::new("load").with_assets(["warehouse"])),
            ),
        )
    }

    fn selector() -> JobSubsetSelector {
        JobSubsetSelector::new(&JobOrigin::new("etl_location", "etl_repo", "etl"))
    }

    #[test]
    fn full_job_resolves_every_step() {
        let job = location().get_job(&selector()).unwrap();
        assert_eq!(job.step_keys, vec!["extract", "transform", "load"]);
        assert!(!job.is_subset());
        assert_eq!(job.name(), "etl");
    }

    #[test]
    fn op_selection_narrows_steps_and_rejects_unknown_ops() {
        let loc = location();
        let job = loc
            .get_job(&selector().with_op_selection(Some(vec!["load".into(), "extract".into()])))
            .unwrap();
        assert_eq!(job.step_keys, vec!["extract", "load"]);
        assert!(job.is_subset());

        let err = loc
            .get_job(&selector().with_op_selection(Some(vec!["nope".into()])))
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidSelection { .. }));
    }

    #[test]
    fn asset_selection_picks_producing_ops() {
        let job = location()
            .get_job(&selector().with_asset_selection(Some(BTreeSet::from(["clean".to_string()]))))
            .unwrap();
        assert_eq!(job.step_keys, vec!["transform"]);
        assert_eq!(job.asset_selection, Some(BTreeSet::from(["clean".to_string()])));
    }

    #[test]
    fn missing_repository_and_job_are_reported() {
        let loc = location();
        assert!(loc.has_repository("etl_repo"));
        assert!(!loc.has_repository("other"));
        assert!(loc.get_repository("etl_repo").unwrap().has_job("etl"));

        let mut missing_job = selector();
        missing_job.job_name = "gone".into();
        assert!(matches!(
            loc.get_job(&missing_job),
            Err(WorkspaceError::JobNotFound { .. })
        ));
    }

    #[test]
    fn workspace_lookup_reports_unknown_and_unavailable_locations() {
        let workspace = InMemoryWorkspace::new().with_location(location());
        assert_eq!(workspace.get_code_location("etl_location").unwrap().name(), "etl_location");

        assert!(matches!(
            workspace.get_code_location("missing"),
            Err(WorkspaceError::LocationNotFound(name)) if name == "missing"
        ));

        workspace.mark_unavailable("etl_location", "grpc server down");
        assert!(matches!(
            workspace.get_code_location("etl_location"),
            Err(WorkspaceError::LocationUnavailable { .. })
        ));
    }
}

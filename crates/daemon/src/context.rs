use std::sync::Arc;

use relaunch_core::RunRetriesSettings;
use relaunch_infra::{EventLog, RunCoordinator, RunStore, Workspace};

/// Collaborators the re-execution logic runs against.
///
/// Cheap to clone; every collaborator is shared.
#[derive(Clone)]
pub struct ReexecutionContext {
    pub run_store: Arc<dyn RunStore>,
    pub event_log: Arc<dyn EventLog>,
    pub workspace: Arc<dyn Workspace>,
    pub coordinator: Arc<dyn RunCoordinator>,
    pub settings: RunRetriesSettings,
}

impl ReexecutionContext {
    pub fn new(
        run_store: Arc<dyn RunStore>,
        event_log: Arc<dyn EventLog>,
        workspace: Arc<dyn Workspace>,
        coordinator: Arc<dyn RunCoordinator>,
        settings: RunRetriesSettings,
    ) -> Self {
        Self {
            run_store,
            event_log,
            workspace,
            coordinator,
            settings,
        }
    }

    pub fn with_settings(mut self, settings: RunRetriesSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl std::fmt::Debug for ReexecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReexecutionContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use relaunch_core::{Run, RunGroup, RunId, RunRecord, RunStatus, RunTags};

use super::r#trait::{RunStore, RunStoreError, RunsFilter};

#[derive(Debug, Default)]
struct Inner {
    /// Insertion order == storage id order.
    records: Vec<RunRecord>,
    index: HashMap<RunId, usize>,
}

impl Inner {
    fn record_mut(&mut self, run_id: RunId) -> Result<&mut RunRecord, RunStoreError> {
        let idx = *self.index.get(&run_id).ok_or(RunStoreError::NotFound(run_id))?;
        Ok(&mut self.records[idx])
    }
}

/// In-memory run store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    inner: RwLock<Inner>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every run (test isolation).
    pub fn wipe(&self) -> Result<(), RunStoreError> {
        let mut inner = self.write()?;
        inner.records.clear();
        inner.index.clear();
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, RunStoreError> {
        self.inner
            .read()
            .map_err(|_| RunStoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, RunStoreError> {
        self.inner
            .write()
            .map_err(|_| RunStoreError::Storage("lock poisoned".to_string()))
    }
}

impl RunStore for InMemoryRunStore {
    fn add_run(&self, run: Run) -> Result<RunRecord, RunStoreError> {
        let mut inner = self.write()?;
        if inner.index.contains_key(&run.run_id) {
            return Err(RunStoreError::AlreadyExists(run.run_id));
        }

        let now = Utc::now();
        let record = RunRecord {
            storage_id: inner.records.len() as u64 + 1,
            run,
            create_timestamp: now,
            update_timestamp: now,
        };

        let idx = inner.records.len();
        inner.index.insert(record.run.run_id, idx);
        inner.records.push(record.clone());
        Ok(record)
    }

    fn get_run_by_id(&self, run_id: RunId) -> Result<Option<Run>, RunStoreError> {
        let inner = self.read()?;
        Ok(inner
            .index
            .get(&run_id)
            .map(|&idx| inner.records[idx].run.clone()))
    }

    fn get_run_records(
        &self,
        filter: &RunsFilter,
        limit: Option<usize>,
    ) -> Result<Vec<RunRecord>, RunStoreError> {
        let inner = self.read()?;
        Ok(inner
            .records
            .iter()
            .filter(|record| filter.matches(&record.run))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn add_run_tags(&self, run_id: RunId, tags: &RunTags) -> Result<(), RunStoreError> {
        let mut inner = self.write()?;
        let record = inner.record_mut(run_id)?;
        record.run.tags.merge(tags);
        record.update_timestamp = Utc::now();
        Ok(())
    }

    fn update_run_status(&self, run_id: RunId, status: RunStatus) -> Result<(), RunStoreError> {
        let mut inner = self.write()?;
        let record = inner.record_mut(run_id)?;
        record.run.status = status;
        record.update_timestamp = Utc::now();
        Ok(())
    }

    fn get_run_group(&self, run_id: RunId) -> Result<Option<RunGroup>, RunStoreError> {
        let inner = self.read()?;
        let Some(&idx) = inner.index.get(&run_id) else {
            return Ok(None);
        };

        let root = inner.records[idx].run.lineage_root();
        let runs = inner
            .records
            .iter()
            .filter(|record| record.run.lineage_root() == root)
            .map(|record| record.run.clone())
            .collect();

        Ok(Some(RunGroup::new(root, runs)))
    }
}

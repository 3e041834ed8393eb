use std::sync::RwLock;

use relaunch_core::RunId;
use relaunch_events::{EventRecord, EventType, NewEvent};

use super::r#trait::{EventLog, EventLogError};

/// In-memory event log.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    records: RwLock<Vec<EventRecord>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record, oldest first.
    pub fn all(&self) -> Result<Vec<EventRecord>, EventLogError> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<EventRecord>>, EventLogError> {
        self.records
            .read()
            .map_err(|_| EventLogError::Storage("lock poisoned".to_string()))
    }
}

impl EventLog for InMemoryEventLog {
    fn store_event(&self, event: NewEvent) -> Result<EventRecord, EventLogError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| EventLogError::Storage("lock poisoned".to_string()))?;

        let storage_id = records.last().map(|r| r.storage_id()).unwrap_or(0) + 1;
        let record = EventRecord::new(storage_id, event);
        records.push(record.clone());
        Ok(record)
    }

    fn get_records_after(
        &self,
        cursor: Option<u64>,
        event_types: &[EventType],
        limit: usize,
    ) -> Result<Vec<EventRecord>, EventLogError> {
        let records = self.read()?;
        let after = cursor.unwrap_or(0);

        // Storage ids are dense and start at 1, so the first candidate index is `after`.
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(records.len());

        Ok(records[start..]
            .iter()
            .filter(|r| r.storage_id() > after)
            .filter(|r| event_types.is_empty() || event_types.contains(&r.event_type()))
            .take(limit)
            .cloned()
            .collect())
    }

    fn max_storage_id(&self) -> Result<Option<u64>, EventLogError> {
        Ok(self.read()?.last().map(|r| r.storage_id()))
    }

    fn logs_for_run(&self, run_id: RunId) -> Result<Vec<EventRecord>, EventLogError> {
        Ok(self
            .read()?
            .iter()
            .filter(|r| r.run_id() == run_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaunch_core::RunFailureReason;
    use relaunch_events::{EngineEventData, EventLevel, MetadataValue, RunEventKind};

    fn failure(run_id: RunId) -> NewEvent {
        NewEvent::new(
            run_id,
            EventLevel::Error,
            "run failed",
            RunEventKind::RunFailure {
                reason: Some(RunFailureReason::StepFailure),
            },
        )
    }

    #[test]
    fn storage_ids_are_monotonic() {
        let log = InMemoryEventLog::new();
        assert_eq!(log.max_storage_id().unwrap(), None);

        let run_id = RunId::new();
        let a = log.store_event(failure(run_id)).unwrap();
        let b = log
            .store_event(NewEvent::new(run_id, EventLevel::Info, "started", RunEventKind::RunStart))
            .unwrap();

        assert_eq!(a.storage_id(), 1);
        assert_eq!(b.storage_id(), 2);
        assert_eq!(log.max_storage_id().unwrap(), Some(2));
    }

    #[test]
    fn records_after_cursor_respect_type_filter_and_limit() {
        let log = InMemoryEventLog::new();
        let run_id = RunId::new();
        log.store_event(failure(run_id)).unwrap(); // 1
        log.store_event(NewEvent::new(run_id, EventLevel::Info, "s", RunEventKind::RunSuccess))
            .unwrap(); // 2
        log.store_event(failure(run_id)).unwrap(); // 3
        log.store_event(failure(run_id)).unwrap(); // 4

        let all_failures = log.get_records_after(None, &[EventType::RunFailure], 10).unwrap();
        assert_eq!(
            all_failures.iter().map(|r| r.storage_id()).collect::<Vec<_>>(),
            vec![1, 3, 4]
        );

        let after_one = log.get_records_after(Some(1), &[EventType::RunFailure], 1).unwrap();
        assert_eq!(after_one.len(), 1);
        assert_eq!(after_one[0].storage_id(), 3);

        assert!(log.get_records_after(Some(4), &[], 10).unwrap().is_empty());
        assert!(log.get_records_after(Some(99), &[], 10).unwrap().is_empty());
    }

    #[test]
    fn engine_events_are_scoped_to_their_run() {
        let log = InMemoryEventLog::new();
        let run_id = RunId::new();
        let other = RunId::new();

        log.report_engine_event(
            run_id,
            "Retrying the run",
            EngineEventData::new().with_metadata("new run", MetadataValue::Run(other)),
        )
        .unwrap();
        log.report_engine_event(other, "Launched as an automatic retry", EngineEventData::new())
            .unwrap();

        let logs = log.logs_for_run(run_id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message(), "Retrying the run");
        assert_eq!(logs[0].level(), EventLevel::Info);
        assert_eq!(
            logs[0]
                .engine_event_data()
                .and_then(|d| d.get("new run"))
                .and_then(MetadataValue::as_run),
            Some(other)
        );
    }
}

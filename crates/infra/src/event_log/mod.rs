//! Run event log boundary.
//!
//! The event log is the daemon's input (failure events are consumed by cursor)
//! and its user-facing output (engine events explain every decision).

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventLog;
pub use r#trait::{EventLog, EventLogError};

use relaunch_core::RunId;
use relaunch_events::{EventBus, EventRecord, EventType, NewEvent};

/// Adapter that publishes stored records to an `EventBus` after a successful append.
///
/// Publish happens only after the store step succeeds.
pub struct PublishingEventLog<L, B> {
    log: L,
    bus: B,
}

impl<L, B> PublishingEventLog<L, B> {
    pub fn new(log: L, bus: B) -> Self {
        Self { log, bus }
    }

    pub fn into_parts(self) -> (L, B) {
        (self.log, self.bus)
    }
}

impl<L, B> EventLog for PublishingEventLog<L, B>
where
    L: EventLog,
    B: EventBus<EventRecord>,
{
    fn store_event(&self, event: NewEvent) -> Result<EventRecord, EventLogError> {
        let record = self.log.store_event(event)?;

        self.bus
            .publish(record.clone())
            .map_err(|err| EventLogError::Publish(format!("{err:?}")))?;

        Ok(record)
    }

    fn get_records_after(
        &self,
        cursor: Option<u64>,
        event_types: &[EventType],
        limit: usize,
    ) -> Result<Vec<EventRecord>, EventLogError> {
        self.log.get_records_after(cursor, event_types, limit)
    }

    fn max_storage_id(&self) -> Result<Option<u64>, EventLogError> {
        self.log.max_storage_id()
    }

    fn logs_for_run(&self, run_id: RunId) -> Result<Vec<EventRecord>, EventLogError> {
        self.log.logs_for_run(run_id)
    }
}

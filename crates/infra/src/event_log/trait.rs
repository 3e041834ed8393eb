use std::sync::Arc;

use thiserror::Error;

use relaunch_core::RunId;
use relaunch_events::{EngineEventData, EventRecord, EventType, NewEvent};

/// Event log operation error.
///
/// ## Error Categories
///
/// - **Storage**: the backing store rejected the read or write
/// - **Publish**: the event was stored but fan-out to subscribers failed
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("publish failed: {0}")]
    Publish(String),
}

/// Append-only, globally ordered log of run events.
///
/// ## Semantics
///
/// - Every stored event is assigned a `storage_id` strictly greater than all
///   previously assigned ids.
/// - `get_records_after(cursor, ..)` returns records with `storage_id > cursor`
///   (or from the start when `cursor` is `None`), oldest first.
pub trait EventLog: Send + Sync {
    fn store_event(&self, event: NewEvent) -> Result<EventRecord, EventLogError>;

    /// Records after `cursor` whose type is one of `event_types` (all types when empty).
    fn get_records_after(
        &self,
        cursor: Option<u64>,
        event_types: &[EventType],
        limit: usize,
    ) -> Result<Vec<EventRecord>, EventLogError>;

    /// Largest storage id assigned so far, `None` for an empty log.
    fn max_storage_id(&self) -> Result<Option<u64>, EventLogError>;

    /// Every record for one run, oldest first.
    fn logs_for_run(&self, run_id: RunId) -> Result<Vec<EventRecord>, EventLogError>;

    /// Attach a user-visible engine event to a run.
    fn report_engine_event(
        &self,
        run_id: RunId,
        message: &str,
        data: EngineEventData,
    ) -> Result<EventRecord, EventLogError> {
        self.store_event(NewEvent::engine_event(run_id, message, data))
    }
}

impl<L> EventLog for Arc<L>
where
    L: EventLog + ?Sized,
{
    fn store_event(&self, event: NewEvent) -> Result<EventRecord, EventLogError> {
        (**self).store_event(event)
    }

    fn get_records_after(
        &self,
        cursor: Option<u64>,
        event_types: &[EventType],
        limit: usize,
    ) -> Result<Vec<EventRecord>, EventLogError> {
        (**self).get_records_after(cursor, event_types, limit)
    }

    fn max_storage_id(&self) -> Result<Option<u64>, EventLogError> {
        (**self).max_storage_id()
    }

    fn logs_for_run(&self, run_id: RunId) -> Result<Vec<EventRecord>, EventLogError> {
        (**self).logs_for_run(run_id)
    }
}

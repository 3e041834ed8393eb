//! Run event records, engine event payloads and the pub/sub transport used to
//! fan them out.

pub mod bus;
pub mod engine;
pub mod in_memory_bus;
pub mod record;

pub use bus::{EventBus, Subscription};
pub use engine::{EngineEventData, ErrorInfo, MetadataValue};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use record::{EventLevel, EventRecord, EventType, NewEvent, RunEventKind};

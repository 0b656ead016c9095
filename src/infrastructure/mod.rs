pub mod events;
pub mod logging;
pub mod persistence;

pub use events::{emit_event, EventEmitter, LogEmitter, OrchestratorEvent};
pub use persistence::{JsonStateStore, MemoryStateStore, StatePersistence};

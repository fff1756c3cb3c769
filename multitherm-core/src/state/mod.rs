//! Operator-facing state
//!
//! Intents flow into the scheduler, events and snapshots flow out.

pub mod events;
pub mod intents;
pub mod snapshot;

pub use events::{ControlEvent, PersistRequest};
pub use intents::{Intent, IntentError};
pub use snapshot::{AutotuneSnapshot, LoopSnapshot};

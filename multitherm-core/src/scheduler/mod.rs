//! Loop scheduler
//!
//! Sequences the periodic control work for every loop on a single owner.

pub mod cadence;
pub mod executor;

pub use cadence::Cadence;
pub use executor::{
    LoopScheduler, PassReport, ALARM_BLINK_MS, MAX_EVENTS, MAX_PERSIST, STATUS_BROADCAST_MS,
};

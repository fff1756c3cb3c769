//! Safety monitoring
//!
//! Alarm evaluation and latching fault detection for each loop.

pub mod alarm;
pub mod fault;

pub use alarm::{evaluate, AlarmLimits, AlarmStatus, AlarmSummary};
pub use fault::{check_open_circuit, LoopError, RunawayDetector};

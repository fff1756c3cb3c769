//! Board-agnostic core logic for the multi-loop thermocouple controller
//!
//! This crate contains all application logic that does not depend on
//! specific hardware implementations:
//!
//! - Hardware abstraction traits (thermocouple bus, relay outputs, flash)
//! - Sensor polling and error accumulation
//! - PI control, relay windowing and relay-feedback autotune
//! - Alarm evaluation and latching fault detection
//! - The cooperative loop scheduler
//! - Configuration types and persistence

#![no_std]
#![deny(unsafe_code)]

pub mod config;
pub mod control;
pub mod safety;
pub mod scheduler;
pub mod sensor;
pub mod state;
pub mod traits;

/// Monotonic milliseconds since boot
pub type Millis = u64;

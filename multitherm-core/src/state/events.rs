//! Events reported by the control pass

use crate::control::{AutotuneError, AutotuneResult, Gains};
use crate::safety::LoopError;

/// Configuration that changed and should be written to flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistRequest {
    /// One loop's configuration
    Loop(u8),
    /// Controller-wide configuration
    Global,
}

/// Noteworthy transitions, for logging and the remote link
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlEvent {
    /// No amplifier answered at boot
    SensorOffline { loop_index: u8 },
    /// Too many failed reads in the accumulation window
    ReadingZeroed { loop_index: u8, failures: u8 },
    /// A fault latched and the heater was forced off
    FaultLatched { loop_index: u8, error: LoopError },
    /// Operator switched the output
    OutputChanged { loop_index: u8, enabled: bool },
    AutotuneStarted { loop_index: u8 },
    /// Gains found, waiting for save or cancel
    AutotuneComplete {
        loop_index: u8,
        result: AutotuneResult,
    },
    AutotuneFailed {
        loop_index: u8,
        reason: AutotuneError,
    },
    AutotuneCancelled { loop_index: u8 },
    AutotuneSaved { loop_index: u8, gains: Gains },
}

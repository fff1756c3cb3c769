//! Latching loop faults
//!
//! Two fault classes force a loop's heater off until the operator cycles
//! the output off and on again:
//! - open or shorted thermocouple, seen as a near-zero reading
//! - runaway, seen as a reading that does not move while the output is
//!   pinned at full power

use crate::Millis;

/// Readings below this with the output enabled mean open/short (°C)
pub const OPEN_CIRCUIT_THRESHOLD: f32 = 0.1;

/// Runaway check period (ms)
pub const RUNAWAY_CHECK_MS: Millis = 2000;

/// Output above this percentage counts as pinned
pub const RUNAWAY_OUTPUT_PERCENT: f32 = 99.9;

/// Latched loop fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopError {
    #[default]
    Ok,
    /// Reading stayed flat while the output was pinned
    Runaway,
    /// Thermocouple open or shorted
    OpenOrShort,
}

impl LoopError {
    pub fn is_fault(self) -> bool {
        self != LoopError::Ok
    }

    /// Short code shown in place of the status
    pub fn code(self) -> Option<&'static str> {
        match self {
            LoopError::Ok => None,
            LoopError::Runaway => Some("E-RUN"),
            LoopError::OpenOrShort => Some("E-OPN"),
        }
    }
}

/// Open/short check for one reading
pub fn check_open_circuit(measured: f32, output_enabled: bool) -> bool {
    output_enabled && measured < OPEN_CIRCUIT_THRESHOLD
}

/// Round to tenths of a degree, the resolution readings are compared at
fn to_tenths(value: f32) -> i32 {
    let scaled = value * 10.0;
    if scaled >= 0.0 {
        (scaled + 0.5) as i32
    } else {
        (scaled - 0.5) as i32
    }
}

/// Stuck-reading tracker for one loop
///
/// Every check stamps exactly one of `last_equal` or `last_unequal`, so the
/// stuck time is the span since the reading last moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunawayDetector {
    previous_tenths: Option<i32>,
    last_equal: Millis,
    last_unequal: Millis,
}

impl RunawayDetector {
    pub const fn new() -> Self {
        Self {
            previous_tenths: None,
            last_equal: 0,
            last_unequal: 0,
        }
    }

    /// Forget all history
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Record a reading taken at `now`
    ///
    /// The first reading after a reset counts as a change.
    pub fn sample(&mut self, measured: f32, now: Millis) {
        let tenths = to_tenths(measured);
        if self.previous_tenths == Some(tenths) {
            self.last_equal = now;
        } else {
            self.last_unequal = now;
        }
        self.previous_tenths = Some(tenths);
    }

    /// Time the reading has been unchanged (ms)
    pub fn stuck_ms(&self) -> Millis {
        if self.last_equal > self.last_unequal {
            self.last_equal - self.last_unequal
        } else {
            0
        }
    }

    /// Sample and decide whether the loop has run away
    pub fn check(
        &mut self,
        measured: f32,
        now: Millis,
        output_percent: f32,
        output_enabled: bool,
        timeout_s: u32,
    ) -> bool {
        self.sample(measured, now);

        output_percent > RUNAWAY_OUTPUT_PERCENT
            && output_enabled
            && measured > 0.0
            && self.stuck_ms() >= timeout_s as Millis * 1000
    }
}

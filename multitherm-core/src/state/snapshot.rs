//! Read-only views for the display

use heapless::String;

use crate::config::MAX_LABEL_LEN;
use crate::control::{AutotuneState, Gains, Loop, LoopStatus};
use crate::safety::{AlarmStatus, LoopError};

/// One display row
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopSnapshot {
    pub index: u8,
    pub label: String<MAX_LABEL_LEN>,
    pub setpoint: f32,
    pub measured: f32,
    pub output_percent: f32,
    pub output_enabled: bool,
    pub sensor_online: bool,
    pub loop_error: LoopError,
    pub alarm: AlarmStatus,
    pub status: LoopStatus,
}

impl LoopSnapshot {
    pub fn from_loop(lp: &Loop, window: f32) -> Self {
        let mut label = String::new();
        // Labels share the config capacity, so this cannot overflow
        let _ = label.push_str(lp.label());

        Self {
            index: lp.index(),
            label,
            setpoint: lp.setpoint(),
            measured: lp.measured(),
            output_percent: lp.output_percent(window),
            output_enabled: lp.output_enabled(),
            sensor_online: lp.sensor_online(),
            loop_error: lp.error(),
            alarm: lp.alarm(),
            status: lp.status(),
        }
    }

    /// Status column text, an error code takes precedence
    pub fn status_text(&self) -> &'static str {
        if let Some(code) = self.loop_error.code() {
            return code;
        }
        if !self.sensor_online {
            return "N/C";
        }
        self.status.code().as_str()
    }

    /// Whether the row is drawn in this blink phase
    ///
    /// Faulted rows blink; everything else stays visible.
    pub fn visible(&self, blink_on: bool) -> bool {
        blink_on || !self.loop_error.is_fault()
    }
}

/// Autotune screen contents for the selected loop
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AutotuneSnapshot {
    pub loop_index: u8,
    pub state: AutotuneState,
    pub cycle: u8,
    /// Gains in force when the session started
    pub baseline_gains: Gains,
    /// Gains found, once the session is done
    pub new_gains: Option<Gains>,
    pub setpoint: f32,
    pub measured: f32,
    pub output_percent: f32,
}

impl AutotuneSnapshot {
    /// Snapshot of a loop's session, `None` when it has none
    pub fn from_loop(lp: &Loop, window: f32) -> Option<Self> {
        let session = lp.autotune()?;
        Some(Self {
            loop_index: lp.index(),
            state: session.state(),
            cycle: session.cycle(),
            baseline_gains: session.previous_gains(),
            new_gains: session.result().map(|result| result.gains),
            setpoint: lp.setpoint(),
            measured: lp.measured(),
            output_percent: lp.output_percent(window),
        })
    }
}

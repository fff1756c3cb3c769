//! Configuration type definitions
//!
//! These types hold the deployment configuration. They are stored in flash
//! as part of a postcard-serialized [`ConfigImage`](super::ConfigImage).

use heapless::String;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use multitherm_protocol::MAX_LABEL_LEN;

/// Maximum number of control loops
pub const MAX_LOOPS: usize = 5;

/// Highest thermocouple amplifier filter coefficient
pub const MAX_FILTER_COEFFICIENT: u8 = 7;

/// Smallest accepted relay window
pub const MIN_WINDOW_SIZE_MS: u32 = 100;

/// Read budget per loop used to size the error accumulation window
pub const ERROR_WINDOW_PER_LOOP_MS: u64 = 220;

/// Thermocouple type configured on the amplifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ThermocoupleType {
    #[default]
    K,
    J,
    T,
    N,
    S,
    E,
    B,
    R,
}

impl ThermocoupleType {
    /// Type field value in the amplifier's sensor configuration register
    pub const fn register_bits(self) -> u8 {
        match self {
            ThermocoupleType::K => 0b000,
            ThermocoupleType::J => 0b001,
            ThermocoupleType::T => 0b010,
            ThermocoupleType::N => 0b011,
            ThermocoupleType::S => 0b100,
            ThermocoupleType::E => 0b101,
            ThermocoupleType::B => 0b110,
            ThermocoupleType::R => 0b111,
        }
    }
}

/// Controller-wide configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GlobalConfig {
    /// Number of active loops (1..=5), fixed at boot
    pub num_loops: u8,
    /// Lowest settable setpoint (°C)
    pub setpoint_min: f32,
    /// Highest settable setpoint (°C)
    pub setpoint_max: f32,
    /// Relay window length (ms)
    pub window_size_ms: u32,
    /// Time a pinned output may see an unchanged reading before runaway (s)
    pub timeout_s: u32,
    /// Failed reads per accumulation window before the reading is zeroed
    pub consecutive_error_limit: u8,
    /// Thermocouple type for every channel
    pub thermocouple: ThermocoupleType,
    /// Amplifier digital filter coefficient (0 = off, 7 = max)
    pub filter_coefficient: u8,
    /// Kp step used by the display when editing gains
    pub kp_tuning: f32,
    /// Relay amplitude as a fraction of the baseline output for autotune
    pub delta_out: f32,
    /// Allow operator setpoint changes
    pub sp_change_enabled: bool,
    /// Allow operator autotune
    pub autotune_enabled: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            num_loops: MAX_LOOPS as u8,
            setpoint_min: 0.0,
            setpoint_max: 400.0,
            window_size_ms: 2000,
            timeout_s: 300,
            consecutive_error_limit: 5,
            thermocouple: ThermocoupleType::K,
            filter_coefficient: 2,
            kp_tuning: 1.0,
            delta_out: 0.5,
            sp_change_enabled: true,
            autotune_enabled: true,
        }
    }
}

impl GlobalConfig {
    /// Clamp loaded values into their legal ranges
    ///
    /// Values that cannot be repaired fall back to the defaults.
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        self.num_loops = self.num_loops.clamp(1, MAX_LOOPS as u8);

        if !self.setpoint_min.is_finite()
            || !self.setpoint_max.is_finite()
            || self.setpoint_min >= self.setpoint_max
        {
            self.setpoint_min = defaults.setpoint_min;
            self.setpoint_max = defaults.setpoint_max;
        }

        self.window_size_ms = self.window_size_ms.max(MIN_WINDOW_SIZE_MS);
        self.timeout_s = self.timeout_s.max(1);
        self.consecutive_error_limit = self.consecutive_error_limit.max(1);
        self.filter_coefficient = self.filter_coefficient.min(MAX_FILTER_COEFFICIENT);

        if !self.kp_tuning.is_finite() || self.kp_tuning <= 0.0 {
            self.kp_tuning = defaults.kp_tuning;
        }
        if !self.delta_out.is_finite() || self.delta_out <= 0.0 || self.delta_out > 1.0 {
            self.delta_out = defaults.delta_out;
        }
    }

    /// Clamp a setpoint into `[setpoint_min, setpoint_max]`
    pub fn clamp_setpoint(&self, setpoint: f32) -> f32 {
        setpoint.clamp(self.setpoint_min, self.setpoint_max)
    }

    /// Length of the failed-read accumulation window (ms)
    pub fn error_rollover_ms(&self) -> u64 {
        self.num_loops as u64 * ERROR_WINDOW_PER_LOOP_MS * self.consecutive_error_limit as u64
    }

    /// Relay window length as a float, the unit of the output command
    pub fn window_size(&self) -> f32 {
        self.window_size_ms as f32
    }
}

/// Per-loop persisted configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LoopConfig {
    /// Display label
    pub label: String<MAX_LABEL_LEN>,
    /// Target temperature (°C)
    pub setpoint: f32,
    /// Proportional gain (window ms per °C)
    pub kp: f32,
    /// Integral gain (window ms per °C·s)
    pub ki: f32,
    /// Low alarm limit (°C), disabled at or below 0.5
    pub low_alarm: f32,
    /// High alarm limit (°C), disabled at or below 0.5
    pub high_alarm: f32,
    /// Calibration offset added to every raw reading (°C)
    pub temp_offset: f32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            label: String::new(),
            setpoint: 100.0,
            kp: 20.0,
            ki: 1.0,
            low_alarm: 0.0,
            high_alarm: 0.0,
            temp_offset: 0.0,
        }
    }
}

impl LoopConfig {
    /// Repair a loaded loop configuration against the global limits
    pub fn sanitize(&mut self, global: &GlobalConfig) {
        let defaults = Self::default();

        self.setpoint = if self.setpoint.is_finite() {
            global.clamp_setpoint(self.setpoint)
        } else {
            global.clamp_setpoint(defaults.setpoint)
        };

        for (value, fallback) in [
            (&mut self.kp, defaults.kp),
            (&mut self.ki, defaults.ki),
        ] {
            if !value.is_finite() || *value < 0.0 {
                *value = fallback;
            }
        }

        for value in [
            &mut self.low_alarm,
            &mut self.high_alarm,
            &mut self.temp_offset,
        ] {
            if !value.is_finite() {
                *value = 0.0;
            }
        }
    }
}

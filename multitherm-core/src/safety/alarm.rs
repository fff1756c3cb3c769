//! High/low process alarms
//!
//! Alarms are advisory and never latch. A limit at or below
//! [`ALARM_ENABLE_THRESHOLD`] is treated as disabled.

/// Limits at or below this value disable the alarm (°C)
pub const ALARM_ENABLE_THRESHOLD: f32 = 0.5;

/// Alarm state of one loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmStatus {
    #[default]
    None,
    Low,
    High,
}

/// Alarm limits of one loop
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlarmLimits {
    pub low: f32,
    pub high: f32,
}

/// Evaluate the alarm state for a reading
///
/// `High` takes precedence when both limits are crossed.
pub fn evaluate(measured: f32, limits: AlarmLimits) -> AlarmStatus {
    if limits.high > ALARM_ENABLE_THRESHOLD && measured >= limits.high {
        AlarmStatus::High
    } else if limits.low > ALARM_ENABLE_THRESHOLD && measured <= limits.low {
        AlarmStatus::Low
    } else {
        AlarmStatus::None
    }
}

/// Aggregate alarm state across all loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlarmSummary {
    /// Some enabled loop is in alarm
    pub active: bool,
}

impl AlarmSummary {
    /// Fold `(output_enabled, status)` pairs
    ///
    /// Loops with their output disabled never contribute.
    pub fn from_loops<I>(loops: I) -> Self
    where
        I: IntoIterator<Item = (bool, AlarmStatus)>,
    {
        let active = loops
            .into_iter()
            .any(|(enabled, status)| enabled && status != AlarmStatus::None);
        Self { active }
    }

    /// Banner text for the display
    pub fn text(&self) -> &'static str {
        if self.active {
            "ALARM"
        } else {
            ""
        }
    }
}

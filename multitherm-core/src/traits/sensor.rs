//! Thermocouple acquisition trait

use crate::config::ThermocoupleType;

/// Errors that can occur with temperature sensing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// Channel index has no amplifier behind it
    NoSuchChannel,
    /// Amplifier did not answer on the bus
    Bus,
    /// No new conversion since the last read
    NotReady,
    /// Amplifier reported an input range fault
    OutOfRange,
}

/// Bank of thermocouple amplifiers, one per loop channel
///
/// Reads return the raw hot-junction temperature; calibration offsets are
/// applied by the caller.
pub trait ThermocoupleBus {
    /// Probe whether an amplifier answers on `channel`
    ///
    /// Called once per channel at boot.
    fn is_connected(&mut self, channel: u8) -> bool;

    /// Check whether a new conversion is ready on `channel`
    fn available(&mut self, channel: u8) -> bool;

    /// Read the hot-junction temperature in degrees Celsius
    fn read_temperature(&mut self, channel: u8) -> Result<f32, SensorError>;

    /// Apply thermocouple type and filter settings to `channel`
    ///
    /// Amplifiers with fixed settings can keep the default no-op.
    fn configure(
        &mut self,
        _channel: u8,
        _thermocouple: ThermocoupleType,
        _filter_coefficient: u8,
    ) -> Result<(), SensorError> {
        Ok(())
    }
}

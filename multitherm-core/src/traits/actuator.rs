//! Heater relay and alert output trait

/// Bank of per-loop heater outputs plus a shared alert output
///
/// The scheduler calls these every pass with the desired level.
/// Implementations should only touch the hardware when a level changes.
pub trait ActuatorBus {
    /// Drive the heater output of `channel`
    fn set_output(&mut self, channel: u8, on: bool);

    /// Drive the shared alert (lamp/buzzer) output
    fn set_alert(&mut self, on: bool);
}

//! Round-robin thermocouple polling
//!
//! One channel is read per poll tick, so every loop is refreshed once per
//! `num_loops × SENSOR_POLL_MS`. Failed reads are counted per loop; when an
//! accumulation window closes, loops at or over the limit have their reading
//! forced to zero, which the open-circuit check then latches.

use heapless::Vec;

use crate::config::{ThermocoupleType, MAX_LOOPS};
use crate::control::Loop;
use crate::state::ControlEvent;
use crate::traits::{SensorError, ThermocoupleBus};
use crate::Millis;

/// Poll tick (ms)
pub const SENSOR_POLL_MS: Millis = 200;

/// Round-robin reader over the configured loops
#[derive(Debug, Clone)]
pub struct SensorChannel {
    next: u8,
    num_loops: u8,
}

impl SensorChannel {
    pub fn new(num_loops: u8) -> Self {
        Self {
            next: 0,
            num_loops: num_loops.max(1),
        }
    }

    /// Channel the next poll will read
    pub fn next_channel(&self) -> u8 {
        self.next
    }

    /// Probe every loop's amplifier and mark it online or offline
    ///
    /// Returns an event for each loop with no amplifier.
    pub fn probe<B: ThermocoupleBus>(
        bus: &mut B,
        loops: &mut [Loop],
    ) -> Vec<ControlEvent, MAX_LOOPS> {
        let mut events = Vec::new();
        for lp in loops.iter_mut() {
            let online = bus.is_connected(lp.index());
            lp.set_sensor_online(online);
            if !online {
                let _ = events.push(ControlEvent::SensorOffline {
                    loop_index: lp.index(),
                });
            }
        }
        events
    }

    /// Push thermocouple type and filter to every online amplifier
    ///
    /// Returns the first error; remaining channels are still configured.
    pub fn configure<B: ThermocoupleBus>(
        bus: &mut B,
        loops: &[Loop],
        thermocouple: ThermocoupleType,
        filter_coefficient: u8,
    ) -> Result<(), SensorError> {
        let mut result = Ok(());
        for lp in loops.iter().filter(|lp| lp.sensor_online()) {
            let outcome = bus.configure(lp.index(), thermocouple, filter_coefficient);
            if result.is_ok() {
                result = outcome;
            }
        }
        result
    }

    /// Read one loop's temperature and apply its calibration offset
    ///
    /// Failures bump the loop's error counter and leave the last reading.
    pub fn read<B: ThermocoupleBus>(bus: &mut B, lp: &mut Loop) -> Result<f32, SensorError> {
        let channel = lp.index();
        if !bus.available(channel) {
            lp.record_read_failure();
            return Err(SensorError::NotReady);
        }

        match bus.read_temperature(channel) {
            Ok(raw) if raw.is_finite() => {
                let temperature = raw + lp.config().temp_offset;
                lp.record_reading(temperature);
                Ok(temperature)
            }
            Ok(_) => {
                lp.record_read_failure();
                Err(SensorError::OutOfRange)
            }
            Err(e) => {
                lp.record_read_failure();
                Err(e)
            }
        }
    }

    /// Read the next channel in turn
    ///
    /// Offline loops keep their slot but are not read; `None` is returned
    /// for them.
    pub fn poll_next<B: ThermocoupleBus>(
        &mut self,
        bus: &mut B,
        loops: &mut [Loop],
    ) -> Option<(u8, Result<f32, SensorError>)> {
        let index = self.next;
        self.next = (self.next + 1) % self.num_loops;

        let lp = loops.get_mut(index as usize)?;
        if !lp.sensor_online() {
            return None;
        }
        Some((index, Self::read(bus, lp)))
    }

    /// Close the failed-read accumulation window for every loop
    pub fn roll_over(loops: &mut [Loop], limit: u8) -> Vec<ControlEvent, MAX_LOOPS> {
        let mut events = Vec::new();
        for lp in loops.iter_mut() {
            if let Some(failures) = lp.roll_over_errors(limit) {
                let _ = events.push(ControlEvent::ReadingZeroed {
                    loop_index: lp.index(),
                    failures,
                });
            }
        }
        events
    }
}

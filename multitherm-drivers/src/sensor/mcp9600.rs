//! MCP9600 thermocouple amplifier bank
//!
//! One MCP9600 per loop on a shared I2C bus, strapped to consecutive
//! addresses starting at [`BASE_ADDRESS`]. Channel `n` talks to
//! `base + n`.
//!
//! # Registers used
//!
//! | pointer | register            | width |
//! |---------|---------------------|-------|
//! | `0x00`  | hot-junction temp   | 16    |
//! | `0x04`  | status              | 8     |
//! | `0x05`  | sensor config       | 8     |
//! | `0x20`  | device ID/revision  | 16    |
//!
//! The hot-junction register is a two's-complement word at 0.0625 °C/LSB.

use embedded_hal::i2c::I2c;
use multitherm_core::config::{ThermocoupleType, MAX_LOOPS};
use multitherm_core::traits::{SensorError, ThermocoupleBus};

/// Register pointers
pub mod reg {
    /// Hot-junction temperature
    pub const HOT_JUNCTION: u8 = 0x00;
    /// Status flags
    pub const STATUS: u8 = 0x04;
    /// Thermocouple type and filter coefficient
    pub const SENSOR_CONFIG: u8 = 0x05;
    /// Device ID (upper byte) and revision (lower byte)
    pub const DEVICE_ID: u8 = 0x20;
}

/// First amplifier address on the bus
pub const BASE_ADDRESS: u8 = 0x60;

/// Device ID of the MCP9600
pub const DEVICE_ID_MCP9600: u8 = 0x40;

/// Device ID of the MCP9601, register compatible
pub const DEVICE_ID_MCP9601: u8 = 0x41;

/// Status: a new hot-junction conversion is available
const STATUS_TH_UPDATE: u8 = 1 << 6;

/// Status: thermocouple input exceeds the ADC range
const STATUS_INPUT_RANGE: u8 = 1 << 4;

/// Hot-junction resolution (°C per LSB)
const DEGREES_PER_LSB: f32 = 0.0625;

/// Encode the sensor configuration register
pub fn sensor_config(thermocouple: ThermocoupleType, filter_coefficient: u8) -> u8 {
    (thermocouple.register_bits() << 4) | (filter_coefficient & 0b111)
}

/// Decode a hot-junction register word
pub fn decode_temperature(raw: [u8; 2]) -> f32 {
    i16::from_be_bytes(raw) as f32 * DEGREES_PER_LSB
}

/// MCP9600 amplifiers sharing one I2C bus
pub struct Mcp9600Bank<I2C> {
    i2c: I2C,
    base_address: u8,
    channels: u8,
}

impl<I2C: I2c> Mcp9600Bank<I2C> {
    /// Create a bank of `channels` amplifiers from [`BASE_ADDRESS`] up
    pub fn new(i2c: I2C, channels: u8) -> Self {
        Self::with_base_address(i2c, BASE_ADDRESS, channels)
    }

    /// Create a bank starting at a custom address
    pub fn with_base_address(i2c: I2C, base_address: u8, channels: u8) -> Self {
        Self {
            i2c,
            base_address,
            channels: channels.min(MAX_LOOPS as u8),
        }
    }

    /// Release the bus
    pub fn release(self) -> I2C {
        self.i2c
    }

    fn address(&self, channel: u8) -> Result<u8, SensorError> {
        if channel < self.channels {
            Ok(self.base_address + channel)
        } else {
            Err(SensorError::NoSuchChannel)
        }
    }

    fn read_register<const N: usize>(
        &mut self,
        channel: u8,
        register: u8,
    ) -> Result<[u8; N], SensorError> {
        let address = self.address(channel)?;
        let mut buffer = [0u8; N];
        self.i2c
            .write_read(address, &[register], &mut buffer)
            .map_err(|_| SensorError::Bus)?;
        Ok(buffer)
    }

    fn write_register(&mut self, channel: u8, register: u8, value: u8) -> Result<(), SensorError> {
        let address = self.address(channel)?;
        self.i2c
            .write(address, &[register, value])
            .map_err(|_| SensorError::Bus)
    }

    fn status(&mut self, channel: u8) -> Result<u8, SensorError> {
        let [status] = self.read_register::<1>(channel, reg::STATUS)?;
        Ok(status)
    }
}

impl<I2C: I2c> ThermocoupleBus for Mcp9600Bank<I2C> {
    fn is_connected(&mut self, channel: u8) -> bool {
        matches!(
            self.read_register::<2>(channel, reg::DEVICE_ID),
            Ok([DEVICE_ID_MCP9600 | DEVICE_ID_MCP9601, _])
        )
    }

    fn available(&mut self, channel: u8) -> bool {
        self.status(channel)
            .is_ok_and(|status| status & STATUS_TH_UPDATE != 0)
    }

    fn read_temperature(&mut self, channel: u8) -> Result<f32, SensorError> {
        let status = self.status(channel)?;
        if status & STATUS_INPUT_RANGE != 0 {
            return Err(SensorError::OutOfRange);
        }

        let raw = self.read_register::<2>(channel, reg::HOT_JUNCTION)?;

        // Clear the update flag so `available` waits for the next conversion
        self.write_register(channel, reg::STATUS, status & !STATUS_TH_UPDATE)?;

        Ok(decode_temperature(raw))
    }

    fn configure(
        &mut self,
        channel: u8,
        thermocouple: ThermocoupleType,
        filter_coefficient: u8,
    ) -> Result<(), SensorError> {
        let value = sensor_config(thermocouple, filter_coefficient);
        self.write_register(channel, reg::SENSOR_CONFIG, value)
    }
}

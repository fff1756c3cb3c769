//! Thermocouple acquisition

pub mod channel;

pub use channel::{SensorChannel, SENSOR_POLL_MS};

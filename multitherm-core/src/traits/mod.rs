//! Hardware abstraction traits
//!
//! These traits define the interface between the control engine
//! and hardware-specific implementations.

pub mod actuator;
pub mod sensor;
pub mod store;

pub use actuator::ActuatorBus;
pub use sensor::{SensorError, ThermocoupleBus};
pub use store::{ConfigStore, StoreError};

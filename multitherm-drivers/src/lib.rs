//! Hardware driver implementations
//!
//! This crate provides concrete implementations of the traits defined
//! in multitherm-core:
//!
//! - Thermocouple amplifiers (MCP9600 bank over I2C)
//! - Heater relays and the alert output (GPIO)

#![no_std]
#![deny(unsafe_code)]

pub mod output;
pub mod sensor;

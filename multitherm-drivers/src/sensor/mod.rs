//! Thermocouple amplifier implementations

pub mod mcp9600;

pub use mcp9600::Mcp9600Bank;

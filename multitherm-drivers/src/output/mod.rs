//! Relay output implementations

pub mod relay;

pub use relay::{RelayBank, RelayOutput};

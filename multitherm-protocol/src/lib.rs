//! Multitherm Remote Protocol
//!
//! This crate defines the line-oriented protocol spoken over the remote link
//! (UART or a serial bridge). The protocol is plain text so it can be driven
//! from a terminal as easily as from a host application.
//!
//! # Protocol Overview
//!
//! Every message is one `key:value` pair terminated by `\n`:
//! ```text
//! loop:2\n
//! kp:12.5\n
//! op:tune\n
//! ```
//!
//! Inbound lines become [`RemoteCommand`]s. Outbound, the controller pushes a
//! [`Telemetry`] block for the selected loop every status period.

#![no_std]
#![deny(unsafe_code)]

pub mod command;
pub mod line;
pub mod telemetry;

pub use command::{OperatorAction, ParseError, RemoteCommand, MAX_LABEL_LEN};
pub use line::{LineReader, MAX_LINE_LEN};
pub use telemetry::{StatusCode, Telemetry, TELEMETRY_CAPACITY};

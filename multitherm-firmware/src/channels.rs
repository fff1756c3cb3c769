//! Inter-task communication channels
//!
//! Defines the static channels used for communication between Embassy tasks.
//! Uses embassy-sync primitives for safe async communication.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use multitherm_core::config::{GlobalConfig, LoopConfig};
use multitherm_core::state::Intent;
use multitherm_protocol::Telemetry;

/// Channel capacity for operator intents
const INTENT_CHANNEL_SIZE: usize = 8;

/// Channel capacity for flash writes
const PERSIST_CHANNEL_SIZE: usize = 6;

/// Configuration to write to flash
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistCommand {
    Loop(u8, LoopConfig),
    Global(GlobalConfig),
}

/// Operator intents from the remote link
pub static INTENT_CHANNEL: Channel<CriticalSectionRawMutex, Intent, INTENT_CHANNEL_SIZE> =
    Channel::new();

/// Latest status push for the selected loop (updated by the control task)
pub static TELEMETRY: Signal<CriticalSectionRawMutex, Telemetry> = Signal::new();

/// Configuration writes (consumed by the storage task)
pub static PERSIST_CHANNEL: Channel<
    CriticalSectionRawMutex,
    PersistCommand,
    PERSIST_CHANNEL_SIZE,
> = Channel::new();

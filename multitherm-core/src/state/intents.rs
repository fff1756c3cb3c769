//! Operator intents from the display and the remote link
//!
//! Every intent except [`Intent::SelectLoop`] and the global options applies
//! to the currently selected loop.

use heapless::String;
use multitherm_protocol::{OperatorAction, RemoteCommand};

use crate::config::MAX_LABEL_LEN;

/// A discrete operator request
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Intent {
    // Display and remote
    SelectLoop(u8),
    SetSetpoint(f32),
    ToggleOutput,
    StartAutotune,
    CancelAutotune,
    SaveAutotune,

    // Global options
    SetFilterCoefficient(u8),
    SetKpTuning(f32),
    SetDeltaOut(f32),
    SetSpEnable(bool),
    SetAtEnable(bool),

    // Selected loop
    SetLabel(String<MAX_LABEL_LEN>),
    SetKp(f32),
    SetKi(f32),
    SetLowAlarm(f32),
    SetHighAlarm(f32),
}

/// Reasons an intent is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IntentError {
    /// Loop index beyond the configured loops
    InvalidLoop,
    /// Value outside its legal range
    OutOfRange,
    /// Setpoint changes are disabled
    SetpointLocked,
    /// Autotune is disabled
    AutotuneDisabled,
    /// Autotune needs an enabled, fault-free loop in automatic
    NotReady,
    /// Autotune could not start with the current output
    RelayStepTooSmall,
    /// Gains cannot change while an autotune session exists
    AutotuneActive,
    /// No autotune session to cancel
    NoSession,
    /// No autotune result to save
    NoResult,
}

impl From<OperatorAction> for Intent {
    fn from(action: OperatorAction) -> Self {
        match action {
            OperatorAction::ToggleOutput => Intent::ToggleOutput,
            OperatorAction::StartAutotune => Intent::StartAutotune,
            OperatorAction::CancelAutotune => Intent::CancelAutotune,
            OperatorAction::SaveAutotune => Intent::SaveAutotune,
        }
    }
}

impl From<RemoteCommand> for Intent {
    fn from(cmd: RemoteCommand) -> Self {
        match cmd {
            RemoteCommand::FilterCoefficient(v) => Intent::SetFilterCoefficient(v),
            RemoteCommand::KpTuning(v) => Intent::SetKpTuning(v),
            RemoteCommand::DeltaOut(v) => Intent::SetDeltaOut(v),
            RemoteCommand::SetpointEnable(v) => Intent::SetSpEnable(v),
            RemoteCommand::AutotuneEnable(v) => Intent::SetAtEnable(v),
            RemoteCommand::SelectLoop(v) => Intent::SelectLoop(v),
            RemoteCommand::Label(label) => Intent::SetLabel(label),
            RemoteCommand::Kp(v) => Intent::SetKp(v),
            RemoteCommand::Ki(v) => Intent::SetKi(v),
            RemoteCommand::LowAlarm(v) => Intent::SetLowAlarm(v),
            RemoteCommand::HighAlarm(v) => Intent::SetHighAlarm(v),
            RemoteCommand::Setpoint(v) => Intent::SetSetpoint(v),
            RemoteCommand::Operator(action) => action.into(),
        }
    }
}

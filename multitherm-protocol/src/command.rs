//! Inbound `key:value` commands.
//!
//! Keys are short lowercase tokens. Values are trimmed before parsing, and
//! numeric values must be finite. Range checks that depend on the running
//! configuration (loop count, setpoint limits) are left to the controller.

use heapless::String;

/// Maximum loop label length in bytes
pub const MAX_LABEL_LEN: usize = 16;

/// Highest accepted filter coefficient
const MAX_FILTER_COEFFICIENT: u8 = 7;

/// Errors that can occur while parsing a remote line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Line was empty or whitespace only
    Empty,
    /// No `:` between key and value
    MissingSeparator,
    /// Key is not part of the protocol
    UnknownKey,
    /// Value could not be parsed for this key
    InvalidValue,
    /// Line exceeded the receive buffer
    LineTooLong,
    /// Line was not valid UTF-8
    InvalidUtf8,
}

/// Operator actions carried by the `op` key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatorAction {
    /// Flip the selected loop's output enable
    ToggleOutput,
    /// Start a relay autotune on the selected loop
    StartAutotune,
    /// Abandon the autotune session and restore the previous gains
    CancelAutotune,
    /// Commit the gains found by autotune
    SaveAutotune,
}

impl OperatorAction {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "toggle" => Some(Self::ToggleOutput),
            "tune" => Some(Self::StartAutotune),
            "cancel" => Some(Self::CancelAutotune),
            "save" => Some(Self::SaveAutotune),
            _ => None,
        }
    }
}

/// A single decoded remote command
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RemoteCommand {
    /// `filt` - thermocouple amplifier filter coefficient (0-7)
    FilterCoefficient(u8),
    /// `kpt` - Kp step used by the display when editing gains
    KpTuning(f32),
    /// `dout` - relay amplitude fraction used by autotune
    DeltaOut(f32),
    /// `spen` - allow setpoint changes
    SetpointEnable(bool),
    /// `aten` - allow autotune
    AutotuneEnable(bool),
    /// `loop` - select the loop further commands apply to
    SelectLoop(u8),
    /// `label` - rename the selected loop
    Label(String<MAX_LABEL_LEN>),
    /// `kp` - proportional gain of the selected loop
    Kp(f32),
    /// `ki` - integral gain of the selected loop
    Ki(f32),
    /// `alo` - low alarm limit of the selected loop
    LowAlarm(f32),
    /// `ahi` - high alarm limit of the selected loop
    HighAlarm(f32),
    /// `setp` - setpoint of the selected loop
    Setpoint(f32),
    /// `op` - operator action on the selected loop
    Operator(OperatorAction),
}

impl RemoteCommand {
    /// Parse one line (without its terminator)
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::MissingSeparator)?;
        let value = value.trim();

        match key.trim() {
            "filt" => {
                let coefficient = parse_u8(value)?;
                if coefficient > MAX_FILTER_COEFFICIENT {
                    return Err(ParseError::InvalidValue);
                }
                Ok(Self::FilterCoefficient(coefficient))
            }
            "kpt" => parse_f32(value).map(Self::KpTuning),
            "dout" => parse_f32(value).map(Self::DeltaOut),
            "spen" => parse_flag(value).map(Self::SetpointEnable),
            "aten" => parse_flag(value).map(Self::AutotuneEnable),
            "loop" => parse_u8(value).map(Self::SelectLoop),
            "label" => {
                let mut label = String::new();
                label
                    .push_str(value)
                    .map_err(|_| ParseError::InvalidValue)?;
                Ok(Self::Label(label))
            }
            "kp" => parse_f32(value).map(Self::Kp),
            "ki" => parse_f32(value).map(Self::Ki),
            "alo" => parse_f32(value).map(Self::LowAlarm),
            "ahi" => parse_f32(value).map(Self::HighAlarm),
            "setp" => parse_f32(value).map(Self::Setpoint),
            "op" => OperatorAction::from_token(value)
                .map(Self::Operator)
                .ok_or(ParseError::InvalidValue),
            _ => Err(ParseError::UnknownKey),
        }
    }
}

fn parse_f32(value: &str) -> Result<f32, ParseError> {
    let parsed: f32 = value.parse().map_err(|_| ParseError::InvalidValue)?;
    if !parsed.is_finite() {
        return Err(ParseError::InvalidValue);
    }
    Ok(parsed)
}

fn parse_u8(value: &str) -> Result<u8, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue)
}

fn parse_flag(value: &str) -> Result<bool, ParseError> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(ParseError::InvalidValue),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gains() {
        assert_eq!(RemoteCommand::parse("kp:12.5"), Ok(RemoteCommand::Kp(12.5)));
        assert_eq!(RemoteCommand::parse("ki:0.8"), Ok(RemoteCommand::Ki(0.8)));
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!(
            RemoteCommand::parse("  ahi : 250 \r"),
            Ok(RemoteCommand::HighAlarm(250.0))
        );
    }

    #[test]
    fn test_parse_select_loop() {
        assert_eq!(RemoteCommand::parse("loop:3"), Ok(RemoteCommand::SelectLoop(3)));
        assert_eq!(
            RemoteCommand::parse("loop:-1"),
            Err(ParseError::InvalidValue)
        );
    }

    #[test]
    fn test_parse_filter_range() {
        assert_eq!(
            RemoteCommand::parse("filt:7"),
            Ok(RemoteCommand::FilterCoefficient(7))
        );
        assert_eq!(RemoteCommand::parse("filt:8"), Err(ParseError::InvalidValue));
    }

    #[test]
    fn test_parse_flags() {
        assert_eq!(
            RemoteCommand::parse("spen:1"),
            Ok(RemoteCommand::SetpointEnable(true))
        );
        assert_eq!(
            RemoteCommand::parse("aten:0"),
            Ok(RemoteCommand::AutotuneEnable(false))
        );
        assert_eq!(RemoteCommand::parse("aten:yes"), Err(ParseError::InvalidValue));
    }

    #[test]
    fn test_parse_label() {
        let cmd = RemoteCommand::parse("label:Zone A").unwrap();
        match cmd {
            RemoteCommand::Label(label) => assert_eq!(label.as_str(), "Zone A"),
            other => panic!("unexpected command {:?}", other),
        }

        assert_eq!(
            RemoteCommand::parse("label:this label is far too long"),
            Err(ParseError::InvalidValue)
        );
    }

    #[test]
    fn test_parse_operator_actions() {
        assert_eq!(
            RemoteCommand::parse("op:tune"),
            Ok(RemoteCommand::Operator(OperatorAction::StartAutotune))
        );
        assert_eq!(
            RemoteCommand::parse("op:save"),
            Ok(RemoteCommand::Operator(OperatorAction::SaveAutotune))
        );
        assert_eq!(RemoteCommand::parse("op:reboot"), Err(ParseError::InvalidValue));
    }

    #[test]
    fn test_parse_rejects_non_finite() {
        assert_eq!(RemoteCommand::parse("setp:inf"), Err(ParseError::InvalidValue));
        assert_eq!(RemoteCommand::parse("kp:NaN"), Err(ParseError::InvalidValue));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(RemoteCommand::parse("   "), Err(ParseError::Empty));
        assert_eq!(RemoteCommand::parse("kp 1.0"), Err(ParseError::MissingSeparator));
        assert_eq!(RemoteCommand::parse("kd:1.0"), Err(ParseError::UnknownKey));
        assert_eq!(RemoteCommand::parse("kp:"), Err(ParseError::InvalidValue));
    }
}

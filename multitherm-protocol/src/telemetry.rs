//! Outbound status block for the selected loop.

use core::fmt::Write;

use heapless::String;

/// Capacity of an encoded telemetry block
pub const TELEMETRY_CAPACITY: usize = 160;

/// Loop status as shown on the remote link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusCode {
    Off,
    Auto,
    Stabilizing,
    Autotune,
}

impl StatusCode {
    /// Wire token for this status
    pub const fn as_str(self) -> &'static str {
        match self {
            StatusCode::Off => "OFF",
            StatusCode::Auto => "AUTO",
            StatusCode::Stabilizing => "STAB",
            StatusCode::Autotune => "TUNE",
        }
    }
}

/// Periodic status push for one loop
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telemetry {
    /// Loop index the block describes
    pub loop_index: u8,
    pub setpoint: f32,
    pub measured: f32,
    /// Output duty in percent, `None` while the output is disabled
    pub output_percent: Option<f32>,
    pub kp: f32,
    pub ki: f32,
    pub status: StatusCode,
    /// Autotune half-cycle counter (0 when not tuning)
    pub autotune_cycle: u8,
}

impl Telemetry {
    /// Encode as `key:value\n` lines
    ///
    /// Fails only if the block does not fit in [`TELEMETRY_CAPACITY`],
    /// which requires absurdly large gain values.
    pub fn encode(&self) -> Result<String<TELEMETRY_CAPACITY>, core::fmt::Error> {
        let mut out = String::new();
        write!(out, "sp:{:.1}\npv:{:.1}\n", self.setpoint, self.measured)?;
        match self.output_percent {
            Some(percent) => write!(out, "out:{:.1}\n", percent)?,
            None => out.push_str("out:OFF\n").map_err(|_| core::fmt::Error)?,
        }
        write!(
            out,
            "kp:{:.2}\nki:{:.2}\nst:{}\ncyc:{}\n",
            self.kp,
            self.ki,
            self.status.as_str(),
            self.autotune_cycle
        )?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Telemetry {
        Telemetry {
            loop_index: 0,
            setpoint: 150.0,
            measured: 148.3,
            output_percent: Some(62.5),
            kp: 12.0,
            ki: 0.8,
            status: StatusCode::Auto,
            autotune_cycle: 0,
        }
    }

    #[test]
    fn test_encode_auto() {
        let encoded = sample().encode().unwrap();
        assert_eq!(
            encoded.as_str(),
            "sp:150.0\npv:148.3\nout:62.5\nkp:12.00\nki:0.80\nst:AUTO\ncyc:0\n"
        );
    }

    #[test]
    fn test_encode_output_off() {
        let telemetry = Telemetry {
            output_percent: None,
            status: StatusCode::Off,
            ..sample()
        };
        let encoded = telemetry.encode().unwrap();
        assert!(encoded.contains("out:OFF\n"));
        assert!(encoded.ends_with("st:OFF\ncyc:0\n"));
    }

    #[test]
    fn test_encode_autotune_cycle() {
        let telemetry = Telemetry {
            status: StatusCode::Autotune,
            autotune_cycle: 3,
            ..sample()
        };
        let encoded = telemetry.encode().unwrap();
        assert!(encoded.ends_with("st:TUNE\ncyc:3\n"));
    }

    #[test]
    fn test_status_tokens() {
        assert_eq!(StatusCode::Stabilizing.as_str(), "STAB");
        assert_eq!(StatusCode::Autotune.as_str(), "TUNE");
    }

    #[test]
    fn test_encode_overflow_is_error() {
        let telemetry = Telemetry {
            kp: 1.0e30,
            ki: 1.0e30,
            setpoint: 1.0e30,
            measured: 1.0e30,
            ..sample()
        };
        assert!(telemetry.encode().is_err());
    }
}

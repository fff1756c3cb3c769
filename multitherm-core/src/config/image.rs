//! Persisted configuration image
//!
//! The global configuration and every loop's configuration are stored
//! together as one record, validated by a magic number, a format version and
//! a CRC32 over the field contents.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::types::{GlobalConfig, LoopConfig, MAX_LOOPS};

/// Magic number to identify a valid configuration image
pub const IMAGE_MAGIC: u32 = 0x4D54_4346; // "MTCF"

/// Current image format version
pub const IMAGE_VERSION: u8 = 1;

/// Upper bound of a serialized image
pub const MAX_IMAGE_SIZE: usize = 512;

/// Errors validating or (de)serializing an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Magic number did not match
    InvalidMagic,
    /// Image was written by an incompatible firmware
    VersionMismatch,
    /// Contents do not match the stored CRC
    CrcMismatch,
    /// postcard could not encode the image
    Serialize,
    /// postcard could not decode the image
    Deserialize,
}

/// Complete configuration record stored in flash
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConfigImage {
    /// Magic number for validation
    pub magic: u32,
    /// Data format version
    pub version: u8,
    /// Controller-wide settings
    pub global: GlobalConfig,
    /// Per-loop settings, including slots beyond `num_loops`
    pub loops: [LoopConfig; MAX_LOOPS],
    /// CRC32 checksum (calculated over magic..loops)
    pub crc: u32,
}

impl Default for ConfigImage {
    fn default() -> Self {
        Self::new(GlobalConfig::default(), core::array::from_fn(|_| LoopConfig::default()))
    }
}

impl ConfigImage {
    /// Build an image with a valid CRC
    pub fn new(global: GlobalConfig, loops: [LoopConfig; MAX_LOOPS]) -> Self {
        let mut image = Self {
            magic: IMAGE_MAGIC,
            version: IMAGE_VERSION,
            global,
            loops,
            crc: 0,
        };
        image.update_crc();
        image
    }

    /// Check magic, version and CRC
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.magic != IMAGE_MAGIC {
            return Err(ConfigError::InvalidMagic);
        }
        if self.version != IMAGE_VERSION {
            return Err(ConfigError::VersionMismatch);
        }
        if !self.verify_crc() {
            return Err(ConfigError::CrcMismatch);
        }
        Ok(())
    }

    /// Repair every value into its legal range
    pub fn sanitize(&mut self) {
        self.global.sanitize();
        for config in &mut self.loops {
            config.sanitize(&self.global);
        }
    }

    /// Calculate CRC32 for the image (excluding the crc field itself)
    pub fn calculate_crc(&self) -> u32 {
        let mut crc: u32 = 0xFFFFFFFF;

        crc = crc32_update(crc, &self.magic.to_le_bytes());
        crc = crc32_update(crc, &[self.version]);

        let g = &self.global;
        crc = crc32_update(crc, &[g.num_loops]);
        crc = crc32_update(crc, &g.setpoint_min.to_le_bytes());
        crc = crc32_update(crc, &g.setpoint_max.to_le_bytes());
        crc = crc32_update(crc, &g.window_size_ms.to_le_bytes());
        crc = crc32_update(crc, &g.timeout_s.to_le_bytes());
        crc = crc32_update(crc, &[g.consecutive_error_limit]);
        crc = crc32_update(crc, &[g.thermocouple.register_bits()]);
        crc = crc32_update(crc, &[g.filter_coefficient]);
        crc = crc32_update(crc, &g.kp_tuning.to_le_bytes());
        crc = crc32_update(crc, &g.delta_out.to_le_bytes());
        crc = crc32_update(crc, &[g.sp_change_enabled as u8, g.autotune_enabled as u8]);

        for config in &self.loops {
            crc = crc32_update(crc, &[config.label.len() as u8]);
            crc = crc32_update(crc, config.label.as_bytes());
            crc = crc32_update(crc, &config.setpoint.to_le_bytes());
            crc = crc32_update(crc, &config.kp.to_le_bytes());
            crc = crc32_update(crc, &config.ki.to_le_bytes());
            crc = crc32_update(crc, &config.low_alarm.to_le_bytes());
            crc = crc32_update(crc, &config.high_alarm.to_le_bytes());
            crc = crc32_update(crc, &config.temp_offset.to_le_bytes());
        }

        !crc
    }

    /// Update the CRC field
    pub fn update_crc(&mut self) {
        self.crc = self.calculate_crc();
    }

    /// Verify the CRC is correct
    pub fn verify_crc(&self) -> bool {
        self.crc == self.calculate_crc()
    }

    /// Serialize into `buffer`, returning the used prefix
    #[cfg(feature = "serde")]
    pub fn to_bytes<'a>(&self, buffer: &'a mut [u8]) -> Result<&'a mut [u8], ConfigError> {
        postcard::to_slice(self, buffer).map_err(|_| ConfigError::Serialize)
    }

    /// Deserialize and validate an image
    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let image: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Deserialize)?;
        image.validate()?;
        Ok(image)
    }
}

/// Simple CRC32 update function (IEEE 802.3 polynomial)
fn crc32_update(crc: u32, data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB88320;
    let mut crc = crc;

    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

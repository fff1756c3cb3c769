//! Configuration types
//!
//! Deployment configuration stored as one postcard image in flash.

pub mod image;
#[cfg(feature = "serde")]
pub mod persistence;
pub mod types;

pub use image::{ConfigError, ConfigImage, IMAGE_MAGIC, IMAGE_VERSION, MAX_IMAGE_SIZE};
#[cfg(feature = "serde")]
pub use persistence::{ConfigPersistence, LoadOutcome, PersistError};
pub use types::*;

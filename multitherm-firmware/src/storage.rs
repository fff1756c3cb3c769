//! Flash-backed configuration store
//!
//! Uses sequential-storage for wear-leveled key-value storage in the last
//! 64KB of flash. The configuration image lives under a single key.

use embassy_rp::dma::Channel;
use embassy_rp::flash::{Async, Flash};
use embassy_rp::peripherals::FLASH;
use embassy_rp::Peri;
use sequential_storage::cache::NoCache;
use sequential_storage::map;

use multitherm_core::traits::{ConfigStore, StoreError};

/// Flash storage configuration
pub const FLASH_SIZE: usize = 2 * 1024 * 1024; // 2MB flash
pub const CONFIG_PARTITION_SIZE: usize = 64 * 1024; // 64KB for config
pub const CONFIG_PARTITION_START: usize = FLASH_SIZE - CONFIG_PARTITION_SIZE;

/// Flash range for the config partition
pub const CONFIG_RANGE: core::ops::Range<u32> =
    (CONFIG_PARTITION_START as u32)..(FLASH_SIZE as u32);

/// Map key of the configuration image
const IMAGE_KEY: u8 = 1;

/// Scratch buffer for sequential-storage (key, length header and image)
const DATA_BUFFER_SIZE: usize = 1024;

fn map_error<E>(error: sequential_storage::Error<E>) -> StoreError {
    match error {
        sequential_storage::Error::FullStorage => StoreError::Full,
        sequential_storage::Error::Corrupted { .. } => StoreError::Corrupted,
        sequential_storage::Error::BufferTooSmall(_) => StoreError::BufferTooSmall,
        _ => StoreError::Flash,
    }
}

/// RP2040 flash configuration store
pub struct FlashStore<'d> {
    flash: Flash<'d, FLASH, Async, FLASH_SIZE>,
}

impl<'d> FlashStore<'d> {
    pub fn new(flash: Peri<'d, FLASH>, dma: Peri<'d, impl Channel>) -> Self {
        Self {
            flash: Flash::new(flash, dma),
        }
    }
}

impl ConfigStore for FlashStore<'_> {
    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, StoreError> {
        let mut data_buffer = [0u8; DATA_BUFFER_SIZE];

        let item = map::fetch_item::<u8, &[u8], _>(
            &mut self.flash,
            CONFIG_RANGE,
            &mut NoCache::new(),
            &mut data_buffer,
            &IMAGE_KEY,
        )
        .await
        .map_err(map_error)?;

        let data = item.ok_or(StoreError::NotFound)?;
        let len = data.len();
        if buffer.len() < len {
            return Err(StoreError::BufferTooSmall);
        }
        buffer[..len].copy_from_slice(data);
        Ok(len)
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), StoreError> {
        let mut data_buffer = [0u8; DATA_BUFFER_SIZE];

        map::store_item(
            &mut self.flash,
            CONFIG_RANGE,
            &mut NoCache::new(),
            &mut data_buffer,
            &IMAGE_KEY,
            &data,
        )
        .await
        .map_err(map_error)
    }
}

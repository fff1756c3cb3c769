//! Persistent configuration storage trait

use core::future::Future;

/// Errors from configuration storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Flash operation failed
    Flash,
    /// Nothing stored yet
    NotFound,
    /// Buffer too small for the data
    BufferTooSmall,
    /// Stored data is unreadable
    Corrupted,
    /// Storage is full
    Full,
}

/// Storage for the single configuration image
///
/// Implementations handle wear leveling and erase scheduling; the image
/// itself carries its own CRC.
pub trait ConfigStore {
    /// Read the stored image into `buffer`
    ///
    /// Returns the number of bytes read.
    fn read(&mut self, buffer: &mut [u8]) -> impl Future<Output = Result<usize, StoreError>>;

    /// Replace the stored image
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<(), StoreError>>;
}

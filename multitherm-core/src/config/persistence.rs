//! Configuration persistence
//!
//! Keeps the last good [`ConfigImage`] in memory and reads or writes it
//! through a [`ConfigStore`]. Loading never fails outright: missing or
//! corrupt data is replaced by defaults and the reason is reported.

use super::image::{ConfigError, ConfigImage, MAX_IMAGE_SIZE};
use super::types::{GlobalConfig, LoopConfig, MAX_LOOPS};
use crate::traits::{ConfigStore, StoreError};

/// Configuration persistence errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistError {
    /// Storage operation failed
    Store(StoreError),
    /// Stored image failed validation
    Config(ConfigError),
    /// Loop index beyond the image
    InvalidLoop,
}

impl From<StoreError> for PersistError {
    fn from(e: StoreError) -> Self {
        PersistError::Store(e)
    }
}

impl From<ConfigError> for PersistError {
    fn from(e: ConfigError) -> Self {
        PersistError::Config(e)
    }
}

/// Result of [`ConfigPersistence::load_or_default`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadOutcome {
    /// Stored image was valid
    Loaded,
    /// Defaults are in use for the given reason
    Defaulted(PersistError),
}

/// Configuration persistence manager
pub struct ConfigPersistence<S> {
    store: S,
    image: ConfigImage,
}

impl<S: ConfigStore> ConfigPersistence<S> {
    /// Create a manager holding the default image
    pub fn new(store: S) -> Self {
        Self {
            store,
            image: ConfigImage::default(),
        }
    }

    /// Consume the manager and return the underlying store
    pub fn into_store(self) -> S {
        self.store
    }

    /// Current in-memory image
    pub fn image(&self) -> &ConfigImage {
        &self.image
    }

    /// Load and validate the stored image
    ///
    /// On success the loaded values are sanitized and cached. On failure the
    /// cache is left untouched.
    pub async fn load(&mut self) -> Result<&ConfigImage, PersistError> {
        let mut buffer = [0u8; MAX_IMAGE_SIZE];
        let len = self.store.read(&mut buffer).await?;

        let mut image = ConfigImage::from_bytes(&buffer[..len])?;
        image.sanitize();
        image.update_crc();
        self.image = image;
        Ok(&self.image)
    }

    /// Load the stored image, falling back to defaults
    pub async fn load_or_default(&mut self) -> LoadOutcome {
        let result = self.load().await.map(|_| ());
        match result {
            Ok(()) => LoadOutcome::Loaded,
            Err(e) => {
                self.image = ConfigImage::default();
                LoadOutcome::Defaulted(e)
            }
        }
    }

    /// Global configuration from the cached image
    pub fn load_global_config(&self) -> GlobalConfig {
        self.image.global.clone()
    }

    /// Loop configuration from the cached image
    pub fn load_loop_config(&self, index: usize) -> Option<LoopConfig> {
        self.image.loops.get(index).cloned()
    }

    /// Replace one loop's configuration and write the image
    pub async fn save_loop_config(
        &mut self,
        index: usize,
        config: LoopConfig,
    ) -> Result<(), PersistError> {
        if index >= MAX_LOOPS {
            return Err(PersistError::InvalidLoop);
        }
        self.image.loops[index] = config;
        self.write_image().await
    }

    /// Replace the global configuration and write the image
    pub async fn save_global_config(&mut self, config: GlobalConfig) -> Result<(), PersistError> {
        self.image.global = config;
        self.write_image().await
    }

    async fn write_image(&mut self) -> Result<(), PersistError> {
        self.image.update_crc();

        let mut buffer = [0u8; MAX_IMAGE_SIZE];
        let bytes = self.image.to_bytes(&mut buffer)?;
        self.store.write(bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use heapless::Vec;

    /// In-memory store
    struct MockStore {
        data: Option<Vec<u8, MAX_IMAGE_SIZE>>,
        writes: u8,
        fail_writes: bool,
    }

    impl MockStore {
        fn empty() -> Self {
            Self {
                data: None,
                writes: 0,
                fail_writes: false,
            }
        }

        fn with_bytes(bytes: &[u8]) -> Self {
            let mut data = Vec::new();
            data.extend_from_slice(bytes).unwrap();
            Self {
                data: Some(data),
                writes: 0,
                fail_writes: false,
            }
        }
    }

    impl ConfigStore for MockStore {
        async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, StoreError> {
            let data = self.data.as_ref().ok_or(StoreError::NotFound)?;
            if buffer.len() < data.len() {
                return Err(StoreError::BufferTooSmall);
            }
            buffer[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }

        async fn write(&mut self, data: &[u8]) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Flash);
            }
            let mut stored = Vec::new();
            stored
                .extend_from_slice(data)
                .map_err(|_| StoreError::Full)?;
            self.data = Some(stored);
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_empty_store_defaults() {
        let mut persistence = ConfigPersistence::new(MockStore::empty());
        let outcome = block_on(persistence.load_or_default());

        assert_eq!(
            outcome,
            LoadOutcome::Defaulted(PersistError::Store(StoreError::NotFound))
        );
        assert_eq!(persistence.load_global_config(), GlobalConfig::default());
    }

    #[test]
    fn test_corrupt_store_defaults() {
        let mut persistence = ConfigPersistence::new(MockStore::with_bytes(&[1, 2, 3, 4, 5]));
        let outcome = block_on(persistence.load_or_default());

        assert!(matches!(
            outcome,
            LoadOutcome::Defaulted(PersistError::Config(_))
        ));
        assert_eq!(persistence.image(), &ConfigImage::default());
    }

    #[test]
    fn test_save_then_reload() {
        let mut persistence = ConfigPersistence::new(MockStore::empty());

        let mut config = LoopConfig::default();
        config.setpoint = 220.0;
        config.kp = 15.5;
        block_on(persistence.save_loop_config(3, config.clone())).unwrap();

        let mut global = GlobalConfig::default();
        global.num_loops = 4;
        block_on(persistence.save_global_config(global)).unwrap();

        let store = persistence.into_store();
        assert_eq!(store.writes, 2);

        let mut reloaded = ConfigPersistence::new(store);
        assert_eq!(block_on(reloaded.load_or_default()), LoadOutcome::Loaded);
        assert_eq!(reloaded.load_loop_config(3), Some(config));
        assert_eq!(reloaded.load_global_config().num_loops, 4);
    }

    #[test]
    fn test_load_sanitizes() {
        let mut image = ConfigImage::default();
        image.global.num_loops = 12;
        image.loops[0].setpoint = 5000.0;
        image.update_crc();

        let mut buffer = [0u8; MAX_IMAGE_SIZE];
        let bytes = image.to_bytes(&mut buffer).unwrap();
        let mut persistence = ConfigPersistence::new(MockStore::with_bytes(bytes));

        let loaded = block_on(persistence.load()).unwrap();
        assert_eq!(loaded.global.num_loops, 5);
        assert_eq!(loaded.loops[0].setpoint, 400.0);
        assert!(loaded.verify_crc());
    }

    #[test]
    fn test_save_invalid_loop() {
        let mut persistence = ConfigPersistence::new(MockStore::empty());
        let result = block_on(persistence.save_loop_config(MAX_LOOPS, LoopConfig::default()));
        assert_eq!(result, Err(PersistError::InvalidLoop));
    }

    #[test]
    fn test_write_failure_reported() {
        let mut store = MockStore::empty();
        store.fail_writes = true;
        let mut persistence = ConfigPersistence::new(store);

        let result = block_on(persistence.save_global_config(GlobalConfig::default()));
        assert_eq!(result, Err(PersistError::Store(StoreError::Flash)));
    }

    #[test]
    fn test_load_loop_out_of_range() {
        let persistence = ConfigPersistence::new(MockStore::empty());
        assert!(persistence.load_loop_config(MAX_LOOPS).is_none());
    }
}

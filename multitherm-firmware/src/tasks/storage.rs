//! Configuration persistence task
//!
//! Owns the flash store and writes configuration changes in the background
//! so flash erase and program times never delay the control pass.

use defmt::*;

use multitherm_core::config::ConfigPersistence;

use crate::channels::{PersistCommand, PERSIST_CHANNEL};
use crate::storage::FlashStore;

/// Storage task - handles flash writes requested by the control task
#[embassy_executor::task]
pub async fn storage_task(mut persistence: ConfigPersistence<FlashStore<'static>>) {
    info!("Storage task started");

    loop {
        let command = PERSIST_CHANNEL.receive().await;

        let result = match command {
            PersistCommand::Loop(index, config) => {
                debug!("Saving loop {} configuration", index);
                persistence.save_loop_config(index as usize, config).await
            }
            PersistCommand::Global(config) => {
                debug!("Saving global configuration");
                persistence.save_global_config(config).await
            }
        };

        match result {
            Ok(()) => info!("Configuration saved"),
            Err(e) => error!("Failed to save configuration: {:?}", e),
        }
    }
}

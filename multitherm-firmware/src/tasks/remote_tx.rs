//! Remote link transmit task
//!
//! Sends the periodic status push for the selected loop.

use defmt::*;
use embassy_rp::uart::BufferedUartTx;
use embedded_io_async::Write;

use crate::channels::TELEMETRY;

/// Remote TX task - encodes and writes telemetry
#[embassy_executor::task]
pub async fn remote_tx_task(mut tx: BufferedUartTx) {
    info!("Remote TX task started");

    loop {
        let telemetry = TELEMETRY.wait().await;

        let text = match telemetry.encode() {
            Ok(text) => text,
            Err(_) => {
                warn!("Telemetry for loop {} did not fit", telemetry.loop_index);
                continue;
            }
        };

        if let Err(e) = tx.write_all(text.as_bytes()).await {
            warn!("Failed to send telemetry: {:?}", e);
        } else {
            trace!("Telemetry sent for loop {}", telemetry.loop_index);
        }
    }
}

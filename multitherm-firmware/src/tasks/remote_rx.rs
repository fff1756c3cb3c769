//! Remote link receive task
//!
//! Reads `key:value` lines from the UART and forwards them as intents.

use defmt::*;
use embassy_rp::uart::BufferedUartRx;
use embedded_io_async::Read;

use multitherm_core::state::Intent;
use multitherm_protocol::LineReader;

use crate::channels::INTENT_CHANNEL;

/// Buffer size for UART receive
const RX_BUF_SIZE: usize = 64;

/// Remote RX task - parses command lines into intents
#[embassy_executor::task]
pub async fn remote_rx_task(mut rx: BufferedUartRx) {
    info!("Remote RX task started");

    let mut reader = LineReader::new();
    let mut buf = [0u8; RX_BUF_SIZE];

    loop {
        match rx.read(&mut buf).await {
            Ok(n) if n > 0 => {
                trace!("RX: {} bytes", n);

                for &byte in &buf[..n] {
                    match reader.feed(byte) {
                        Ok(Some(command)) => {
                            let intent = Intent::from(command);
                            // Drop rather than stall the link when the control task lags
                            if INTENT_CHANNEL.try_send(intent).is_err() {
                                warn!("Intent channel full, dropping command");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!("Remote line rejected: {:?}", e);
                        }
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("UART read error: {:?}", e);
            }
        }
    }
}

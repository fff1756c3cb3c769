//! Multitherm - Multi-Loop Thermocouple Controller Firmware
//!
//! Main firmware binary for RP2040-based heater controllers. Up to five
//! MCP9600 thermocouple amplifiers share one I2C bus; each loop drives a
//! solid-state relay with a time-proportioned PI output.
//!
//! Board wiring:
//! - I2C0: SDA=GPIO4, SCL=GPIO5 (amplifiers at 0x60..0x64)
//! - Heater relays: GPIO10..GPIO14, alert output: GPIO15
//! - UART0 remote link: TX=GPIO0, RX=GPIO1, 115200 8N1

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::i2c::{self, I2c};
use embassy_rp::peripherals::UART0;
use embassy_rp::uart::{BufferedInterruptHandler, BufferedUart, Config as UartConfig};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use multitherm_core::config::{ConfigPersistence, LoadOutcome};
use multitherm_core::scheduler::LoopScheduler;
use multitherm_drivers::output::{RelayBank, RelayOutput};
use multitherm_drivers::sensor::Mcp9600Bank;

use crate::storage::FlashStore;

mod channels;
mod storage;
mod tasks;

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

/// I2C bus speed for the amplifiers
const I2C_FREQUENCY_HZ: u32 = 100_000;

// Static cells for UART buffers (must live forever)
static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Multitherm firmware starting...");

    // Initialize RP2040 peripherals
    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    // Load configuration from flash (or use defaults)
    let mut persistence = ConfigPersistence::new(FlashStore::new(p.FLASH, p.DMA_CH0));
    match persistence.load_or_default().await {
        LoadOutcome::Loaded => info!("Loaded configuration from flash"),
        LoadOutcome::Defaulted(e) => {
            info!("No valid configuration in flash ({:?}), using defaults", e);
        }
    }
    let image = persistence.image().clone();
    info!(
        "{} loops, window {}ms, runaway timeout {}s",
        image.global.num_loops, image.global.window_size_ms, image.global.timeout_s
    );

    // Thermocouple amplifiers
    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = I2C_FREQUENCY_HZ;
    let i2c = I2c::new_blocking(p.I2C0, p.PIN_5, p.PIN_4, i2c_config);
    let sensors = Mcp9600Bank::new(i2c, image.global.num_loops);
    info!("I2C initialized for thermocouple amplifiers");

    // Heater relays and alert output, all off at boot
    let heater_pins = [
        Output::new(p.PIN_10, Level::Low),
        Output::new(p.PIN_11, Level::Low),
        Output::new(p.PIN_12, Level::Low),
        Output::new(p.PIN_13, Level::Low),
        Output::new(p.PIN_14, Level::Low),
    ];
    let alert = RelayOutput::new_active_high(Output::new(p.PIN_15, Level::Low));
    let relays = RelayBank::new(
        heater_pins.into_iter().map(RelayOutput::new_active_high),
        alert,
    );
    info!("Relay outputs initialized");

    let now = tasks::control::now_ms();
    let mut scheduler = LoopScheduler::from_image(&image, sensors, relays, now);
    for event in scheduler.probe_sensors().iter() {
        tasks::log_event(event);
    }

    // Setup UART for the remote link
    let uart_config = UartConfig::default(); // 115200 baud default

    let tx_buf = TX_BUF.init([0u8; 256]);
    let rx_buf = RX_BUF.init([0u8; 256]);

    let uart = BufferedUart::new(p.UART0, p.PIN_0, p.PIN_1, Irqs, tx_buf, rx_buf, uart_config);
    let (tx, rx) = uart.split();

    info!("UART initialized for remote link");

    // Spawn tasks
    spawner.spawn(tasks::storage_task(persistence)).unwrap();
    spawner.spawn(tasks::remote_rx_task(rx)).unwrap();
    spawner.spawn(tasks::remote_tx_task(tx)).unwrap();
    spawner.spawn(tasks::control_task(scheduler)).unwrap();

    info!("All tasks spawned, firmware running");

    // Main task has nothing else to do - all work happens in spawned tasks
    loop {
        embassy_time::Timer::after_secs(60).await;
        trace!("Main loop heartbeat");
    }
}

//! Control task
//!
//! Sole owner of the loop scheduler. Runs a pass whenever the next cadence
//! or relay edge falls due, and applies operator intents between passes.

use defmt::*;
use embassy_futures::select::{select, Either};
use embassy_rp::gpio::Output;
use embassy_rp::i2c::{Blocking, I2c};
use embassy_rp::peripherals::I2C0;
use embassy_time::{Instant, Timer};

use multitherm_core::scheduler::{LoopScheduler, PassReport};
use multitherm_core::state::{ControlEvent, PersistRequest};
use multitherm_core::Millis;
use multitherm_drivers::output::RelayBank;
use multitherm_drivers::sensor::Mcp9600Bank;

use crate::channels::{PersistCommand, INTENT_CHANNEL, PERSIST_CHANNEL, TELEMETRY};

pub type Sensors = Mcp9600Bank<I2c<'static, I2C0, Blocking>>;
pub type Relays = RelayBank<Output<'static>>;
pub type Scheduler = LoopScheduler<Sensors, Relays>;

/// Milliseconds since boot
pub fn now_ms() -> Millis {
    Instant::now().as_millis()
}

/// Control task - runs the scheduler and applies intents
#[embassy_executor::task]
pub async fn control_task(mut scheduler: Scheduler) {
    info!("Control task started");

    loop {
        let now = now_ms();
        let report = scheduler.run_pass(now);
        publish(&mut scheduler, report);

        let deadline = scheduler.next_deadline(now_ms());
        match select(
            Timer::at(Instant::from_millis(deadline)),
            INTENT_CHANNEL.receive(),
        )
        .await
        {
            Either::First(()) => {}
            Either::Second(intent) => {
                debug!("Intent: {:?}", intent);
                if let Err(e) = scheduler.handle_intent(intent) {
                    warn!("Intent rejected: {:?}", e);
                }
            }
        }
    }
}

/// Hand the results of a pass to the other tasks
fn publish(scheduler: &mut Scheduler, report: PassReport) {
    if let Some(telemetry) = report.telemetry {
        TELEMETRY.signal(telemetry);
    }

    for event in report.events.iter() {
        log_event(event);
    }

    for request in report.persist {
        let command = match request {
            PersistRequest::Loop(index) => {
                let Some(lp) = scheduler.loops().get(index as usize) else {
                    continue;
                };
                PersistCommand::Loop(index, lp.config().clone())
            }
            PersistRequest::Global => PersistCommand::Global(scheduler.global().clone()),
        };

        if PERSIST_CHANNEL.try_send(command).is_err() {
            warn!("Persist channel full, retrying {:?} next pass", request);
            scheduler.requeue_persist(request);
        }
    }
}

/// Log a control event at a level matching its severity
pub fn log_event(event: &ControlEvent) {
    match event {
        ControlEvent::SensorOffline { loop_index } => {
            warn!("Loop {}: no thermocouple amplifier", loop_index);
        }
        ControlEvent::ReadingZeroed {
            loop_index,
            failures,
        } => {
            warn!(
                "Loop {}: {} failed reads, reading forced to zero",
                loop_index, failures
            );
        }
        ControlEvent::FaultLatched { loop_index, error } => {
            error!("Loop {}: fault {:?}, heater off", loop_index, error);
        }
        ControlEvent::OutputChanged {
            loop_index,
            enabled,
        } => {
            info!("Loop {}: output enabled={}", loop_index, enabled);
        }
        ControlEvent::AutotuneStarted { loop_index } => {
            info!("Loop {}: autotune started", loop_index);
        }
        ControlEvent::AutotuneComplete { loop_index, result } => {
            info!(
                "Loop {}: autotune complete, Ku={} Pu={}s Kp={} Ki={}",
                loop_index, result.ku, result.pu_s, result.gains.kp, result.gains.ki
            );
        }
        ControlEvent::AutotuneFailed { loop_index, reason } => {
            warn!("Loop {}: autotune failed: {:?}", loop_index, reason);
        }
        ControlEvent::AutotuneCancelled { loop_index } => {
            info!("Loop {}: autotune cancelled", loop_index);
        }
        ControlEvent::AutotuneSaved { loop_index, gains } => {
            info!(
                "Loop {}: saved gains Kp={} Ki={}",
                loop_index, gains.kp, gains.ki
            );
        }
    }
}

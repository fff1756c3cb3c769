//! Per-loop runtime state
//!
//! A [`Loop`] bundles one channel's configuration, latest reading, output
//! command, fault latches and, while tuning, its autotune session. Exactly
//! one writer owns the output command at a time:
//!
//! | status        | output command                      |
//! |---------------|-------------------------------------|
//! | `Off`         | held at 0                           |
//! | `Auto`        | PI controller                       |
//! | `Autotune`    | autotune relay                      |
//! | `Stabilizing` | held at the autotune baseline       |

use heapless::String;
use multitherm_protocol::{StatusCode, Telemetry};

use super::autotune::{AutotuneError, AutotuneSession, AutotuneState};
use super::pid::{ControlMode, Gains, PiController, RelayWindow};
use crate::config::{GlobalConfig, LoopConfig, MAX_LABEL_LEN};
use crate::safety::{
    check_open_circuit, evaluate, AlarmLimits, AlarmStatus, LoopError, RunawayDetector,
};
use crate::state::{ControlEvent, IntentError};
use crate::Millis;

/// Operating status of a loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopStatus {
    /// Output disabled
    Off,
    /// PI control
    Auto,
    /// Autotune finished, waiting for save or cancel
    Stabilizing,
    /// Autotune relay running
    Autotune,
}

impl LoopStatus {
    pub fn code(self) -> StatusCode {
        match self {
            LoopStatus::Off => StatusCode::Off,
            LoopStatus::Auto => StatusCode::Auto,
            LoopStatus::Stabilizing => StatusCode::Stabilizing,
            LoopStatus::Autotune => StatusCode::Autotune,
        }
    }
}

/// One control loop
#[derive(Debug, Clone)]
pub struct Loop {
    index: u8,
    config: LoopConfig,
    measured: f32,
    /// On-time command in ms, within `[0, window]`
    output: f32,
    output_enabled: bool,
    sensor_online: bool,
    alarm: AlarmStatus,
    error: LoopError,
    error_count: u8,
    status: LoopStatus,
    controller: PiController,
    window: RelayWindow,
    runaway: RunawayDetector,
    autotune: Option<AutotuneSession>,
    relay_on: bool,
}

impl Loop {
    /// Create a loop with its output disabled
    pub fn new(index: u8, config: LoopConfig, window_size_ms: u32, now: Millis) -> Self {
        Self {
            index,
            config,
            measured: 0.0,
            output: 0.0,
            output_enabled: false,
            sensor_online: false,
            alarm: AlarmStatus::None,
            error: LoopError::Ok,
            error_count: 0,
            status: LoopStatus::Off,
            controller: PiController::new(window_size_ms as f32),
            window: RelayWindow::new(window_size_ms, now),
            runaway: RunawayDetector::new(),
            autotune: None,
            relay_on: false,
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    pub fn setpoint(&self) -> f32 {
        self.config.setpoint
    }

    /// Last accepted temperature (°C)
    pub fn measured(&self) -> f32 {
        self.measured
    }

    /// Output command (ms of on-time per window)
    pub fn output(&self) -> f32 {
        self.output
    }

    /// Output command as a percentage of the window
    pub fn output_percent(&self, window: f32) -> f32 {
        if window > 0.0 {
            self.output / window * 100.0
        } else {
            0.0
        }
    }

    pub fn gains(&self) -> Gains {
        Gains::new(self.config.kp, self.config.ki)
    }

    pub fn alarm_limits(&self) -> AlarmLimits {
        AlarmLimits {
            low: self.config.low_alarm,
            high: self.config.high_alarm,
        }
    }

    pub fn output_enabled(&self) -> bool {
        self.output_enabled
    }

    pub fn sensor_online(&self) -> bool {
        self.sensor_online
    }

    pub fn alarm(&self) -> AlarmStatus {
        self.alarm
    }

    pub fn error(&self) -> LoopError {
        self.error
    }

    /// Failed reads in the current accumulation window
    pub fn error_count(&self) -> u8 {
        self.error_count
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    pub fn autotune(&self) -> Option<&AutotuneSession> {
        self.autotune.as_ref()
    }

    /// Autotune state, `Idle` without a session
    pub fn autotune_state(&self) -> AutotuneState {
        self.autotune
            .as_ref()
            .map_or(AutotuneState::Idle, AutotuneSession::state)
    }

    /// Relay level written in the last actuation step
    pub fn relay_on(&self) -> bool {
        self.relay_on
    }

    /// Loop has a fault or an alarm worth the alert output
    pub fn wants_alert(&self) -> bool {
        self.output_enabled
            && self.sensor_online
            && (self.error.is_fault() || self.alarm != AlarmStatus::None)
    }

    pub(crate) fn set_sensor_online(&mut self, online: bool) {
        self.sensor_online = online;
    }

    // Sensor bookkeeping

    /// Accept a calibrated reading and re-evaluate the alarm
    pub(crate) fn record_reading(&mut self, measured: f32) {
        self.measured = measured;
        self.alarm = evaluate(self.measured, self.alarm_limits());
    }

    pub(crate) fn record_read_failure(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    /// Close an accumulation window
    ///
    /// Returns the failure count if it reached `limit` and the reading was
    /// forced to zero.
    pub(crate) fn roll_over_errors(&mut self, limit: u8) -> Option<u8> {
        let failures = self.error_count;
        self.error_count = 0;
        if failures >= limit {
            self.record_reading(0.0);
            Some(failures)
        } else {
            None
        }
    }

    // Faults

    fn latch(&mut self, error: LoopError) -> Option<ControlEvent> {
        if self.error.is_fault() {
            return None;
        }
        self.error = error;
        Some(ControlEvent::FaultLatched {
            loop_index: self.index,
            error,
        })
    }

    /// Periodic runaway check
    pub(crate) fn check_runaway(
        &mut self,
        now: Millis,
        global: &GlobalConfig,
    ) -> Option<ControlEvent> {
        let percent = self.output_percent(global.window_size());
        let tripped = self.runaway.check(
            self.measured,
            now,
            percent,
            self.output_enabled,
            global.timeout_s,
        );
        if tripped {
            self.latch(LoopError::Runaway)
        } else {
            None
        }
    }

    // Operator actions

    /// Switch the output on or off
    ///
    /// Switching on clears latched faults, restarts runaway tracking and
    /// resumes PI control bumplessly. Switching off ends any autotune session
    /// with the previous gains and holds the output at zero.
    pub(crate) fn set_output_enabled(&mut self, enabled: bool) -> Option<ControlEvent> {
        if enabled == self.output_enabled {
            return None;
        }

        if enabled {
            self.error = LoopError::Ok;
            self.runaway.reset();
            self.output_enabled = true;
            self.enter_auto();
        } else {
            if let Some(session) = self.autotune.take() {
                self.restore_gains(session.previous_gains());
            }
            self.output_enabled = false;
            self.status = LoopStatus::Off;
            self.output = 0.0;
            self.controller.set_mode(ControlMode::Manual, 0.0);
        }

        Some(ControlEvent::OutputChanged {
            loop_index: self.index,
            enabled,
        })
    }

    pub(crate) fn set_setpoint(&mut self, setpoint: f32) {
        self.config.setpoint = setpoint;
    }

    pub(crate) fn set_label(&mut self, label: String<MAX_LABEL_LEN>) {
        self.config.label = label;
    }

    pub(crate) fn set_alarm_limits(&mut self, limits: AlarmLimits) {
        self.config.low_alarm = limits.low;
        self.config.high_alarm = limits.high;
        self.alarm = evaluate(self.measured, limits);
    }

    /// Overwrite gains directly, refused while autotune owns the loop
    pub(crate) fn set_gains(&mut self, gains: Gains) -> Result<(), IntentError> {
        if self.autotune.is_some() {
            return Err(IntentError::AutotuneActive);
        }
        self.restore_gains(gains);
        Ok(())
    }

    fn restore_gains(&mut self, gains: Gains) {
        self.config.kp = gains.kp;
        self.config.ki = gains.ki;
    }

    fn enter_auto(&mut self) {
        self.status = LoopStatus::Auto;
        self.controller.set_mode(ControlMode::Automatic, self.output);
    }

    /// Begin a relay-feedback session from the current output
    pub(crate) fn start_autotune(
        &mut self,
        global: &GlobalConfig,
    ) -> Result<ControlEvent, IntentError> {
        if !global.autotune_enabled {
            return Err(IntentError::AutotuneDisabled);
        }
        if self.status != LoopStatus::Auto || !self.output_enabled || self.error.is_fault() {
            return Err(IntentError::NotReady);
        }

        let session = AutotuneSession::start(
            self.output,
            self.measured,
            self.gains(),
            global.delta_out,
            global.window_size(),
        )
        .map_err(|_| IntentError::RelayStepTooSmall)?;

        self.output = session.output();
        self.autotune = Some(session);
        self.status = LoopStatus::Autotune;
        self.controller.set_mode(ControlMode::Manual, self.output);

        Ok(ControlEvent::AutotuneStarted {
            loop_index: self.index,
        })
    }

    /// Drop the session and restore the gains in force at its start
    pub(crate) fn cancel_autotune(&mut self) -> Result<ControlEvent, IntentError> {
        let session = self.autotune.take().ok_or(IntentError::NoSession)?;
        self.restore_gains(session.previous_gains());
        self.output = session.baseline();
        self.enter_auto();

        Ok(ControlEvent::AutotuneCancelled {
            loop_index: self.index,
        })
    }

    /// Commit the gains found by a finished session
    pub(crate) fn save_autotune(&mut self) -> Result<ControlEvent, IntentError> {
        let session = self.autotune.as_ref().ok_or(IntentError::NoSession)?;
        let result = session.result().copied().ok_or(IntentError::NoResult)?;
        let baseline = session.baseline();

        self.autotune = None;
        self.restore_gains(result.gains);
        self.output = baseline;
        self.enter_auto();

        Ok(ControlEvent::AutotuneSaved {
            loop_index: self.index,
            gains: result.gains,
        })
    }

    // Per-pass work

    /// Run the PI controller or the autotune session
    pub(crate) fn update_control(&mut self, now: Millis) -> Option<ControlEvent> {
        match self.status {
            LoopStatus::Off | LoopStatus::Stabilizing => None,
            LoopStatus::Auto => {
                let gains = self.gains();
                let setpoint = self.config.setpoint;
                if let Some(output) = self.controller.compute(setpoint, self.measured, gains, now) {
                    self.output = output;
                }
                None
            }
            LoopStatus::Autotune => self.update_autotune(now),
        }
    }

    fn update_autotune(&mut self, now: Millis) -> Option<ControlEvent> {
        let index = self.index;
        let fault = self.error.is_fault();
        let session = self.autotune.as_mut()?;

        if fault {
            session.fail(AutotuneError::LoopFault);
        } else {
            self.output = session.update(self.measured, now);
        }

        match session.state() {
            AutotuneState::Done => {
                let result = session.result().copied()?;
                self.output = session.baseline();
                self.status = LoopStatus::Stabilizing;
                Some(ControlEvent::AutotuneComplete {
                    loop_index: index,
                    result,
                })
            }
            AutotuneState::Failed(reason) => {
                let previous = session.previous_gains();
                let baseline = session.baseline();
                self.autotune = None;
                self.restore_gains(previous);
                self.output = baseline;
                self.enter_auto();
                Some(ControlEvent::AutotuneFailed {
                    loop_index: index,
                    reason,
                })
            }
            _ => None,
        }
    }

    /// Fault check and relay level for this pass
    ///
    /// Returns the level to drive and any fault that latched.
    pub(crate) fn actuate(&mut self, now: Millis) -> (bool, Option<ControlEvent>) {
        self.window.advance(now);

        let event = if check_open_circuit(self.measured, self.output_enabled) {
            self.latch(LoopError::OpenOrShort)
        } else {
            None
        };

        self.relay_on = self.output_enabled
            && !self.error.is_fault()
            && self.window.is_on(now, self.output);
        (self.relay_on, event)
    }

    /// Next instant this loop's relay level can change
    pub fn next_edge(&self, now: Millis) -> Millis {
        self.window.next_edge(now, self.output)
    }

    /// Status push for the remote link
    pub fn telemetry(&self, window: f32) -> Telemetry {
        Telemetry {
            loop_index: self.index,
            setpoint: self.config.setpoint,
            measured: self.measured,
            output_percent: self
                .output_enabled
                .then(|| self.output_percent(window)),
            kp: self.config.kp,
            ki: self.config.ki,
            status: self.status.code(),
            autotune_cycle: self.autotune.as_ref().map_or(0, AutotuneSession::cycle),
        }
    }
}

//! Cooperative loop scheduler
//!
//! Owns every [`Loop`] plus the sensor and actuator buses, and sequences one
//! control pass at a time. Each pass runs, in order:
//!
//! 1. sensor read (one channel, round-robin)
//! 2. runaway check
//! 3. status broadcast
//! 4. alarm blink and alert output
//! 5. error-counter rollover
//! 6. PI or autotune for every loop
//! 7. actuation write-out for every loop
//!
//! Steps 1-5 are gated by their own [`Cadence`] and run at most once per
//! pass. Nothing here blocks; persistence and telemetry leave as requests in
//! the [`PassReport`].

use heapless::Vec;
use multitherm_protocol::Telemetry;

use super::cadence::Cadence;
use crate::config::{ConfigImage, GlobalConfig, LoopConfig, MAX_FILTER_COEFFICIENT, MAX_LOOPS};
use crate::control::{Gains, Loop};
use crate::safety::fault::RUNAWAY_CHECK_MS;
use crate::safety::{AlarmLimits, AlarmSummary};
use crate::sensor::{SensorChannel, SENSOR_POLL_MS};
use crate::state::{AutotuneSnapshot, ControlEvent, Intent, IntentError, LoopSnapshot, PersistRequest};
use crate::traits::{ActuatorBus, ThermocoupleBus};
use crate::Millis;

/// Status broadcast period (ms)
pub const STATUS_BROADCAST_MS: Millis = 2000;

/// Alarm blink and alert refresh period (ms)
pub const ALARM_BLINK_MS: Millis = 500;

/// Events buffered between passes
pub const MAX_EVENTS: usize = 16;

/// Persistence requests per pass (every loop plus the global record)
pub const MAX_PERSIST: usize = MAX_LOOPS + 1;

/// Output of one control pass
#[derive(Debug, Default)]
pub struct PassReport {
    /// Status push for the selected loop, when the broadcast gate fired
    pub telemetry: Option<Telemetry>,
    /// Transitions since the previous pass
    pub events: Vec<ControlEvent, MAX_EVENTS>,
    /// Configuration to write to flash
    pub persist: Vec<PersistRequest, MAX_PERSIST>,
}

/// Named deadlines of the pass
#[derive(Debug, Clone)]
struct Cadences {
    sensor_poll: Cadence,
    runaway_check: Cadence,
    status_broadcast: Cadence,
    alarm_blink: Cadence,
    error_rollover: Cadence,
}

impl Cadences {
    fn new(global: &GlobalConfig, now: Millis) -> Self {
        let rollover = global.error_rollover_ms();
        Self {
            sensor_poll: Cadence::new(SENSOR_POLL_MS, now),
            runaway_check: Cadence::new(RUNAWAY_CHECK_MS, now),
            status_broadcast: Cadence::new(STATUS_BROADCAST_MS, now),
            alarm_blink: Cadence::new(ALARM_BLINK_MS, now),
            error_rollover: Cadence::new(rollover, now + rollover),
        }
    }

    fn earliest(&self) -> Millis {
        [
            &self.sensor_poll,
            &self.runaway_check,
            &self.status_broadcast,
            &self.alarm_blink,
            &self.error_rollover,
        ]
        .iter()
        .map(|cadence| cadence.next_due())
        .min()
        .unwrap_or(Millis::MAX)
    }
}

/// Single owner of all loop state
pub struct LoopScheduler<S, A> {
    global: GlobalConfig,
    loops: Vec<Loop, MAX_LOOPS>,
    sensors: S,
    actuators: A,
    channel: SensorChannel,
    cadences: Cadences,
    selected: u8,
    blink_on: bool,
    alert_on: bool,
    alarm_summary: AlarmSummary,
    /// Amplifier settings changed and must be pushed on the next poll
    sensor_config_dirty: bool,
    pending_events: Vec<ControlEvent, MAX_EVENTS>,
    persist_loops: [bool; MAX_LOOPS],
    persist_global: bool,
}

impl<S: ThermocoupleBus, A: ActuatorBus> LoopScheduler<S, A> {
    /// Create a scheduler for `global.num_loops` loops
    ///
    /// Loop configurations missing from `configs` use defaults. Every value
    /// is sanitized against the global limits.
    pub fn new(
        mut global: GlobalConfig,
        configs: &[LoopConfig],
        sensors: S,
        actuators: A,
        now: Millis,
    ) -> Self {
        global.sanitize();

        let mut loops = Vec::new();
        for index in 0..global.num_loops {
            let mut config = configs.get(index as usize).cloned().unwrap_or_default();
            config.sanitize(&global);
            let _ = loops.push(Loop::new(index, config, global.window_size_ms, now));
        }

        Self {
            channel: SensorChannel::new(global.num_loops),
            cadences: Cadences::new(&global, now),
            global,
            loops,
            sensors,
            actuators,
            selected: 0,
            blink_on: false,
            alert_on: false,
            alarm_summary: AlarmSummary::default(),
            sensor_config_dirty: false,
            pending_events: Vec::new(),
            persist_loops: [false; MAX_LOOPS],
            persist_global: false,
        }
    }

    /// Create a scheduler from a loaded configuration image
    pub fn from_image(image: &ConfigImage, sensors: S, actuators: A, now: Millis) -> Self {
        Self::new(image.global.clone(), &image.loops, sensors, actuators, now)
    }

    /// Probe every amplifier and push the thermocouple settings
    ///
    /// Call once at boot. Returns an event for each missing amplifier.
    pub fn probe_sensors(&mut self) -> Vec<ControlEvent, MAX_LOOPS> {
        let events = SensorChannel::probe(&mut self.sensors, &mut self.loops);
        self.push_sensor_config();
        events
    }

    fn push_sensor_config(&mut self) {
        let result = SensorChannel::configure(
            &mut self.sensors,
            &self.loops,
            self.global.thermocouple,
            self.global.filter_coefficient,
        );
        self.sensor_config_dirty = result.is_err();
    }

    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    pub fn selected(&self) -> u8 {
        self.selected
    }

    pub fn selected_loop(&self) -> Option<&Loop> {
        self.loops.get(self.selected as usize)
    }

    /// Blink phase for faulted display rows
    pub fn blink_on(&self) -> bool {
        self.blink_on
    }

    /// Level last written to the alert output
    pub fn alert_on(&self) -> bool {
        self.alert_on
    }

    pub fn alarm_summary(&self) -> AlarmSummary {
        self.alarm_summary
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    /// Display rows for every loop
    pub fn snapshots(&self) -> Vec<LoopSnapshot, MAX_LOOPS> {
        let window = self.global.window_size();
        self.loops
            .iter()
            .map(|lp| LoopSnapshot::from_loop(lp, window))
            .collect()
    }

    /// Autotune view of the selected loop
    pub fn autotune_snapshot(&self) -> Option<AutotuneSnapshot> {
        let lp = self.selected_loop()?;
        AutotuneSnapshot::from_loop(lp, self.global.window_size())
    }

    /// Build the image to persist from the live configuration
    ///
    /// Slots beyond `num_loops` are taken from `base`.
    pub fn config_image(&self, base: &ConfigImage) -> ConfigImage {
        let mut loops = base.loops.clone();
        for lp in self.loops.iter() {
            loops[lp.index() as usize] = lp.config().clone();
        }
        ConfigImage::new(self.global.clone(), loops)
    }

    /// Report a persistence request again on the next pass
    ///
    /// For requests the storage side could not accept.
    pub fn requeue_persist(&mut self, request: PersistRequest) {
        match request {
            PersistRequest::Loop(index) => {
                if let Some(dirty) = self.persist_loops.get_mut(index as usize) {
                    *dirty = true;
                }
            }
            PersistRequest::Global => self.persist_global = true,
        }
    }

    fn selected_index(&self) -> Result<usize, IntentError> {
        let index = self.selected as usize;
        if index < self.loops.len() {
            Ok(index)
        } else {
            Err(IntentError::InvalidLoop)
        }
    }

    fn record(&mut self, event: ControlEvent) {
        let _ = self.pending_events.push(event);
    }

    /// Apply an operator intent
    ///
    /// Accepted intents take effect immediately. Resulting events and
    /// persistence requests are reported by the next [`run_pass`].
    ///
    /// [`run_pass`]: LoopScheduler::run_pass
    pub fn handle_intent(&mut self, intent: Intent) -> Result<(), IntentError> {
        match intent {
            Intent::SelectLoop(index) => {
                if index as usize >= self.loops.len() {
                    return Err(IntentError::InvalidLoop);
                }
                self.selected = index;
            }
            Intent::SetSetpoint(setpoint) => {
                if !self.global.sp_change_enabled {
                    return Err(IntentError::SetpointLocked);
                }
                let value = finite(setpoint)?;
                let index = self.selected_index()?;
                let clamped = self.global.clamp_setpoint(value);
                self.loops[index].set_setpoint(clamped);
                self.persist_loops[index] = true;
            }
            Intent::ToggleOutput => {
                let index = self.selected_index()?;
                let lp = &mut self.loops[index];
                let enabled = !lp.output_enabled();
                if let Some(event) = lp.set_output_enabled(enabled) {
                    self.record(event);
                }
            }
            Intent::StartAutotune => {
                let index = self.selected_index()?;
                let event = self.loops[index].start_autotune(&self.global)?;
                self.record(event);
            }
            Intent::CancelAutotune => {
                let index = self.selected_index()?;
                let event = self.loops[index].cancel_autotune()?;
                self.record(event);
            }
            Intent::SaveAutotune => {
                let index = self.selected_index()?;
                let event = self.loops[index].save_autotune()?;
                self.record(event);
                self.persist_loops[index] = true;
            }
            Intent::SetFilterCoefficient(coefficient) => {
                if coefficient > MAX_FILTER_COEFFICIENT {
                    return Err(IntentError::OutOfRange);
                }
                self.global.filter_coefficient = coefficient;
                self.sensor_config_dirty = true;
                self.persist_global = true;
            }
            Intent::SetKpTuning(step) => {
                let step = finite(step)?;
                if step <= 0.0 {
                    return Err(IntentError::OutOfRange);
                }
                self.global.kp_tuning = step;
                self.persist_global = true;
            }
            Intent::SetDeltaOut(delta) => {
                let delta = finite(delta)?;
                if delta <= 0.0 || delta > 1.0 {
                    return Err(IntentError::OutOfRange);
                }
                self.global.delta_out = delta;
                self.persist_global = true;
            }
            Intent::SetSpEnable(enabled) => {
                self.global.sp_change_enabled = enabled;
                self.persist_global = true;
            }
            Intent::SetAtEnable(enabled) => {
                self.global.autotune_enabled = enabled;
                self.persist_global = true;
            }
            Intent::SetLabel(label) => {
                let index = self.selected_index()?;
                self.loops[index].set_label(label);
                self.persist_loops[index] = true;
            }
            Intent::SetKp(kp) => {
                let kp = non_negative(kp)?;
                let index = self.selected_index()?;
                let lp = &mut self.loops[index];
                lp.set_gains(Gains::new(kp, lp.gains().ki))?;
                self.persist_loops[index] = true;
            }
            Intent::SetKi(ki) => {
                let ki = non_negative(ki)?;
                let index = self.selected_index()?;
                let lp = &mut self.loops[index];
                lp.set_gains(Gains::new(lp.gains().kp, ki))?;
                self.persist_loops[index] = true;
            }
            Intent::SetLowAlarm(low) => {
                let low = finite(low)?;
                let index = self.selected_index()?;
                let lp = &mut self.loops[index];
                let limits = AlarmLimits {
                    low,
                    ..lp.alarm_limits()
                };
                lp.set_alarm_limits(limits);
                self.persist_loops[index] = true;
            }
            Intent::SetHighAlarm(high) => {
                let high = finite(high)?;
                let index = self.selected_index()?;
                let lp = &mut self.loops[index];
                let limits = AlarmLimits {
                    high,
                    ..lp.alarm_limits()
                };
                lp.set_alarm_limits(limits);
                self.persist_loops[index] = true;
            }
        }
        Ok(())
    }

    /// Run one control pass at `now`
    pub fn run_pass(&mut self, now: Millis) -> PassReport {
        let mut report = PassReport {
            events: core::mem::take(&mut self.pending_events),
            ..PassReport::default()
        };

        // 1. Sensor read
        if self.cadences.sensor_poll.fire(now) {
            if self.sensor_config_dirty {
                self.push_sensor_config();
            }
            let _ = self.channel.poll_next(&mut self.sensors, &mut self.loops);
            self.alarm_summary = AlarmSummary::from_loops(
                self.loops.iter().map(|lp| (lp.output_enabled(), lp.alarm())),
            );
        }

        // 2. Runaway check
        if self.cadences.runaway_check.fire(now) {
            for lp in self.loops.iter_mut() {
                if let Some(event) = lp.check_runaway(now, &self.global) {
                    let _ = report.events.push(event);
                }
            }
        }

        // 3. Status broadcast
        if self.cadences.status_broadcast.fire(now) {
            let window = self.global.window_size();
            report.telemetry = self.selected_loop().map(|lp| lp.telemetry(window));
        }

        // 4. Alarm blink and alert output
        if self.cadences.alarm_blink.fire(now) {
            self.blink_on = !self.blink_on;
            self.alert_on = self.loops.iter().any(Loop::wants_alert);
            self.actuators.set_alert(self.alert_on);
        }

        // 5. Error-counter rollover
        if self.cadences.error_rollover.fire(now) {
            let limit = self.global.consecutive_error_limit;
            for event in SensorChannel::roll_over(&mut self.loops, limit) {
                let _ = report.events.push(event);
            }
        }

        // 6. PI / autotune
        for lp in self.loops.iter_mut() {
            if let Some(event) = lp.update_control(now) {
                let _ = report.events.push(event);
            }
        }

        // 7. Actuation
        for lp in self.loops.iter_mut() {
            let (on, event) = lp.actuate(now);
            self.actuators.set_output(lp.index(), on);
            if let Some(event) = event {
                let _ = report.events.push(event);
            }
        }

        for (index, dirty) in self.persist_loops.iter_mut().enumerate() {
            if *dirty {
                *dirty = false;
                let _ = report.persist.push(PersistRequest::Loop(index as u8));
            }
        }
        if self.persist_global {
            self.persist_global = false;
            let _ = report.persist.push(PersistRequest::Global);
        }

        report
    }

    /// Earliest instant a pass has work to do
    ///
    /// Covers every cadence and the next relay edge of each driven loop.
    /// Returns `now` when something is already due.
    pub fn next_deadline(&self, now: Millis) -> Millis {
        let relay_edge = self
            .loops
            .iter()
            .filter(|lp| lp.output_enabled() && !lp.error().is_fault())
            .map(|lp| lp.next_edge(now))
            .min()
            .unwrap_or(Millis::MAX);

        self.cadences.earliest().min(relay_edge).max(now)
    }
}

fn finite(value: f32) -> Result<f32, IntentError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(IntentError::OutOfRange)
    }
}

fn non_negative(value: f32) -> Result<f32, IntentError> {
    let value = finite(value)?;
    if value < 0.0 {
        return Err(IntentError::OutOfRange);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThermocoupleType;
    use crate::control::{AutotuneState, LoopStatus};
    use crate::safety::LoopError;
    use crate::traits::SensorError;

    struct MockSensors {
        temps: [f32; MAX_LOOPS],
        connected: [bool; MAX_LOOPS],
        filter: Option<u8>,
    }

    impl MockSensors {
        fn at(temp: f32) -> Self {
            Self {
                temps: [temp; MAX_LOOPS],
                connected: [true; MAX_LOOPS],
                filter: None,
            }
        }
    }

    impl ThermocoupleBus for MockSensors {
        fn is_connected(&mut self, channel: u8) -> bool {
            self.connected[channel as usize]
        }

        fn available(&mut self, _channel: u8) -> bool {
            true
        }

        fn read_temperature(&mut self, channel: u8) -> Result<f32, SensorError> {
            Ok(self.temps[channel as usize])
        }

        fn configure(
            &mut self,
            _channel: u8,
            _thermocouple: ThermocoupleType,
            filter_coefficient: u8,
        ) -> Result<(), SensorError> {
            self.filter = Some(filter_coefficient);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockActuators {
        outputs: [bool; MAX_LOOPS],
        alert: bool,
        writes: u32,
    }

    impl ActuatorBus for MockActuators {
        fn set_output(&mut self, channel: u8, on: bool) {
            self.outputs[channel as usize] = on;
            self.writes += 1;
        }

        fn set_alert(&mut self, on: bool) {
            self.alert = on;
        }
    }

    fn single_loop(config: LoopConfig, temp: f32) -> LoopScheduler<MockSensors, MockActuators> {
        let global = GlobalConfig {
            num_loops: 1,
            timeout_s: 10,
            delta_out: 0.6,
            ..GlobalConfig::default()
        };
        let mut scheduler =
            LoopScheduler::new(global, &[config], MockSensors::at(temp), MockActuators::default(), 0);
        scheduler.probe_sensors();
        scheduler
    }

    fn has_event(report: &PassReport, wanted: &ControlEvent) -> bool {
        report.events.iter().any(|event| event == wanted)
    }

    #[test]
    fn test_creates_configured_loops() {
        let global = GlobalConfig {
            num_loops: 3,
            ..GlobalConfig::default()
        };
        let scheduler = LoopScheduler::new(
            global,
            &[],
            MockSensors::at(20.0),
            MockActuators::default(),
            0,
        );
        assert_eq!(scheduler.loops().len(), 3);
        assert_eq!(scheduler.snapshots().len(), 3);
    }

    #[test]
    fn test_probe_reports_offline() {
        let mut sensors = MockSensors::at(20.0);
        sensors.connected[4] = false;
        let mut scheduler = LoopScheduler::new(
            GlobalConfig::default(),
            &[],
            sensors,
            MockActuators::default(),
            0,
        );

        let events = scheduler.probe_sensors();
        assert_eq!(events.as_slice(), &[ControlEvent::SensorOffline { loop_index: 4 }]);
        assert!(!scheduler.loops()[4].sensor_online());
    }

    #[test]
    fn test_round_robin_reads() {
        let mut scheduler = LoopScheduler::new(
            GlobalConfig::default(),
            &[],
            MockSensors::at(20.0),
            MockActuators::default(),
            0,
        );
        scheduler.probe_sensors();

        // One channel per 200 ms tick
        scheduler.run_pass(0);
        scheduler.run_pass(100);
        assert_eq!(scheduler.loops()[0].measured(), 20.0);
        assert_eq!(scheduler.loops()[1].measured(), 0.0);

        scheduler.run_pass(200);
        assert_eq!(scheduler.loops()[1].measured(), 20.0);
    }

    #[test]
    fn test_disabled_loop_stays_off() {
        let mut scheduler = single_loop(LoopConfig::default(), 20.0);
        for step in 0..10 {
            scheduler.run_pass(step * 100);
            assert!(!scheduler.actuators().outputs[0]);
        }
        assert_eq!(scheduler.loops()[0].output(), 0.0);
    }

    #[test]
    fn test_full_output_drives_whole_window() {
        let config = LoopConfig {
            setpoint: 300.0,
            kp: 1000.0,
            ki: 0.0,
            ..LoopConfig::default()
        };
        let mut scheduler = single_loop(config, 100.0);
        scheduler.run_pass(0);
        scheduler.handle_intent(Intent::ToggleOutput).unwrap();

        for step in 1..40 {
            scheduler.run_pass(step * 100);
            assert!(scheduler.actuators().outputs[0], "off at {}", step * 100);
        }
    }

    #[test]
    fn test_open_circuit_forces_off_and_alerts() {
        let mut scheduler = single_loop(LoopConfig::default(), 0.0);
        scheduler.handle_intent(Intent::ToggleOutput).unwrap();

        let report = scheduler.run_pass(0);
        assert!(has_event(
            &report,
            &ControlEvent::FaultLatched {
                loop_index: 0,
                error: LoopError::OpenOrShort
            }
        ));
        assert!(!scheduler.actuators().outputs[0]);

        // The alert is refreshed on the blink tick
        scheduler.run_pass(500);
        assert!(scheduler.actuators().alert);
        assert!(scheduler.alert_on());

        // Still latched after the sensor recovers
        scheduler.sensors_mut().temps[0] = 150.0;
        for step in 6..30 {
            scheduler.run_pass(step * 100);
            assert!(!scheduler.actuators().outputs[0]);
        }
        assert_eq!(scheduler.loops()[0].error(), LoopError::OpenOrShort);

        // Operator off -> on clears it
        scheduler.handle_intent(Intent::ToggleOutput).unwrap();
        scheduler.handle_intent(Intent::ToggleOutput).unwrap();
        scheduler.run_pass(3000);
        assert_eq!(scheduler.loops()[0].error(), LoopError::Ok);
    }

    #[test]
    fn test_runaway_latches() {
        let config = LoopConfig {
            setpoint: 400.0,
            kp: 1000.0,
            ki: 0.0,
            ..LoopConfig::default()
        };
        let mut scheduler = single_loop(config, 150.0);
        scheduler.handle_intent(Intent::ToggleOutput).unwrap();

        let mut latched_at = None;
        for step in 0..=120 {
            let now = step * 100;
            let report = scheduler.run_pass(now);
            let runaway = ControlEvent::FaultLatched {
                loop_index: 0,
                error: LoopError::Runaway,
            };
            if has_event(&report, &runaway) {
                latched_at = Some(now);
                break;
            }
        }

        assert_eq!(latched_at, Some(10_000));
        assert!(!scheduler.actuators().outputs[0]);
    }

    #[test]
    fn test_telemetry_cadence() {
        let mut scheduler = single_loop(LoopConfig::default(), 80.0);

        assert!(scheduler.run_pass(0).telemetry.is_some());
        assert!(scheduler.run_pass(1000).telemetry.is_none());
        let telemetry = scheduler.run_pass(2000).telemetry.unwrap();
        assert_eq!(telemetry.measured, 80.0);
        assert_eq!(telemetry.output_percent, None);
    }

    #[test]
    fn test_error_rollover_zeroes_reading() {
        struct FlakySensors {
            fail: bool,
        }

        impl ThermocoupleBus for FlakySensors {
            fn is_connected(&mut self, _channel: u8) -> bool {
                true
            }

            fn available(&mut self, _channel: u8) -> bool {
                true
            }

            fn read_temperature(&mut self, _channel: u8) -> Result<f32, SensorError> {
                if self.fail {
                    Err(SensorError::Bus)
                } else {
                    Ok(95.0)
                }
            }
        }

        let global = GlobalConfig {
            num_loops: 1,
            consecutive_error_limit: 3,
            ..GlobalConfig::default()
        };
        let mut scheduler = LoopScheduler::new(
            global,
            &[],
            FlakySensors { fail: false },
            MockActuators::default(),
            0,
        );
        scheduler.probe_sensors();
        scheduler.run_pass(0);
        assert_eq!(scheduler.loops()[0].measured(), 95.0);

        // Rollover window is 1 × 220 × 3 = 660 ms, closed by the 800 ms pass
        scheduler.sensors_mut().fail = true;
        let mut zeroed = false;
        for step in 1..=4 {
            let report = scheduler.run_pass(step * 200);
            zeroed |= report
                .events
                .iter()
                .any(|event| matches!(event, ControlEvent::ReadingZeroed { loop_index: 0, .. }));
        }
        assert!(zeroed);
        assert_eq!(scheduler.loops()[0].measured(), 0.0);
    }

    #[test]
    fn test_select_loop_bounds() {
        let mut scheduler = single_loop(LoopConfig::default(), 20.0);
        assert_eq!(
            scheduler.handle_intent(Intent::SelectLoop(1)),
            Err(IntentError::InvalidLoop)
        );
        assert_eq!(scheduler.handle_intent(Intent::SelectLoop(0)), Ok(()));
    }

    #[test]
    fn test_setpoint_clamped_and_persisted() {
        let mut scheduler = single_loop(LoopConfig::default(), 20.0);
        scheduler.handle_intent(Intent::SetSetpoint(950.0)).unwrap();
        assert_eq!(scheduler.loops()[0].setpoint(), 400.0);

        let report = scheduler.run_pass(0);
        assert_eq!(report.persist.as_slice(), &[PersistRequest::Loop(0)]);

        // Flags clear once reported
        assert!(scheduler.run_pass(100).persist.is_empty());
    }

    #[test]
    fn test_rejected_persist_reported_again() {
        let mut scheduler = single_loop(LoopConfig::default(), 20.0);
        scheduler.handle_intent(Intent::SetKp(12.0)).unwrap();
        scheduler.handle_intent(Intent::SetDeltaOut(0.4)).unwrap();

        let report = scheduler.run_pass(0);
        assert_eq!(
            report.persist.as_slice(),
            &[PersistRequest::Loop(0), PersistRequest::Global]
        );

        // Storage had no room for either request
        for request in report.persist {
            scheduler.requeue_persist(request);
        }
        let report = scheduler.run_pass(100);
        assert_eq!(
            report.persist.as_slice(),
            &[PersistRequest::Loop(0), PersistRequest::Global]
        );

        assert!(scheduler.run_pass(200).persist.is_empty());

        // Unknown loops are ignored
        scheduler.requeue_persist(PersistRequest::Loop(7));
        assert!(scheduler.run_pass(300).persist.is_empty());
    }

    #[test]
    fn test_setpoint_locked() {
        let mut scheduler = single_loop(LoopConfig::default(), 20.0);
        scheduler.handle_intent(Intent::SetSpEnable(false)).unwrap();
        assert_eq!(
            scheduler.handle_intent(Intent::SetSetpoint(120.0)),
            Err(IntentError::SetpointLocked)
        );

        let report = scheduler.run_pass(0);
        assert_eq!(report.persist.as_slice(), &[PersistRequest::Global]);
    }

    #[test]
    fn test_global_option_validation() {
        let mut scheduler = single_loop(LoopConfig::default(), 20.0);
        assert_eq!(
            scheduler.handle_intent(Intent::SetFilterCoefficient(8)),
            Err(IntentError::OutOfRange)
        );
        assert_eq!(
            scheduler.handle_intent(Intent::SetDeltaOut(1.5)),
            Err(IntentError::OutOfRange)
        );
        assert_eq!(
            scheduler.handle_intent(Intent::SetKp(-2.0)),
            Err(IntentError::OutOfRange)
        );
    }

    #[test]
    fn test_filter_change_reconfigures_sensors() {
        let mut scheduler = single_loop(LoopConfig::default(), 20.0);
        assert_eq!(scheduler.sensors_mut().filter, Some(2));

        scheduler.handle_intent(Intent::SetFilterCoefficient(6)).unwrap();
        scheduler.run_pass(0);
        assert_eq!(scheduler.sensors_mut().filter, Some(6));
    }

    #[test]
    fn test_alarm_summary_needs_enabled_output() {
        let config = LoopConfig {
            high_alarm: 100.0,
            setpoint: 50.0,
            ..LoopConfig::default()
        };
        let mut scheduler = single_loop(config, 150.0);
        scheduler.run_pass(0);
        assert!(!scheduler.alarm_summary().active);

        scheduler.handle_intent(Intent::ToggleOutput).unwrap();
        scheduler.run_pass(200);
        assert!(scheduler.alarm_summary().active);
        scheduler.run_pass(500);
        assert!(scheduler.actuators().alert);
    }

    #[test]
    fn test_next_deadline() {
        let mut scheduler = single_loop(LoopConfig::default(), 20.0);
        scheduler.run_pass(0);
        assert_eq!(scheduler.next_deadline(0), SENSOR_POLL_MS);
        assert_eq!(scheduler.next_deadline(250), 250);
    }

    fn approx(a: f32, b: f32, tolerance: f32) -> bool {
        let diff = a - b;
        diff <= tolerance && diff >= -tolerance
    }

    #[test]
    fn test_autotune_session_end_to_end() {
        // Kp 500 with a 1 °C error gives a 500 ms baseline
        let config = LoopConfig {
            setpoint: 200.0,
            kp: 500.0,
            ki: 0.0,
            ..LoopConfig::default()
        };
        let mut scheduler = single_loop(config, 199.0);
        scheduler.handle_intent(Intent::ToggleOutput).unwrap();
        scheduler.run_pass(0);
        assert_eq!(scheduler.loops()[0].output(), 500.0);

        scheduler.handle_intent(Intent::StartAutotune).unwrap();
        assert_eq!(
            scheduler.handle_intent(Intent::SetKi(1.0)),
            Err(IntentError::AutotuneActive)
        );

        let samples = [
            199.0, 195.0, 205.0, 195.0, 205.0, 195.0, 195.0, 195.0, 195.0, 195.0, 205.0, 210.0,
            190.0, 195.0, 200.0, 195.0, 205.0,
        ];
        let mut completed = None;
        for (step, temp) in samples.iter().enumerate() {
            scheduler.sensors_mut().temps[0] = *temp;
            let report = scheduler.run_pass(1000 + step as Millis * 1000);
            for event in report.events.iter() {
                if let ControlEvent::AutotuneComplete { result, .. } = event {
                    completed = Some(*result);
                }
            }
        }

        let result = completed.unwrap();
        assert!(approx(result.gains.kp, 15.279, 0.01));
        assert!(approx(result.gains.ki, 3.056, 0.01));
        assert_eq!(scheduler.loops()[0].status(), LoopStatus::Stabilizing);
        assert_eq!(scheduler.loops()[0].output(), 500.0);

        let snapshot = scheduler.autotune_snapshot().unwrap();
        assert_eq!(snapshot.state, AutotuneState::Done);
        assert_eq!(snapshot.baseline_gains, Gains::new(500.0, 0.0));

        scheduler.handle_intent(Intent::SaveAutotune).unwrap();
        let report = scheduler.run_pass(20_000);
        assert_eq!(report.persist.as_slice(), &[PersistRequest::Loop(0)]);
        assert_eq!(scheduler.loops()[0].status(), LoopStatus::Auto);
        assert_eq!(scheduler.loops()[0].gains(), result.gains);
    }

    #[test]
    fn test_autotune_cancel_restores_without_persist() {
        let config = LoopConfig {
            setpoint: 200.0,
            kp: 500.0,
            ki: 0.0,
            ..LoopConfig::default()
        };
        let mut scheduler = single_loop(config, 199.0);
        scheduler.handle_intent(Intent::ToggleOutput).unwrap();
        scheduler.run_pass(0);
        scheduler.handle_intent(Intent::StartAutotune).unwrap();
        scheduler.run_pass(1000);

        scheduler.handle_intent(Intent::CancelAutotune).unwrap();
        let report = scheduler.run_pass(2000);
        assert!(report.persist.is_empty());
        assert!(has_event(
            &report,
            &ControlEvent::AutotuneCancelled { loop_index: 0 }
        ));
        assert_eq!(scheduler.loops()[0].gains(), Gains::new(500.0, 0.0));
        assert_eq!(scheduler.loops()[0].status(), LoopStatus::Auto);
    }

    #[test]
    fn test_config_image_reflects_edits() {
        let mut scheduler = single_loop(LoopConfig::default(), 20.0);
        scheduler.handle_intent(Intent::SetKp(7.5)).unwrap();

        let image = scheduler.config_image(&ConfigImage::default());
        assert_eq!(image.loops[0].kp, 7.5);
        assert_eq!(image.global.num_loops, 1);
        assert!(image.verify_crc());
    }
}

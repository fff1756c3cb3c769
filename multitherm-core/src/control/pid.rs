//! PI loop controller
//!
//! Implements proportional-integral control with time-proportioning output
//! for relay-driven heaters. The controller produces an on-time command in
//! milliseconds within `[0, window]`; [`RelayWindow`] turns that command into
//! an on/off level.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Millis;

/// Controller sample period (ms)
pub const SAMPLE_TIME_MS: Millis = 1000;

/// Sample period in seconds, the integration step
const SAMPLE_TIME_S: f32 = SAMPLE_TIME_MS as f32 / 1000.0;

/// PI gains (Kd is fixed at zero)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Gains {
    /// Proportional gain (Kp)
    pub kp: f32,
    /// Integral gain (Ki)
    pub ki: f32,
}

impl Gains {
    pub const fn new(kp: f32, ki: f32) -> Self {
        Self { kp, ki }
    }
}

/// Who writes the output command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlMode {
    /// Output is held by someone else (loop off, autotune)
    Manual,
    /// Controller computes the output
    Automatic,
}

/// PI controller with anti-windup and bumpless transfer
#[derive(Debug, Clone)]
pub struct PiController {
    /// Upper output limit, the relay window length
    output_max: f32,
    /// Accumulated integral term, kept within the output limits
    integral: f32,
    output: f32,
    /// Time of the last computation, `None` re-arms the sample gate
    last_compute: Option<Millis>,
    mode: ControlMode,
}

impl PiController {
    /// Create a controller in manual mode with output limits `[0, output_max]`
    pub fn new(output_max: f32) -> Self {
        Self {
            output_max,
            integral: 0.0,
            output: 0.0,
            last_compute: None,
            mode: ControlMode::Manual,
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Last computed output command
    pub fn output(&self) -> f32 {
        self.output
    }

    /// Switch mode
    ///
    /// Entering automatic from manual seeds the integral with
    /// `current_output` so the first computed output continues smoothly.
    pub fn set_mode(&mut self, mode: ControlMode, current_output: f32) {
        if mode == ControlMode::Automatic && self.mode == ControlMode::Manual {
            self.initialize(current_output);
        }
        self.mode = mode;
    }

    fn initialize(&mut self, current_output: f32) {
        self.output = current_output.clamp(0.0, self.output_max);
        self.integral = self.output;
        self.last_compute = None;
    }

    /// Run one control step if the sample period has elapsed
    ///
    /// Returns the new output command, or `None` when the controller is in
    /// manual mode, the sample gate has not opened yet, or the measurement
    /// is not a finite number.
    pub fn compute(
        &mut self,
        setpoint: f32,
        measured: f32,
        gains: Gains,
        now: Millis,
    ) -> Option<f32> {
        if self.mode == ControlMode::Manual || !measured.is_finite() {
            return None;
        }
        if let Some(last) = self.last_compute {
            if now.saturating_sub(last) < SAMPLE_TIME_MS {
                return None;
            }
        }

        let error = setpoint - measured;

        // Integral with anti-windup clamp
        self.integral += gains.ki * SAMPLE_TIME_S * error;
        self.integral = self.integral.clamp(0.0, self.output_max);

        let output = gains.kp * error + self.integral;
        self.output = output.clamp(0.0, self.output_max);
        self.last_compute = Some(now);

        Some(self.output)
    }
}

/// Time-proportioning relay window
///
/// The window start only ever advances by whole window lengths, so the duty
/// pattern stays phase-locked to boot regardless of pass jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RelayWindow {
    start: Millis,
    size_ms: u32,
}

impl RelayWindow {
    pub fn new(size_ms: u32, now: Millis) -> Self {
        Self {
            start: now,
            size_ms: size_ms.max(1),
        }
    }

    /// Start of the current window
    pub fn start(&self) -> Millis {
        self.start
    }

    /// Advance the window start past `now`
    pub fn advance(&mut self, now: Millis) {
        let size = self.size_ms as Millis;
        let elapsed = now.saturating_sub(self.start);
        if elapsed >= size {
            self.start += (elapsed / size) * size;
        }
    }

    /// Relay level for `command` ms of on-time at `now`
    pub fn is_on(&self, now: Millis, command: f32) -> bool {
        let elapsed = now.saturating_sub(self.start);
        (elapsed as f32) < command
    }

    /// Next instant the relay level can change
    pub fn next_edge(&self, now: Millis, command: f32) -> Millis {
        let window_end = self.start + self.size_ms as Millis;
        let on_until = self.start + ceil_ms(command);
        if now < on_until && on_until < window_end {
            on_until
        } else {
            window_end
        }
    }
}

/// Round a non-negative millisecond command up to a whole millisecond
fn ceil_ms(command: f32) -> Millis {
    if command <= 0.0 {
        return 0;
    }
    let whole = command as Millis;
    if (whole as f32) < command {
        whole + 1
    } else {
        whole
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: f32 = 2000.0;

    fn automatic() -> PiController {
        let mut controller = PiController::new(WINDOW);
        controller.set_mode(ControlMode::Automatic, 0.0);
        controller
    }

    #[test]
    fn test_manual_mode_holds() {
        let mut controller = PiController::new(WINDOW);
        assert_eq!(controller.compute(100.0, 20.0, Gains::new(10.0, 1.0), 0), None);
        assert_eq!(controller.output(), 0.0);
    }

    #[test]
    fn test_heating_needed() {
        let mut controller = automatic();
        let output = controller.compute(50.0, 40.0, Gains::new(10.0, 0.0), 0);
        assert_eq!(output, Some(100.0));
    }

    #[test]
    fn test_sample_gate() {
        let mut controller = automatic();
        let gains = Gains::new(10.0, 0.0);

        assert!(controller.compute(50.0, 40.0, gains, 0).is_some());
        assert_eq!(controller.compute(50.0, 30.0, gains, 999), None);
        assert_eq!(controller.compute(50.0, 30.0, gains, 1000), Some(200.0));
    }

    #[test]
    fn test_integral_accumulates() {
        let mut controller = automatic();
        let gains = Gains::new(0.0, 2.0);

        assert_eq!(controller.compute(50.0, 40.0, gains, 0), Some(20.0));
        assert_eq!(controller.compute(50.0, 40.0, gains, 1000), Some(40.0));
        assert_eq!(controller.compute(50.0, 40.0, gains, 2000), Some(60.0));
    }

    #[test]
    fn test_anti_windup() {
        let mut controller = automatic();
        let gains = Gains::new(0.0, 500.0);

        for i in 0..10 {
            controller.compute(300.0, 20.0, gains, i * 1000);
        }
        assert_eq!(controller.output(), WINDOW);

        // Integral was clamped, so one step above setpoint drops below the limit
        let output = controller.compute(300.0, 301.0, gains, 10_000).unwrap();
        assert_eq!(output, WINDOW - 500.0);
    }

    #[test]
    fn test_output_clamped_low() {
        let mut controller = automatic();
        let output = controller.compute(50.0, 80.0, Gains::new(10.0, 1.0), 0);
        assert_eq!(output, Some(0.0));
    }

    #[test]
    fn test_bumpless_transfer() {
        let mut controller = PiController::new(WINDOW);
        controller.set_mode(ControlMode::Automatic, 750.0);

        // Zero error keeps the seeded output
        let output = controller.compute(100.0, 100.0, Gains::new(5.0, 1.0), 0);
        assert_eq!(output, Some(750.0));
    }

    #[test]
    fn test_mode_switch_rearms_gate() {
        let mut controller = automatic();
        let gains = Gains::new(10.0, 0.0);
        controller.compute(50.0, 40.0, gains, 0);

        controller.set_mode(ControlMode::Manual, 0.0);
        controller.set_mode(ControlMode::Automatic, 100.0);
        assert!(controller.compute(50.0, 40.0, gains, 10).is_some());
    }

    #[test]
    fn test_non_finite_measurement_skipped() {
        let mut controller = automatic();
        assert_eq!(controller.compute(50.0, f32::NAN, Gains::new(1.0, 1.0), 0), None);
    }

    #[test]
    fn test_window_duty() {
        let mut window = RelayWindow::new(2000, 0);

        for cycle in 0..3u64 {
            for offset in [0u64, 600, 1199, 1200, 1999] {
                let now = cycle * 2000 + offset;
                window.advance(now);
                assert_eq!(window.is_on(now, 1200.0), offset < 1200, "at {}", now);
            }
        }
    }

    #[test]
    fn test_window_advances_in_steps() {
        let mut window = RelayWindow::new(2000, 100);
        window.advance(2099);
        assert_eq!(window.start(), 100);
        window.advance(2100);
        assert_eq!(window.start(), 2100);

        // A late pass keeps the phase
        window.advance(9_000);
        assert_eq!(window.start(), 8100);
    }

    #[test]
    fn test_window_zero_and_full() {
        let window = RelayWindow::new(2000, 0);
        assert!(!window.is_on(0, 0.0));
        assert!(window.is_on(1999, 2000.0));
    }

    #[test]
    fn test_next_edge() {
        let window = RelayWindow::new(2000, 0);
        assert_eq!(window.next_edge(100, 1200.0), 1200);
        assert_eq!(window.next_edge(100, 1199.5), 1200);
        assert_eq!(window.next_edge(1500, 1200.0), 2000);
        assert_eq!(window.next_edge(0, 0.0), 2000);
        assert_eq!(window.next_edge(0, 2000.0), 2000);
    }
}

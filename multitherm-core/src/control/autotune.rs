//! Relay-feedback autotune
//!
//! Replaces the PI output with a two-level relay around a trigger
//! temperature slightly above the starting reading. Once the process
//! oscillates, the amplitude and period of the oscillation give the
//! ultimate gain and period, from which new PI gains are derived:
//!
//! ```text
//! Ku = 4·d / (π·a)      d = relay step, a = peak-to-peak amplitude
//! Kp = 0.4·Ku
//! Ki = 0.48·Ku / Pu
//! ```
//!
//! The session never writes gains itself. It offers a result that the
//! operator may save, and it remembers the gains in force at start so a
//! cancel can restore them exactly.

use core::f32::consts::PI;

use super::pid::Gains;
use crate::Millis;

/// Session sample period (ms)
pub const AUTOTUNE_SAMPLE_MS: Millis = 1000;

/// Trigger temperature offset above the starting reading (°C)
pub const TRIGGER_OFFSET: f32 = 1.0;

/// Half-cycle count that completes the session
const COMPLETE_CYCLE: u8 = 4;

/// Extrema are tracked only after this many half-cycles
const TRACK_AFTER_CYCLE: u8 = 2;

/// Output below `baseline × RELAY_LOW_FRACTION` counts as the relay low level
const RELAY_LOW_FRACTION: f32 = 0.9;

/// Running minimum/maximum start values (°C)
const MIN_SENTINEL: f32 = 500.0;
const MAX_SENTINEL: f32 = 0.0;

/// Smallest usable peak-to-peak amplitude (°C)
const MIN_AMPLITUDE: f32 = 0.05;

/// Smallest usable ultimate period (s)
const MIN_PERIOD_S: f32 = 0.001;

const KP_FACTOR: f32 = 0.4;
const KI_FACTOR: f32 = 0.48;

/// Autotune state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AutotuneState {
    /// No session
    Idle,
    /// Relay high, waiting for the first crossing of the trigger
    WaitTrigger,
    /// Counting half-cycles (1..=3)
    Cycling(u8),
    /// Gains available, output held at baseline
    Done,
    /// Session ended without a result
    Failed(AutotuneError),
}

/// Autotune error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AutotuneError {
    /// Baseline output or relay amplitude leaves nothing to switch
    RelayStepTooSmall,
    /// Oscillation too small or too fast to measure
    NoOscillation,
    /// The loop faulted while tuning
    LoopFault,
}

/// Autotune result with calculated gains
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AutotuneResult {
    /// Calculated PI gains
    pub gains: Gains,
    /// Ultimate gain (Ku)
    pub ku: f32,
    /// Ultimate period (s)
    pub pu_s: f32,
    /// Peak-to-peak amplitude (°C)
    pub amplitude: f32,
}

/// One relay-feedback identification run on a single loop
#[derive(Debug, Clone)]
pub struct AutotuneSession {
    state: AutotuneState,
    previous_gains: Gains,
    baseline: f32,
    delta_out: f32,
    relay_high: f32,
    relay_low: f32,
    trigger: f32,
    output: f32,
    min: f32,
    max: f32,
    cycle: u8,
    time1: Millis,
    time2: Millis,
    last_sample: Option<Millis>,
    result: Option<AutotuneResult>,
}

impl AutotuneSession {
    /// Start a session
    ///
    /// # Arguments
    /// - `baseline`: output command in force when tuning starts
    /// - `measured`: current temperature, sets the trigger
    /// - `previous_gains`: gains restored on cancel
    /// - `delta_out`: relay amplitude as a fraction of the baseline
    /// - `window`: output upper limit
    pub fn start(
        baseline: f32,
        measured: f32,
        previous_gains: Gains,
        delta_out: f32,
        window: f32,
    ) -> Result<Self, AutotuneError> {
        if !baseline.is_finite() || baseline <= 0.0 || !measured.is_finite() {
            return Err(AutotuneError::RelayStepTooSmall);
        }

        let step = baseline * delta_out;
        let mut relay_high = baseline + step;
        let mut relay_low = baseline - step;
        if relay_high > window {
            relay_high = window;
            relay_low = 0.0;
        }
        relay_low = relay_low.max(0.0);

        // Half-cycles are counted on the drop below 90% of baseline
        if relay_high <= relay_low || relay_low >= baseline * RELAY_LOW_FRACTION {
            return Err(AutotuneError::RelayStepTooSmall);
        }

        Ok(Self {
            state: AutotuneState::WaitTrigger,
            previous_gains,
            baseline,
            delta_out,
            relay_high,
            relay_low,
            trigger: measured + TRIGGER_OFFSET,
            output: relay_high,
            min: MIN_SENTINEL,
            max: MAX_SENTINEL,
            cycle: 0,
            time1: 0,
            time2: 0,
            last_sample: None,
            result: None,
        })
    }

    pub fn state(&self) -> AutotuneState {
        self.state
    }

    /// Half-cycles seen so far
    pub fn cycle(&self) -> u8 {
        self.cycle
    }

    /// Output command the session currently drives
    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn baseline(&self) -> f32 {
        self.baseline
    }

    pub fn trigger(&self) -> f32 {
        self.trigger
    }

    /// Relay levels as `(high, low)`
    pub fn relay_levels(&self) -> (f32, f32) {
        (self.relay_high, self.relay_low)
    }

    /// Gains in force when the session started
    pub fn previous_gains(&self) -> Gains {
        self.previous_gains
    }

    pub fn result(&self) -> Option<&AutotuneResult> {
        self.result.as_ref()
    }

    /// Session still drives the relay
    pub fn is_running(&self) -> bool {
        matches!(
            self.state,
            AutotuneState::WaitTrigger | AutotuneState::Cycling(_)
        )
    }

    /// End the session without a result, holding the baseline output
    pub fn fail(&mut self, reason: AutotuneError) {
        self.state = AutotuneState::Failed(reason);
        self.output = self.baseline;
    }

    /// Feed a reading
    ///
    /// Processes at most one sample per [`AUTOTUNE_SAMPLE_MS`] and returns
    /// the output command to apply.
    pub fn update(&mut self, measured: f32, now: Millis) -> f32 {
        if !self.is_running() {
            return self.output;
        }
        if let Some(last) = self.last_sample {
            if now.saturating_sub(last) < AUTOTUNE_SAMPLE_MS {
                return self.output;
            }
        }
        self.last_sample = Some(now);

        if self.cycle > TRACK_AFTER_CYCLE {
            self.max = self.max.max(measured);
            self.min = self.min.min(measured);
        }

        let previous = self.output;
        if measured < self.trigger {
            self.output = self.relay_high;
        } else if measured > self.trigger {
            self.output = self.relay_low;
        }

        let low_threshold = self.baseline * RELAY_LOW_FRACTION;
        if previous >= low_threshold && self.output < low_threshold {
            self.cycle += 1;
            match self.cycle {
                3 => self.time1 = now,
                COMPLETE_CYCLE => {
                    self.time2 = now;
                    self.complete();
                    return self.output;
                }
                _ => {}
            }
        }

        self.state = if self.cycle == 0 {
            AutotuneState::WaitTrigger
        } else {
            AutotuneState::Cycling(self.cycle)
        };
        self.output
    }

    fn complete(&mut self) {
        let amplitude = self.max - self.min;
        let pu_s = self.time1.abs_diff(self.time2) as f32 / 1000.0;

        if amplitude.is_nan() || amplitude < MIN_AMPLITUDE || pu_s < MIN_PERIOD_S {
            self.fail(AutotuneError::NoOscillation);
            return;
        }

        let relay_step = self.baseline * self.delta_out * 2.0;
        let ku = 4.0 * relay_step / (PI * amplitude);
        let gains = Gains::new(KP_FACTOR * ku, KI_FACTOR * ku / pu_s);

        if !ku.is_finite() || !gains.kp.is_finite() || !gains.ki.is_finite() {
            self.fail(AutotuneError::NoOscillation);
            return;
        }

        self.result = Some(AutotuneResult {
            gains,
            ku,
            pu_s,
            amplitude,
        });
        self.state = AutotuneState::Done;
        self.output = self.baseline;
    }
}

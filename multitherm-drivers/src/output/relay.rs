//! GPIO relay outputs
//!
//! Heater relays (SSR or mechanical) and the alert lamp/buzzer, each driven
//! by one GPIO pin. Pins can be active-high (default) or active-low.
//! Only pins whose writes cannot fail are accepted.

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;
use heapless::Vec;
use multitherm_core::config::MAX_LOOPS;
use multitherm_core::traits::ActuatorBus;

/// One relay on a GPIO pin
///
/// Only writes the pin when the logical level changes.
pub struct RelayOutput<P> {
    pin: P,
    /// If true, relay ON = pin LOW
    inverted: bool,
    /// Current logical state (true = relay on)
    on: bool,
}

impl<P: OutputPin<Error = Infallible>> RelayOutput<P> {
    /// Create a relay output, driven off immediately
    ///
    /// # Arguments
    /// - `pin`: The GPIO pin to control
    /// - `inverted`: If true, the relay is ON when the pin is LOW
    pub fn new(pin: P, inverted: bool) -> Self {
        let mut relay = Self {
            pin,
            inverted,
            on: false,
        };
        relay.write(false);
        relay
    }

    pub fn new_active_high(pin: P) -> Self {
        Self::new(pin, false)
    }

    pub fn new_active_low(pin: P) -> Self {
        Self::new(pin, true)
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Switch the relay, skipping the pin write when nothing changes
    pub fn set(&mut self, on: bool) {
        if on != self.on {
            self.write(on);
        }
    }

    fn write(&mut self, on: bool) {
        self.on = on;

        let result = if on != self.inverted {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match result {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }
}

/// Per-loop heater relays plus the shared alert output
pub struct RelayBank<P> {
    outputs: Vec<RelayOutput<P>, MAX_LOOPS>,
    alert: RelayOutput<P>,
}

impl<P: OutputPin<Error = Infallible>> RelayBank<P> {
    /// Create a bank from relay outputs in channel order
    ///
    /// Outputs beyond [`MAX_LOOPS`] are ignored.
    pub fn new<I>(outputs: I, alert: RelayOutput<P>) -> Self
    where
        I: IntoIterator<Item = RelayOutput<P>>,
    {
        Self {
            outputs: outputs.into_iter().take(MAX_LOOPS).collect(),
            alert,
        }
    }

    /// Logical state of a heater relay, `None` for unknown channels
    pub fn output(&self, channel: u8) -> Option<bool> {
        self.outputs.get(channel as usize).map(RelayOutput::is_on)
    }

    pub fn alert(&self) -> bool {
        self.alert.is_on()
    }

    /// Switch every relay off, alert included
    pub fn all_off(&mut self) {
        for output in self.outputs.iter_mut() {
            output.set(false);
        }
        self.alert.set(false);
    }
}

impl<P: OutputPin<Error = Infallible>> ActuatorBus for RelayBank<P> {
    fn set_output(&mut self, channel: u8, on: bool) {
        if let Some(output) = self.outputs.get_mut(channel as usize) {
            output.set(on);
        }
    }

    fn set_alert(&mut self, on: bool) {
        self.alert.set(on);
    }
}

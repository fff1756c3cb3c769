//! Named periodic deadlines
//!
//! A [`Cadence`] fires at most once per call to [`Cadence::fire`]. After
//! firing it re-arms one period after the instant it was serviced, so a late
//! pass delays later firings instead of bunching them up.

use crate::Millis;

/// One periodic activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cadence {
    period: Millis,
    next_due: Millis,
}

impl Cadence {
    /// Create a cadence whose first firing is at `first_due`
    pub const fn new(period: Millis, first_due: Millis) -> Self {
        Self {
            period,
            next_due: first_due,
        }
    }

    pub fn period(&self) -> Millis {
        self.period
    }

    pub fn next_due(&self) -> Millis {
        self.next_due
    }

    /// Fire if due, re-arming for `now + period`
    pub fn fire(&mut self, now: Millis) -> bool {
        if now >= self.next_due {
            self.next_due = now + self.period;
            true
        } else {
            false
        }
    }
}

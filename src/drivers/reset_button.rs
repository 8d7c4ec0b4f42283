//! Debounced factory-reset watchdog.
//!
//! ## Hardware
//!
//! Momentary switch on [`FACTORY_RESET_GPIO`](crate::pins::FACTORY_RESET_GPIO),
//! active-low with pull-up by default.  The pin is sampled, not
//! interrupt-driven: the scheduler calls [`ResetWatchdog::poll`] once per
//! reset-poll interval.
//!
//! ## State machine
//!
//! | State            | Active sample                          | Inactive sample |
//! |------------------|----------------------------------------|-----------------|
//! | `Idle`           | `Debouncing(1)` (or `Triggered` if K=1)| `Idle`          |
//! | `Debouncing(n)`  | `Debouncing(n+1)`, `Triggered` at n+1=K| `Idle`          |
//! | `Triggered`      | `Triggered`                            | `Triggered`     |
//!
//! Entering `Triggered` invokes the reset action exactly once.  The only
//! way out is a reboot, which the action normally causes itself.

use embedded_hal::digital::InputPin;
use log::{info, warn};

use crate::app::ports::ResetAction;
use crate::config::ActiveLevel;

/// Debounce state, observable for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetState {
    Idle,
    /// Consecutive active samples seen so far.
    Debouncing(u8),
    Triggered,
}

pub struct ResetWatchdog<P> {
    pin: P,
    active_level: ActiveLevel,
    threshold: u8,
    state: ResetState,
}

impl<P: InputPin> ResetWatchdog<P> {
    /// `threshold` is the number of consecutive active samples (K) that
    /// confirm a press.  Zero is treated as one; config validation rejects
    /// it before it gets here.
    pub fn new(pin: P, active_level: ActiveLevel, threshold: u8) -> Self {
        Self {
            pin,
            active_level,
            threshold: threshold.max(1),
            state: ResetState::Idle,
        }
    }

    pub fn state(&self) -> ResetState {
        self.state
    }

    /// Take one sample and advance the state machine.
    pub fn poll(&mut self, action: &mut impl ResetAction) -> ResetState {
        if self.state == ResetState::Triggered {
            return self.state;
        }

        let active = self.sample();
        self.state = match (self.state, active) {
            (_, false) => ResetState::Idle,
            (ResetState::Idle, true) => ResetState::Debouncing(1),
            (ResetState::Debouncing(n), true) => ResetState::Debouncing(n.saturating_add(1)),
            (ResetState::Triggered, true) => ResetState::Triggered,
        };

        if let ResetState::Debouncing(n) = self.state {
            if n >= self.threshold {
                info!("Reset: button held for {} samples, factory reset", n);
                self.state = ResetState::Triggered;
                action.factory_reset();
            }
        }

        self.state
    }

    fn sample(&mut self) -> bool {
        let level = match self.active_level {
            ActiveLevel::Low => self.pin.is_low(),
            ActiveLevel::High => self.pin.is_high(),
        };
        level.unwrap_or_else(|_| {
            warn!("Reset: pin read failed, sample counted as released");
            false
        })
    }
}

//! In-range indicator LED
//!
//! The LED lights when all four fields are inside their configured bounds at
//! once, and goes dark when any field leaves its range or after a fixed hold
//! time. While lit it does not re-arm, so a reading hovering on a threshold
//! cannot restart the hold timer.
//!
//! ```text
//!          all fields in range
//!   Off ─────────────────────────▶ On(activated_at)
//!    ▲                                  │
//!    └──── field out of range ──────────┤
//!    └──── now - activated_at >= hold ──┘
//! ```

use embedded_hal::digital::OutputPin;
use log::{info, warn};

use crate::ranges::RangeConfig;
use crate::reading::{CurrentReading, UptimeMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndicatorState {
    #[default]
    Off,
    On {
        activated_at: UptimeMs,
    },
}

impl IndicatorState {
    pub fn is_on(&self) -> bool {
        matches!(self, Self::On { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorTransition {
    /// Off → On, all fields in range
    Activated,
    /// On → Off, a field left its range
    LeftRange,
    /// On → Off, hold time elapsed
    TimedOut,
}

/// Drives the LED pin from the indicator state machine
pub struct Indicator<P: OutputPin> {
    pin: P,
    hold_ms: u64,
}

impl<P: OutputPin> Indicator<P> {
    pub fn new(pin: P, hold_ms: u64) -> Self {
        Self { pin, hold_ms }
    }

    pub fn hold_ms(&self) -> u64 {
        self.hold_ms
    }

    /// Step the state machine for the current reading.
    ///
    /// Does nothing while the reading is invalid. Range is checked before the
    /// timeout, so a reading that leaves range at the same instant the hold
    /// expires is reported as [`IndicatorTransition::LeftRange`].
    pub fn evaluate(
        &mut self,
        state: &mut IndicatorState,
        reading: &CurrentReading,
        ranges: &RangeConfig,
        now: UptimeMs,
    ) -> Option<IndicatorTransition> {
        if !reading.valid {
            return None;
        }

        match (*state, ranges.first_out_of_range(reading)) {
            (IndicatorState::Off, None) => {
                *state = IndicatorState::On { activated_at: now };
                self.set(true);
                info!(" All values in range, LED on for {} s", self.hold_ms / 1000);
                Some(IndicatorTransition::Activated)
            }
            (IndicatorState::On { .. }, Some(field)) => {
                *state = IndicatorState::Off;
                self.set(false);
                info!(" {} out of range, LED off", field);
                Some(IndicatorTransition::LeftRange)
            }
            _ => self.expire(state, now),
        }
    }

    /// Turn the LED off if the hold time has elapsed, regardless of range
    pub fn expire(
        &mut self,
        state: &mut IndicatorState,
        now: UptimeMs,
    ) -> Option<IndicatorTransition> {
        let IndicatorState::On { activated_at } = *state else {
            return None;
        };
        if now.saturating_sub(activated_at) < self.hold_ms {
            return None;
        }

        *state = IndicatorState::Off;
        self.set(false);
        info!(" LED off after {} s", self.hold_ms / 1000);
        Some(IndicatorTransition::TimedOut)
    }

    /// Force the pin to match `state`, used once at start-up
    pub fn sync_pin(&mut self, state: &IndicatorState) {
        self.set(state.is_on());
    }

    pub fn release(self) -> P {
        self.pin
    }

    fn set(&mut self, on: bool) {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(e) = result {
            warn!(" Failed to drive indicator pin: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    #[derive(Default)]
    struct Pin {
        high: bool,
        writes: usize,
    }

    impl embedded_hal::digital::ErrorType for Pin {
        type Error = Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.high = false;
            self.writes += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.high = true;
            self.writes += 1;
            Ok(())
        }
    }

    fn reading(temperature: f32) -> CurrentReading {
        CurrentReading {
            temperature,
            humidity: 50.0,
            lux: 100.0,
            soil_moisture: 50,
            last_update: 0,
            valid: true,
        }
    }

    fn ranges() -> RangeConfig {
        RangeConfig {
            temp_min: 0.0,
            temp_max: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_reading_is_ignored() {
        let mut indicator = Indicator::new(Pin::default(), 15_000);
        let mut state = IndicatorState::Off;
        let mut invalid = reading(5.0);
        invalid.valid = false;

        assert_eq!(indicator.evaluate(&mut state, &invalid, &ranges(), 0), None);
        assert_eq!(state, IndicatorState::Off);
    }

    #[test]
    fn test_no_double_activation() {
        let mut indicator = Indicator::new(Pin::default(), 15_000);
        let mut state = IndicatorState::Off;

        assert_eq!(
            indicator.evaluate(&mut state, &reading(5.0), &ranges(), 1_000),
            Some(IndicatorTransition::Activated)
        );
        assert_eq!(
            indicator.evaluate(&mut state, &reading(6.0), &ranges(), 2_000),
            None,
            "already on: no second activation"
        );
        assert_eq!(state, IndicatorState::On { activated_at: 1_000 });

        let pin = indicator.release();
        assert!(pin.high);
        assert_eq!(pin.writes, 1);
    }

    #[test]
    fn test_timeout_while_in_range() {
        let mut indicator = Indicator::new(Pin::default(), 15_000);
        let mut state = IndicatorState::On { activated_at: 1_000 };

        assert_eq!(indicator.evaluate(&mut state, &reading(5.0), &ranges(), 15_999), None);
        assert_eq!(
            indicator.evaluate(&mut state, &reading(5.0), &ranges(), 16_000),
            Some(IndicatorTransition::TimedOut)
        );
        assert!(!indicator.release().high);
    }

    #[test]
    fn test_out_of_range_while_off_is_quiet() {
        let mut indicator = Indicator::new(Pin::default(), 15_000);
        let mut state = IndicatorState::Off;
        assert_eq!(indicator.evaluate(&mut state, &reading(50.0), &ranges(), 0), None);
        assert_eq!(indicator.release().writes, 0);
    }
}

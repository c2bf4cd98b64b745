//! Local clock for state timestamps
//!
//! Every peer keeps a [`LocalClock`] advanced by real elapsed time. Owners
//! stamp outgoing states with it; remote peers stamp arrival times with it.
//!
//! The clock is an `f32` so it is periodically folded back to zero before it
//! loses precision. Each fold bumps a small wrapping epoch counter that is
//! carried on every state, so receivers can tell timestamps from different
//! epochs apart.

use serde::{Deserialize, Serialize};

/// Local time above which the clock folds back to zero (2^12 seconds)
pub const LOCAL_TIME_CEILING: f32 = 4096.0;

/// Number of distinct reset epochs before the indicator wraps
pub const RESET_INDICATOR_WRAP: u8 = 128;

/// Smallest time step the clock logic distinguishes
pub const MIN_TIME_PRECISION: f32 = 0.0001;

/// Monotonic local clock with periodic precision-preserving resets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct LocalClock {
    time: f32,
    reset_indicator: u8,
}

impl LocalClock {
    /// Create a clock at zero in epoch 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Current local time in seconds since the last reset
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Current reset epoch
    pub fn reset_indicator(&self) -> u8 {
        self.reset_indicator
    }

    /// Advance by `delta_time` seconds
    ///
    /// Returns `Some(origin)` when the clock crossed [`LOCAL_TIME_CEILING`]
    /// and was reset. `origin` is the time that was subtracted; every value
    /// on this clock's timeline must be rebased by it.
    pub fn advance(&mut self, delta_time: f32) -> Option<f32> {
        self.time += delta_time;
        if self.time > LOCAL_TIME_CEILING {
            let origin = self.time;
            self.time = 0.0;
            self.reset_indicator = (self.reset_indicator + 1) % RESET_INDICATOR_WRAP;
            tracing::debug!(
                origin,
                reset_indicator = self.reset_indicator,
                "Local clock reset"
            );
            Some(origin)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance() {
        let mut clock = LocalClock::new();
        assert_eq!(clock.advance(0.5), None);
        assert_eq!(clock.advance(0.25), None);
        assert_eq!(clock.time(), 0.75);
        assert_eq!(clock.reset_indicator(), 0);
    }

    #[test]
    fn test_reset_past_ceiling() {
        let mut clock = LocalClock::new();
        clock.advance(LOCAL_TIME_CEILING - 1.0);

        let origin = clock.advance(2.0).unwrap();
        assert_eq!(origin, LOCAL_TIME_CEILING + 1.0);
        assert_eq!(clock.time(), 0.0);
        assert_eq!(clock.reset_indicator(), 1);
    }

    #[test]
    fn test_reset_indicator_wraps() {
        let mut clock = LocalClock::new();
        for _ in 0..RESET_INDICATOR_WRAP {
            assert!(clock.advance(LOCAL_TIME_CEILING + 1.0).is_some());
        }
        assert_eq!(clock.reset_indicator(), 0);
    }
}

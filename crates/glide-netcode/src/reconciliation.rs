//! Remote clock reconciliation
//!
//! A remote peer never sees the owner's clock directly. It only sees owner
//! timestamps on states and the local time those states arrived. From those
//! it keeps an estimate of "what time is it on the owner right now",
//! expressed in local time units.
//!
//! Setting the estimate directly from every arrival makes rendered motion
//! jitter with network timing noise. Correcting only at a fixed rate never
//! catches up after a hitch. The reconciler does both: small errors are
//! absorbed at `time_correction_speed`, large ones snap.

use glide_core::time::MIN_TIME_PRECISION;
use glide_core::{LocalClock, SyncConfig, TimestampedState};

/// What [`ClockReconciler::reconcile_remote_time`] did this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeCorrection {
    /// No state to reconcile against, or the entity is at rest
    Skipped,
    /// The estimate was set to the candidate time
    Snapped,
    /// The estimate moved one correction step toward the candidate
    Nudged,
}

/// Local clock plus an estimate of the remote owner's clock
#[derive(Debug, Clone)]
pub struct ClockReconciler {
    clock: LocalClock,
    /// Estimated owner clock, advanced at the local rate between corrections
    approximate_remote_time: f32,
    /// Local time at which the estimate was last set directly
    last_time_set_at: f32,
    /// States received since the last authority change
    received_states: u32,
    send_rate: f32,
    time_correction_speed: f32,
    snap_time_threshold: f32,
}

impl ClockReconciler {
    /// Create a reconciler from a (validated) config
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            clock: LocalClock::new(),
            approximate_remote_time: 0.0,
            last_time_set_at: 0.0,
            received_states: 0,
            send_rate: config.send_rate,
            time_correction_speed: config.time_correction_speed,
            snap_time_threshold: config.snap_time_threshold,
        }
    }

    /// Current local time
    pub fn local_time(&self) -> f32 {
        self.clock.time()
    }

    /// Current local reset epoch
    pub fn reset_indicator(&self) -> u8 {
        self.clock.reset_indicator()
    }

    /// Current estimate of the owner's clock
    pub fn approximate_remote_time(&self) -> f32 {
        self.approximate_remote_time
    }

    /// Local time at which the estimate was last set directly
    pub fn last_time_set_at(&self) -> f32 {
        self.last_time_set_at
    }

    /// States received since creation or the last authority change
    pub fn received_states(&self) -> u32 {
        self.received_states
    }

    /// Advance the local clock and the remote estimate by `delta_time`
    ///
    /// Must run once per tick before resolution. Returns `Some(origin)` when
    /// the local clock reset; the caller rebases every local-time value by
    /// `origin` (see [`rebase_local`](Self::rebase_local)).
    pub fn advance_local_clock(&mut self, delta_time: f32) -> Option<f32> {
        self.approximate_remote_time += delta_time;
        self.clock.advance(delta_time)
    }

    /// Count an accepted state toward the warm-up period
    pub fn note_state_received(&mut self) {
        self.received_states = self.received_states.saturating_add(1);
    }

    /// Restart the warm-up period, e.g. after the owner changed
    pub fn reset_received_states(&mut self) {
        self.received_states = 0;
    }

    /// Move the remote-time estimate toward what `newest` implies
    pub fn reconcile_remote_time(
        &mut self,
        newest: Option<&TimestampedState>,
        delta_time: f32,
    ) -> TimeCorrection {
        let newest = match newest {
            Some(state) if !state.is_at_rest() => state,
            _ => return TimeCorrection::Skipped,
        };

        let local_time = self.clock.time();
        let candidate = newest.owner_timestamp + (local_time - newest.received_timestamp);
        let step = (self.time_correction_speed * delta_time).max(MIN_TIME_PRECISION);
        let error = (self.approximate_remote_time - candidate).abs();

        let warming_up = (self.received_states as f32) < self.send_rate;
        if warming_up || error < step || error > self.snap_time_threshold {
            if error > self.snap_time_threshold && !warming_up {
                tracing::debug!(
                    error,
                    estimate = self.approximate_remote_time,
                    candidate,
                    "Remote time estimate snapped"
                );
            }
            self.approximate_remote_time = candidate;
            self.last_time_set_at = local_time;
            TimeCorrection::Snapped
        } else {
            if self.approximate_remote_time > candidate {
                self.approximate_remote_time -= step;
            } else {
                self.approximate_remote_time += step;
            }
            TimeCorrection::Nudged
        }
    }

    /// Shift local-time values after a local clock reset
    pub fn rebase_local(&mut self, origin: f32) {
        self.last_time_set_at -= origin;
    }

    /// Shift the remote estimate after the owner's clock reset
    pub fn rebase_remote(&mut self, origin: f32) {
        self.approximate_remote_time -= origin;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glide_core::time::LOCAL_TIME_CEILING;
    use glide_core::Vec3;

    fn config(send_rate: f32) -> SyncConfig {
        SyncConfig {
            send_rate,
            ..SyncConfig::default()
        }
    }

    fn received(owner_timestamp: f32, received_at: f32) -> TimestampedState {
        let mut state = TimestampedState::at(owner_timestamp, Vec3::ZERO);
        state.received_timestamp = received_at;
        state
    }

    #[test]
    fn test_skips_without_state() {
        let mut reconciler = ClockReconciler::new(&config(30.0));
        assert_eq!(reconciler.reconcile_remote_time(None, 0.1), TimeCorrection::Skipped);
        assert_eq!(reconciler.approximate_remote_time(), 0.0);
    }

    #[test]
    fn test_skips_when_at_rest() {
        let mut reconciler = ClockReconciler::new(&config(30.0));
        let state = received(5.0, 0.0).with_rest(true, true);
        assert_eq!(
            reconciler.reconcile_remote_time(Some(&state), 0.1),
            TimeCorrection::Skipped
        );
        assert_eq!(reconciler.approximate_remote_time(), 0.0);

        // Only one rest flag is not enough to stop chasing the clock
        let state = received(5.0, 0.0).with_rest(true, false);
        assert_eq!(
            reconciler.reconcile_remote_time(Some(&state), 0.1),
            TimeCorrection::Snapped
        );
    }

    #[test]
    fn test_sets_directly_while_warming_up() {
        let mut reconciler = ClockReconciler::new(&config(30.0));
        reconciler.note_state_received();
        reconciler.advance_local_clock(0.5);

        let state = received(1.0, 0.25);
        assert_eq!(
            reconciler.reconcile_remote_time(Some(&state), 0.1),
            TimeCorrection::Snapped
        );
        // 1.0 + (0.5 - 0.25)
        assert_eq!(reconciler.approximate_remote_time(), 1.25);
        assert_eq!(reconciler.last_time_set_at(), 0.5);
    }

    #[test]
    fn test_nudges_toward_candidate_after_warm_up() {
        let mut reconciler = ClockReconciler::new(&config(1.0));
        reconciler.note_state_received();

        let state = received(1.0, 0.0);
        assert_eq!(
            reconciler.reconcile_remote_time(Some(&state), 0.1),
            TimeCorrection::Nudged
        );
        // step = 0.1 * 0.1
        assert!((reconciler.approximate_remote_time() - 0.01).abs() < 1e-6);

        // And downward when ahead
        let state = received(-1.0, 0.0);
        reconciler.reconcile_remote_time(Some(&state), 0.1);
        assert!(reconciler.approximate_remote_time().abs() < 1e-6);
    }

    #[test]
    fn test_sets_directly_when_within_one_step() {
        let mut reconciler = ClockReconciler::new(&config(1.0));
        reconciler.note_state_received();

        let state = received(0.005, 0.0);
        assert_eq!(
            reconciler.reconcile_remote_time(Some(&state), 0.1),
            TimeCorrection::Snapped
        );
        assert_eq!(reconciler.approximate_remote_time(), 0.005);
    }

    #[test]
    fn test_snaps_on_large_discontinuity() {
        let mut reconciler = ClockReconciler::new(&config(1.0));
        reconciler.note_state_received();

        let state = received(10.0, 0.0);
        assert_eq!(
            reconciler.reconcile_remote_time(Some(&state), 0.1),
            TimeCorrection::Snapped
        );
        assert_eq!(reconciler.approximate_remote_time(), 10.0);
    }

    #[test]
    fn test_minimum_correction_step() {
        let mut reconciler = ClockReconciler::new(&SyncConfig {
            send_rate: 1.0,
            time_correction_speed: 0.0,
            ..SyncConfig::default()
        });
        reconciler.note_state_received();

        let state = received(1.0, 0.0);
        reconciler.reconcile_remote_time(Some(&state), 0.1);
        assert!((reconciler.approximate_remote_time() - MIN_TIME_PRECISION).abs() < 1e-7);
    }

    #[test]
    fn test_estimate_advances_with_local_clock() {
        let mut reconciler = ClockReconciler::new(&config(30.0));
        reconciler.advance_local_clock(0.25);
        reconciler.advance_local_clock(0.25);
        assert_eq!(reconciler.local_time(), 0.5);
        assert_eq!(reconciler.approximate_remote_time(), 0.5);
    }

    #[test]
    fn test_local_reset_reports_origin() {
        let mut reconciler = ClockReconciler::new(&config(30.0));
        let origin = reconciler.advance_local_clock(LOCAL_TIME_CEILING + 1.0);
        assert_eq!(origin, Some(LOCAL_TIME_CEILING + 1.0));
        assert_eq!(reconciler.local_time(), 0.0);
        assert_eq!(reconciler.reset_indicator(), 1);

        reconciler.rebase_local(LOCAL_TIME_CEILING + 1.0);
        assert_eq!(reconciler.last_time_set_at(), -(LOCAL_TIME_CEILING + 1.0));
    }
}

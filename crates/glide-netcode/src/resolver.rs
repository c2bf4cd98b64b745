//! Remote-side transform resolution
//!
//! A [`TransformResolver`] owns everything one remote entity needs: the
//! history buffer, the clock reconciler and the interpolation and
//! extrapolation scratch. Each tick it picks a render time slightly in the
//! past, resolves a target transform for it and eases the entity toward it.
//!
//! Resolution phases, in order of precedence:
//!
//! | Phase            | When                                               |
//! |------------------|----------------------------------------------------|
//! | `Uninitialized`  | nothing received yet                               |
//! | `SingleSample`   | exactly one state buffered                         |
//! | `Interpolating`  | render time at or before the newest state          |
//! | `HoldAtRest`     | render time past a newest state flagged at rest    |
//! | `Extrapolating`  | render time past the newest state, limits not hit  |
//! | `Frozen(reason)` | extrapolation refused; the entity is left alone    |

use crate::error::Result;
use crate::extrapolation::{Extrapolator, FreezeReason};
use crate::interpolation::Interpolator;
use crate::reconciliation::{ClockReconciler, TimeCorrection};
use glide_core::{
    ApplyMode, ChannelFlags, Movable, Pose, PositionUpdate, SyncConfig, TimestampedState,
    TransformUpdate,
};
use glide_history_buffer::{InsertOutcome, StateHistoryBuffer};

/// How the target transform was produced this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePhase {
    Uninitialized,
    SingleSample,
    Interpolating,
    HoldAtRest,
    Extrapolating,
    Frozen(FreezeReason),
}

impl ResolvePhase {
    /// True if this phase produces a transform to apply
    pub fn has_target(&self) -> bool {
        !matches!(self, ResolvePhase::Uninitialized | ResolvePhase::Frozen(_))
    }
}

/// One tick's resolution result
///
/// `state` is `None` when the phase leaves the entity untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTarget {
    pub phase: ResolvePhase,
    pub state: Option<TimestampedState>,
    /// Channels that jump instead of easing
    pub snap: ChannelFlags,
}

impl ResolvedTarget {
    fn untouched(phase: ResolvePhase) -> Self {
        Self {
            phase,
            state: None,
            snap: ChannelFlags::NONE,
        }
    }
}

/// Which clock a rebase origin belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeline {
    /// This peer's clock reset
    Local,
    /// The owner's clock reset
    Remote,
}

/// Resolves and applies the transform of one remotely owned entity
#[derive(Debug)]
pub struct TransformResolver {
    config: SyncConfig,
    buffer: StateHistoryBuffer,
    clock: ClockReconciler,
    interpolator: Interpolator,
    extrapolator: Extrapolator,
    /// Local time of the last ownership change
    authority_changed_at: Option<f32>,
    phase: ResolvePhase,
}

impl TransformResolver {
    /// Create a resolver, validating `config`
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            buffer: StateHistoryBuffer::for_config(&config),
            clock: ClockReconciler::new(&config),
            interpolator: Interpolator::new(),
            extrapolator: Extrapolator::new(),
            authority_changed_at: None,
            phase: ResolvePhase::Uninitialized,
            config,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn buffer(&self) -> &StateHistoryBuffer {
        &self.buffer
    }

    pub fn clock(&self) -> &ClockReconciler {
        &self.clock
    }

    /// Phase of the most recent resolution
    pub fn phase(&self) -> ResolvePhase {
        self.phase
    }

    /// Render time: the remote-time estimate minus the interpolation delay
    pub fn target_time(&self) -> f32 {
        self.clock.approximate_remote_time() - self.config.interpolation_back_time
    }

    /// Buffer a state received from the owner
    ///
    /// A state from a new owner clock epoch rebases the remote timeline
    /// first, so ordering holds across the owner's clock reset.
    pub fn receive_state(&mut self, state: TimestampedState) -> InsertOutcome {
        if let Some(origin) = self.buffer.epoch_change_origin(&state) {
            self.rebase_epoch(origin, Timeline::Remote);
        }

        let outcome = self.buffer.insert(state, self.clock.local_time());
        if let InsertOutcome::Inserted { .. } = outcome {
            self.clock.note_state_received();
        }
        outcome
    }

    /// Advance the local clock, rebasing local timestamps if it reset
    pub fn advance_clock(&mut self, delta_time: f32) -> Option<f32> {
        let origin = self.clock.advance_local_clock(delta_time)?;
        self.rebase_epoch(origin, Timeline::Local);
        Some(origin)
    }

    /// Correct the remote-time estimate against the newest state
    pub fn reconcile(&mut self, delta_time: f32) -> TimeCorrection {
        self.clock.reconcile_remote_time(self.buffer.newest(), delta_time)
    }

    /// Resolve the target transform for the current render time
    pub fn resolve(&mut self, delta_time: f32) -> ResolvedTarget {
        self.resolve_at(self.target_time(), delta_time)
    }

    /// Resolve the target transform for an explicit render time
    pub fn resolve_at(&mut self, target_time: f32, delta_time: f32) -> ResolvedTarget {
        let resolved = self.resolve_phase(target_time, delta_time);
        match resolved.phase {
            ResolvePhase::Frozen(reason) => {
                if resolved.phase != self.phase {
                    tracing::debug!(?reason, target_time, "Extrapolation refused");
                }
            }
            ResolvePhase::Extrapolating => {}
            _ => self.extrapolator.deactivate(),
        }
        self.phase = resolved.phase;
        resolved
    }

    fn resolve_phase(&mut self, target_time: f32, delta_time: f32) -> ResolvedTarget {
        let newest = match self.buffer.newest() {
            Some(newest) => *newest,
            None => return ResolvedTarget::untouched(ResolvePhase::Uninitialized),
        };

        if self.buffer.len() == 1 {
            return ResolvedTarget {
                phase: ResolvePhase::SingleSample,
                state: Some(newest),
                snap: ChannelFlags::ALL,
            };
        }

        if target_time <= newest.owner_timestamp {
            return match self.interpolator.interpolate(
                &self.buffer,
                target_time,
                &self.config.snap_threshold,
            ) {
                Some(interpolation) => ResolvedTarget {
                    phase: ResolvePhase::Interpolating,
                    state: Some(interpolation.state),
                    snap: interpolation.snap,
                },
                None => ResolvedTarget::untouched(ResolvePhase::Uninitialized),
            };
        }

        if newest.is_at_rest() {
            return ResolvedTarget {
                phase: ResolvePhase::HoldAtRest,
                state: Some(newest),
                snap: ChannelFlags::NONE,
            };
        }

        if self.within_authority_window() {
            self.extrapolator.deactivate();
            return ResolvedTarget::untouched(ResolvePhase::Frozen(FreezeReason::AuthorityChange));
        }

        let previous = self.buffer.get(1).copied();
        match self.extrapolator.extrapolate(
            &newest,
            previous.as_ref(),
            target_time,
            delta_time,
            &self.config.extrapolation,
            self.config.body.as_ref(),
        ) {
            Ok(state) => ResolvedTarget {
                phase: ResolvePhase::Extrapolating,
                state: Some(*state),
                snap: ChannelFlags::NONE,
            },
            Err(reason) => ResolvedTarget::untouched(ResolvePhase::Frozen(reason)),
        }
    }

    fn within_authority_window(&self) -> bool {
        self.authority_changed_at.is_some_and(|changed_at| {
            self.clock.local_time() - changed_at < self.config.interpolation_back_time
        })
    }

    /// Compute the update that moves `current` toward `target`
    ///
    /// Snapped channels jump; others ease by the channel's lerp speed and are
    /// skipped when already within the receive threshold.
    pub fn transform_update(
        &self,
        target: &ResolvedTarget,
        current: &Pose,
        delta_time: f32,
    ) -> TransformUpdate {
        let state = match &target.state {
            Some(state) => state,
            None => return TransformUpdate::default(),
        };
        let speeds = &self.config.lerp_speed;
        let thresholds = &self.config.receive_threshold;
        let mut update = TransformUpdate {
            teleported: target.snap,
            ..TransformUpdate::default()
        };

        if target.snap.position {
            update.position = Some(PositionUpdate::Set(state.position));
        } else if !within(thresholds.position, current.position.distance(state.position)) {
            let eased = current.position.lerp(state.position, speeds.position);
            update.position = Some(match self.config.apply_mode {
                ApplyMode::DriveVelocity if delta_time > 0.0 => {
                    PositionUpdate::DriveVelocity((eased - current.position) / delta_time)
                }
                _ => PositionUpdate::Set(eased),
            });
        }

        if target.snap.rotation {
            update.rotation = Some(state.rotation);
        } else if !within(
            thresholds.rotation,
            current.rotation.angle_between(state.rotation).to_degrees(),
        ) {
            update.rotation = Some(current.rotation.slerp(state.rotation, speeds.rotation));
        }

        if target.snap.scale {
            update.scale = Some(state.scale);
        } else if !within(thresholds.scale, current.scale.distance(state.scale)) {
            update.scale = Some(current.scale.lerp(state.scale, speeds.scale));
        }

        update
    }

    /// Apply a resolved target to `movable`
    pub fn apply<M: Movable + ?Sized>(
        &self,
        target: &ResolvedTarget,
        movable: &mut M,
        delta_time: f32,
    ) {
        if target.state.is_none() {
            return;
        }
        let current = movable.sample().pose;
        let update = self.transform_update(target, &current, delta_time);
        if !update.is_empty() {
            movable.apply_resolved_transform(update);
        }
    }

    /// Run one remote tick: advance, reconcile, resolve and apply
    pub fn tick<M: Movable + ?Sized>(&mut self, delta_time: f32, movable: &mut M) -> ResolvePhase {
        self.advance_clock(delta_time);
        self.reconcile(delta_time);
        let target = self.resolve(delta_time);
        self.apply(&target, movable, delta_time);
        target.phase
    }

    /// Shift every timestamp on `timeline` back by `origin`
    pub fn rebase_epoch(&mut self, origin: f32, timeline: Timeline) {
        match timeline {
            Timeline::Local => {
                self.buffer.rebase_received_timestamps(origin);
                self.clock.rebase_local(origin);
                if let Some(changed_at) = self.authority_changed_at.as_mut() {
                    *changed_at -= origin;
                }
            }
            Timeline::Remote => {
                self.buffer.rebase_owner_timestamps(origin);
                self.clock.rebase_remote(origin);
                self.extrapolator.rebase_owner_timestamp(origin);
            }
        }
        tracing::debug!(?timeline, origin, "Rebased timestamps");
    }

    /// Forget the previous owner's history
    ///
    /// Extrapolation stays suppressed for one interpolation window so the
    /// entity does not fly off along the old owner's last velocity.
    pub fn on_authority_changed(&mut self) {
        self.buffer.reset();
        self.clock.reset_received_states();
        self.interpolator.reset();
        self.extrapolator.deactivate();
        self.authority_changed_at = Some(self.clock.local_time());
        self.phase = ResolvePhase::Uninitialized;
    }

    /// Drop all received history
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.clock.reset_received_states();
        self.interpolator.reset();
        self.extrapolator.deactivate();
        self.phase = ResolvePhase::Uninitialized;
    }
}

fn within(threshold: Option<f32>, difference: f32) -> bool {
    threshold.is_some_and(|limit| difference < limit)
}

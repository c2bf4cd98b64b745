//! Extrapolation past the newest received state
//!
//! When the render time runs past the newest state (the owner stopped
//! sending, or packets are late) a moving entity keeps moving along its last
//! known velocity until a limit is hit.

use glide_core::{BodyConfig, ExtrapolationConfig, Quat, TimestampedState, Vec3};
use std::f32::consts::{PI, TAU};

/// Speed below which a channel counts as stationary
const REST_SPEED: f32 = 0.01;

/// Why a remote entity was left where it was this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeReason {
    /// Extrapolation mode is `None`
    ExtrapolationDisabled,
    /// Cumulative extrapolated time would exceed the time limit
    TimeLimit,
    /// Neither linear nor angular speed is meaningful
    AtRest,
    /// The projected position is too far from the newest known one
    DistanceLimit,
    /// Ownership changed recently and the smoothing window is still open
    AuthorityChange,
}

/// Projects the newest state forward in time
///
/// Owns a scratch state that is advanced in place across consecutive
/// extrapolating ticks and reseeded whenever newer data arrives.
#[derive(Debug, Default)]
pub struct Extrapolator {
    scratch: TimestampedState,
    /// Extrapolation ran on the previous tick
    active: bool,
    /// The next step is the first since seeding
    fresh: bool,
    time_spent: f32,
}

impl Extrapolator {
    /// Create an idle extrapolator
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether extrapolation ran on the previous tick
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Seconds extrapolated since the last reseed
    pub fn time_spent(&self) -> f32 {
        self.time_spent
    }

    /// The current extrapolated state
    pub fn state(&self) -> &TimestampedState {
        &self.scratch
    }

    /// Mark that some other resolver phase ran this tick
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Shift the scratch state after the owner's clock reset
    pub fn rebase_owner_timestamp(&mut self, origin: f32) {
        self.scratch.owner_timestamp -= origin;
    }

    /// Advance the scratch state to `target_time`
    ///
    /// `newest` and `previous` are the two newest buffered states. The first
    /// step after seeding covers `target_time - newest.owner_timestamp`;
    /// later steps cover `delta_time`.
    pub fn extrapolate(
        &mut self,
        newest: &TimestampedState,
        previous: Option<&TimestampedState>,
        target_time: f32,
        delta_time: f32,
        config: &ExtrapolationConfig,
        body: Option<&BodyConfig>,
    ) -> Result<&TimestampedState, FreezeReason> {
        if !self.active || self.scratch.owner_timestamp < newest.owner_timestamp {
            self.seed(newest, previous);
        }
        self.active = true;

        if !config.is_enabled() {
            return Err(FreezeReason::ExtrapolationDisabled);
        }

        let step = if self.fresh {
            target_time - self.scratch.owner_timestamp
        } else {
            delta_time
        };

        if let Some(limit) = config.effective_time_limit() {
            if self.time_spent + step > limit {
                return Err(FreezeReason::TimeLimit);
            }
        }

        let moving = self.scratch.velocity.length_squared() >= REST_SPEED * REST_SPEED;
        let rotating = self.scratch.angular_velocity.length_squared() >= REST_SPEED * REST_SPEED;
        if !moving && !rotating {
            return Err(FreezeReason::AtRest);
        }

        let distance_limit = config.effective_distance_limit();
        if let Some(limit) = distance_limit {
            if self.scratch.position.distance(newest.position) >= limit {
                return Err(FreezeReason::DistanceLimit);
            }
        }

        self.fresh = false;
        self.time_spent += step;

        if moving {
            self.scratch.position += self.scratch.velocity * step;
            if let Some(body) = body {
                if body.use_gravity && self.scratch.velocity.y.abs() >= REST_SPEED {
                    self.scratch.velocity += body.gravity * step;
                }
                self.scratch.velocity *= drag_factor(body.drag, step);
            }
        }

        if rotating {
            let speed = self.scratch.angular_velocity.length();
            let axis = self.scratch.angular_velocity / speed;
            self.scratch.rotation =
                (Quat::from_axis_angle(axis, speed * step) * self.scratch.rotation).normalize();
            if let Some(body) = body {
                self.scratch.angular_velocity *= drag_factor(body.angular_drag, step);
            }
        }

        if let Some(limit) = distance_limit {
            if moving && self.scratch.position.distance(newest.position) >= limit {
                return Err(FreezeReason::DistanceLimit);
            }
        }

        Ok(&self.scratch)
    }

    /// Restart from `newest`, deriving velocities from the two newest states
    fn seed(&mut self, newest: &TimestampedState, previous: Option<&TimestampedState>) {
        self.scratch = *newest;
        self.scratch.teleport = false;
        self.time_spent = 0.0;
        self.fresh = true;

        if newest.at_positional_rest {
            self.scratch.velocity = Vec3::ZERO;
        }
        if newest.at_rotational_rest {
            self.scratch.angular_velocity = Vec3::ZERO;
        }

        // Differencing across a teleport is meaningless
        let previous = match previous {
            Some(previous) if !newest.teleport => previous,
            _ => return,
        };
        let span = newest.owner_timestamp - previous.owner_timestamp;
        if span <= 0.0 {
            return;
        }

        if !newest.at_positional_rest {
            self.scratch.velocity = (newest.position - previous.position) / span;
        }
        if !newest.at_rotational_rest {
            self.scratch.angular_velocity =
                angular_velocity_between(previous.rotation, newest.rotation, span);
        }
    }
}

/// Angular velocity (axis scaled by radians per second) turning `from` into
/// `to` over `span` seconds along the shortest arc
fn angular_velocity_between(from: Quat, to: Quat, span: f32) -> Vec3 {
    let (axis, mut angle) = (to * from.inverse()).normalize().to_axis_angle();
    if angle > PI {
        angle -= TAU;
    }
    if angle.abs() < f32::EPSILON {
        return Vec3::ZERO;
    }
    axis * (angle / span)
}

fn drag_factor(drag: f32, step: f32) -> f32 {
    (1.0 - drag * step).max(0.0)
}

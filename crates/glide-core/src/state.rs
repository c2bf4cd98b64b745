//! Timestamped transform snapshots
//!
//! A [`TimestampedState`] is what an owning peer captures every network tick
//! and what a remote peer buffers, interpolates and extrapolates. States are
//! plain `Copy` values: every buffer holds its own copy and nothing is shared
//! by reference between the owner and remote sides.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position, rotation and scale of an entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Pose {
    /// Origin, no rotation, unit scale
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Create a new pose
    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Create a pose at `position` with no rotation and unit scale
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A pose together with the motion the entity reports for itself
///
/// Velocities are `None` when the entity has no physical body to read them
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Motion {
    pub pose: Pose,
    pub velocity: Option<Vec3>,
    /// Axis scaled by angular speed in radians per second
    pub angular_velocity: Option<Vec3>,
}

impl Motion {
    /// A motion with no velocity information
    pub fn at_pose(pose: Pose) -> Self {
        Self {
            pose,
            velocity: None,
            angular_velocity: None,
        }
    }
}

/// Snapshot of an entity's transform tagged with the sender's clock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimestampedState {
    /// Sender-local clock value at capture
    pub owner_timestamp: f32,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub velocity: Vec3,
    /// Axis scaled by angular speed in radians per second
    pub angular_velocity: Vec3,
    /// Sender asserts the position is not changing
    pub at_positional_rest: bool,
    /// Sender asserts the rotation is not changing
    pub at_rotational_rest: bool,
    /// Discontinuity: never eased into
    pub teleport: bool,
    /// Consumer-local clock value at insertion, stamped by the history buffer
    #[serde(skip)]
    pub received_timestamp: f32,
    /// Epoch of the sender's local clock (wraps at 128)
    pub local_time_reset_indicator: u8,
    /// Monotonic identifier stamped by the history buffer on insertion
    #[serde(skip)]
    pub sequence: u64,
}

impl TimestampedState {
    /// Create a state at `owner_timestamp` holding `pose`, with zero velocity
    pub fn new(owner_timestamp: f32, pose: Pose) -> Self {
        Self {
            owner_timestamp,
            position: pose.position,
            rotation: pose.rotation,
            scale: pose.scale,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            at_positional_rest: false,
            at_rotational_rest: false,
            teleport: false,
            received_timestamp: 0.0,
            local_time_reset_indicator: 0,
            sequence: 0,
        }
    }

    /// Create a state at `owner_timestamp` positioned at `position`
    pub fn at(owner_timestamp: f32, position: Vec3) -> Self {
        Self::new(owner_timestamp, Pose::from_position(position))
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: Vec3) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    /// Set both rest flags
    pub fn with_rest(mut self, positional: bool, rotational: bool) -> Self {
        self.at_positional_rest = positional;
        self.at_rotational_rest = rotational;
        self
    }

    pub fn with_teleport(mut self, teleport: bool) -> Self {
        self.teleport = teleport;
        self
    }

    pub fn with_reset_indicator(mut self, indicator: u8) -> Self {
        self.local_time_reset_indicator = indicator;
        self
    }

    /// The transform part of this state
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation, self.scale)
    }

    /// True when the sender flagged both position and rotation at rest
    pub fn is_at_rest(&self) -> bool {
        self.at_positional_rest && self.at_rotational_rest
    }

    /// Blend from `self` toward `end` by `t`
    ///
    /// Position, scale and both velocities are linearly interpolated, rotation
    /// is spherically interpolated, all with the same factor. Flags and the
    /// bookkeeping fields are taken from `end`.
    pub fn lerp(&self, end: &Self, t: f32) -> Self {
        Self {
            owner_timestamp: self.owner_timestamp
                + (end.owner_timestamp - self.owner_timestamp) * t,
            position: self.position.lerp(end.position, t),
            rotation: self.rotation.slerp(end.rotation, t),
            scale: self.scale.lerp(end.scale, t),
            velocity: self.velocity.lerp(end.velocity, t),
            angular_velocity: self.angular_velocity.lerp(end.angular_velocity, t),
            ..*end
        }
    }
}

impl Default for TimestampedState {
    fn default() -> Self {
        Self::new(0.0, Pose::IDENTITY)
    }
}

//! The capability an entity exposes to the sync layer
//!
//! The sync layer never needs to know whether an entity is a player, a
//! projectile or a prop. It only reads the current motion on the owner side
//! and writes resolved transforms on the remote side.

use crate::state::{Motion, Pose};
use glam::{Quat, Vec3};

/// Per-channel boolean flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelFlags {
    pub position: bool,
    pub rotation: bool,
    pub scale: bool,
}

impl ChannelFlags {
    pub const NONE: Self = Self {
        position: false,
        rotation: false,
        scale: false,
    };

    pub const ALL: Self = Self {
        position: true,
        rotation: true,
        scale: true,
    };

    /// True if any channel is set
    pub fn any(&self) -> bool {
        self.position || self.rotation || self.scale
    }
}

/// How the position channel is updated
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionUpdate {
    /// Place the entity at this position
    Set(Vec3),
    /// Give the entity's body this linear velocity
    DriveVelocity(Vec3),
}

/// Changes the remote side applies to an entity in one tick
///
/// A `None` channel is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransformUpdate {
    pub position: Option<PositionUpdate>,
    pub rotation: Option<Quat>,
    pub scale: Option<Vec3>,
    /// Channels that jumped this tick rather than easing; engines should
    /// move these without sweeping or carrying velocity across the jump
    pub teleported: ChannelFlags,
}

impl TransformUpdate {
    /// True if the update changes nothing
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.rotation.is_none() && self.scale.is_none()
    }
}

/// An entity whose transform is synchronized
pub trait Movable {
    /// Current pose and, if known, velocities
    fn sample(&self) -> Motion;

    /// Apply a resolved transform update
    fn apply_resolved_transform(&mut self, update: TransformUpdate);
}

/// A bare pose is a movable with no physical body
///
/// Velocity drives are ignored.
impl Movable for Pose {
    fn sample(&self) -> Motion {
        Motion::at_pose(*self)
    }

    fn apply_resolved_transform(&mut self, update: TransformUpdate) {
        if let Some(PositionUpdate::Set(position)) = update.position {
            self.position = position;
        }
        if let Some(rotation) = update.rotation {
            self.rotation = rotation;
        }
        if let Some(scale) = update.scale {
            self.scale = scale;
        }
    }
}

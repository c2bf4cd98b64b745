//! Glide Core - Types shared by every part of the transform sync pipeline
//!
//! This crate provides:
//! - `TimestampedState` - A transform snapshot tagged with the sender's clock
//! - `Pose` and `Motion` - What an entity looks like and how it moves
//! - `LocalClock` - Per-peer monotonic clock with precision-preserving resets
//! - `SyncConfig` - Every tunable, loadable from RON
//! - `Movable` - The capability an entity exposes to the sync layer
//!
//! The history buffer lives in `glide-history-buffer`; clock reconciliation,
//! interpolation, extrapolation and sending live in `glide-netcode`.

pub mod config;
mod error;
mod identity;
mod movable;
mod state;
pub mod time;

pub use config::{
    ApplyMode, BodyConfig, ChannelThresholds, ExtrapolationConfig, ExtrapolationMode, LerpSpeeds,
    SendConfig, SyncConfig,
};
pub use error::{Error, Result};
pub use identity::EntityId;
pub use movable::{ChannelFlags, Movable, PositionUpdate, TransformUpdate};
pub use state::{Motion, Pose, TimestampedState};
pub use time::LocalClock;

// Re-export math types so downstream crates agree on versions
pub use glam::{Quat, Vec3};

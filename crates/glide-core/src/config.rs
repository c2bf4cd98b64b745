//! Sync configuration
//!
//! [`SyncConfig`] holds every tunable of the owner and remote sides. All
//! fields have defaults, so a RON document only needs to name what it
//! changes:
//!
//! ```
//! use glide_core::{ExtrapolationMode, SyncConfig};
//!
//! let config = SyncConfig::from_ron_str(
//!     "(send_rate: 20.0, extrapolation: (mode: Unlimited))",
//! )
//! .unwrap();
//! assert_eq!(config.send_rate, 20.0);
//! assert_eq!(config.extrapolation.mode, ExtrapolationMode::Unlimited);
//! assert_eq!(config.interpolation_back_time, 0.1);
//! ```
//!
//! Constructors that accept a config call [`SyncConfig::validate`], so bad
//! values are rejected up front rather than at resolve time.

use crate::{Error, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Most states a single interpolation window may span
///
/// Bounds `send_rate * interpolation_back_time`, which sizes every remote
/// history buffer.
pub const MAX_INTERPOLATION_WINDOW: f32 = 1024.0;

/// How far past the newest state a remote entity may be projected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExtrapolationMode {
    /// Never extrapolate; hold the last resolved transform
    None,
    /// Extrapolate within the configured time and distance limits
    #[default]
    Limited,
    /// Extrapolate without limits
    Unlimited,
}

/// Extrapolation policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtrapolationConfig {
    pub mode: ExtrapolationMode,
    /// Maximum cumulative extrapolated seconds (Limited mode only)
    pub time_limit: Option<f32>,
    /// Maximum distance from the newest known position (Limited mode only)
    pub distance_limit: Option<f32>,
}

impl ExtrapolationConfig {
    /// Whether extrapolation may run at all
    pub fn is_enabled(&self) -> bool {
        self.mode != ExtrapolationMode::None
    }

    /// Time limit in effect for the current mode
    pub fn effective_time_limit(&self) -> Option<f32> {
        match self.mode {
            ExtrapolationMode::Limited => self.time_limit,
            _ => None,
        }
    }

    /// Distance limit in effect for the current mode
    pub fn effective_distance_limit(&self) -> Option<f32> {
        match self.mode {
            ExtrapolationMode::Limited => self.distance_limit,
            _ => None,
        }
    }
}

impl Default for ExtrapolationConfig {
    fn default() -> Self {
        Self {
            mode: ExtrapolationMode::Limited,
            time_limit: Some(5.0),
            distance_limit: None,
        }
    }
}

/// Per-channel easing factors applied each tick, in `(0, 1]`
///
/// `1.0` assigns the resolved value directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LerpSpeeds {
    pub position: f32,
    pub rotation: f32,
    pub scale: f32,
}

impl Default for LerpSpeeds {
    fn default() -> Self {
        Self {
            position: 0.85,
            rotation: 0.85,
            scale: 0.85,
        }
    }
}

/// Optional per-channel thresholds
///
/// Position and scale are distances, rotation is in degrees. `None` disables
/// the threshold for that channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChannelThresholds {
    pub position: Option<f32>,
    pub rotation: Option<f32>,
    pub scale: Option<f32>,
}

impl ChannelThresholds {
    fn validate(&self, field: &'static str) -> Result<()> {
        for value in [self.position, self.rotation, self.scale].into_iter().flatten() {
            check_non_negative(field, value)?;
        }
        Ok(())
    }
}

/// Owner-side sending policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendConfig {
    /// Minimum position change before a new state is sent
    pub position_threshold: Option<f32>,
    /// Minimum rotation change in degrees before a new state is sent
    pub rotation_threshold: Option<f32>,
    /// Minimum scale change before a new state is sent
    pub scale_threshold: Option<f32>,
    /// Consecutive unchanged network ticks before a channel is flagged at rest
    pub rest_threshold_count: u32,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            position_threshold: None,
            rotation_threshold: None,
            scale_threshold: None,
            rest_threshold_count: 3,
        }
    }
}

/// Physical body approximation used while extrapolating
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyConfig {
    pub use_gravity: bool,
    pub gravity: Vec3,
    /// Linear drag per second
    pub drag: f32,
    /// Angular drag per second
    pub angular_drag: f32,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            use_gravity: true,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            drag: 0.0,
            angular_drag: 0.05,
        }
    }
}

/// How a resolved position reaches the rendered entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ApplyMode {
    /// Ease the position directly
    #[default]
    SetTransform,
    /// Set the body's linear velocity toward the resolved position and let
    /// the physics engine integrate it
    DriveVelocity,
}

/// Configuration shared by the owner and remote sides of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// States sent per second by the owner
    pub send_rate: f32,
    /// Visual delay in seconds; remote entities render this far in the past
    pub interpolation_back_time: f32,
    pub extrapolation: ExtrapolationConfig,
    pub lerp_speed: LerpSpeeds,
    /// Jump straight to the newer state when two bracketing states differ by
    /// more than this
    pub snap_threshold: ChannelThresholds,
    /// Leave a channel untouched when the resolved value is closer than this
    /// to the rendered one
    pub receive_threshold: ChannelThresholds,
    pub send: SendConfig,
    /// Seconds of remote-clock correction applied per second
    pub time_correction_speed: f32,
    /// Remote-clock error in seconds above which the estimate snaps
    pub snap_time_threshold: f32,
    pub body: Option<BodyConfig>,
    pub apply_mode: ApplyMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            send_rate: 30.0,
            interpolation_back_time: 0.1,
            extrapolation: ExtrapolationConfig::default(),
            lerp_speed: LerpSpeeds::default(),
            snap_threshold: ChannelThresholds::default(),
            receive_threshold: ChannelThresholds::default(),
            send: SendConfig::default(),
            time_correction_speed: 0.1,
            snap_time_threshold: 3.0,
            body: None,
            apply_mode: ApplyMode::SetTransform,
        }
    }
}

impl SyncConfig {
    /// Parse a config from a RON document and validate it
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: SyncConfig = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a RON file and validate it
    pub fn from_ron_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)?;
        let config = Self::from_ron_str(&source)?;
        tracing::debug!(path = %path.display(), "Loaded sync config");
        Ok(config)
    }

    /// Check every value is within its accepted range
    pub fn validate(&self) -> Result<()> {
        if !self.send_rate.is_finite() || self.send_rate <= 0.0 {
            return Err(Error::invalid_config(
                "send_rate",
                format!("must be positive, got {}", self.send_rate),
            ));
        }
        check_non_negative("interpolation_back_time", self.interpolation_back_time)?;
        let window = self.send_rate * self.interpolation_back_time;
        if window > MAX_INTERPOLATION_WINDOW {
            return Err(Error::invalid_config(
                "send_rate",
                format!(
                    "send_rate * interpolation_back_time must be at most {}, got {}",
                    MAX_INTERPOLATION_WINDOW, window
                ),
            ));
        }

        if let Some(limit) = self.extrapolation.time_limit {
            check_non_negative("extrapolation.time_limit", limit)?;
        }
        if let Some(limit) = self.extrapolation.distance_limit {
            check_non_negative("extrapolation.distance_limit", limit)?;
        }

        for (field, speed) in [
            ("lerp_speed.position", self.lerp_speed.position),
            ("lerp_speed.rotation", self.lerp_speed.rotation),
            ("lerp_speed.scale", self.lerp_speed.scale),
        ] {
            if !(speed > 0.0 && speed <= 1.0) {
                return Err(Error::invalid_config(
                    field,
                    format!("must be in (0, 1], got {}", speed),
                ));
            }
        }

        self.snap_threshold.validate("snap_threshold")?;
        self.receive_threshold.validate("receive_threshold")?;
        for value in [
            self.send.position_threshold,
            self.send.rotation_threshold,
            self.send.scale_threshold,
        ]
        .into_iter()
        .flatten()
        {
            check_non_negative("send", value)?;
        }
        if self.send.rest_threshold_count == 0 {
            return Err(Error::invalid_config(
                "send.rest_threshold_count",
                "must be at least 1",
            ));
        }

        check_non_negative("time_correction_speed", self.time_correction_speed)?;
        check_non_negative("snap_time_threshold", self.snap_time_threshold)?;

        if let Some(body) = &self.body {
            check_non_negative("body.drag", body.drag)?;
            check_non_negative("body.angular_drag", body.angular_drag)?;
            if !body.gravity.is_finite() {
                return Err(Error::invalid_config("body.gravity", "must be finite"));
            }
        }

        Ok(())
    }

    /// Number of states a remote history buffer keeps for this config
    ///
    /// Enough to cover twice the interpolation window, never fewer than 30.
    pub fn history_capacity(&self) -> usize {
        let window = (self.send_rate * self.interpolation_back_time).round() as usize;
        window.saturating_mul(2).saturating_add(2).max(30)
    }
}

fn check_non_negative(field: &'static str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::invalid_config(
            field,
            format!("must be a non-negative number, got {}", value),
        ))
    }
}

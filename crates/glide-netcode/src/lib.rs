//! Glide Netcode - Remote transform synchronization
//!
//! This crate keeps the transform of a networked entity in step between the
//! peer that owns it and every peer that merely renders it:
//!
//! - **Transmission**: Sample the owned entity at a fixed send rate, skipping
//!   unchanged or resting poses
//! - **Clock reconciliation**: Estimate the owner's clock from arrival times
//! - **Interpolation**: Render remote entities slightly in the past, between
//!   two received states
//! - **Extrapolation**: Keep moving along the last known velocity when states
//!   run out, within limits
//! - **Sessions**: Route each entity to the owner or remote path and swap
//!   them when ownership moves
//!
//! # Architecture
//!
//! ```text
//! ┌─────────── Owner ───────────┐          ┌────────────────── Remote ──────────────────┐
//! │  ┌─────────┐  ┌───────────┐ │  states  │ ┌────────────┐  ┌───────────────────────┐  │
//! │  │ Movable │─▶│Transmitter│─┼─────────▶┼▶│  History   │─▶│ Interpolator /        │  │
//! │  └─────────┘  └───────────┘ │          │ │  Buffer    │  │ Extrapolator          │  │
//! │                             │          │ └────────────┘  └───────────────────────┘  │
//! └─────────────────────────────┘          │        ▲                    │              │
//!                                          │ ┌────────────┐              ▼              │
//!                                          │ │   Clock    │        ┌──────────┐        │
//!                                          │ │ Reconciler │        │ Movable  │        │
//!                                          │ └────────────┘        └──────────┘        │
//!                                          └────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use glide_core::{EntityId, Pose, SyncConfig, TimestampedState, Vec3};
//! use glide_netcode::{SyncSession, TickOutcome};
//!
//! let entity = EntityId::new(1);
//! let sent: Vec<(EntityId, TimestampedState)> = Vec::new();
//!
//! // This peer owns nothing; every entity is followed remotely
//! let mut session = SyncSession::new(SyncConfig::default(), sent, |_: EntityId| false).unwrap();
//! session.register(entity).unwrap();
//!
//! session
//!     .on_state_received(entity, TimestampedState::at(0.0, Vec3::X))
//!     .unwrap();
//!
//! let mut pose = Pose::IDENTITY;
//! let outcome = session.tick_entity(entity, 1.0 / 60.0, &mut pose).unwrap();
//! assert!(matches!(outcome, TickOutcome::Remote { .. }));
//! assert_eq!(pose.position, Vec3::X);
//! ```

mod error;
mod extrapolation;
mod interpolation;
mod reconciliation;
mod resolver;
mod session;
mod transmitter;
mod transport;

pub use error::{Error, Result};
pub use extrapolation::{Extrapolator, FreezeReason};
pub use interpolation::{Interpolation, Interpolator};
pub use reconciliation::{ClockReconciler, TimeCorrection};
pub use resolver::{ResolvePhase, ResolvedTarget, Timeline, TransformResolver};
pub use session::{Role, SyncSession, SyncedEntity, TickOutcome};
pub use transmitter::StateTransmitter;
pub use transport::{OwnershipQuery, StateTransport};

// Re-export the buffer types that appear in this crate's API
pub use glide_history_buffer::{BufferStats, InsertOutcome, StateHistoryBuffer};

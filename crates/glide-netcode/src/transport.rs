//! Seams to the host's networking and ownership model
//!
//! Glide never opens sockets or decides who owns an entity. The host
//! implements these traits over its own stack (UDP, WebSocket, relay...)
//! and hands them to a [`SyncSession`](crate::SyncSession).

use glide_core::{EntityId, TimestampedState};
use std::convert::Infallible;

/// Outbound channel for owner-side states
///
/// Sends are fire-and-forget: the session logs failures and moves on, and a
/// lost state is covered by the next one.
pub trait StateTransport {
    /// Error type for this transport
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send `state` for `entity` to every remote peer
    fn send(&mut self, entity: EntityId, state: &TimestampedState) -> Result<(), Self::Error>;
}

/// Collects sent states in memory
impl StateTransport for Vec<(EntityId, TimestampedState)> {
    type Error = Infallible;

    fn send(&mut self, entity: EntityId, state: &TimestampedState) -> Result<(), Self::Error> {
        self.push((entity, *state));
        Ok(())
    }
}

/// Answers whether this peer currently owns an entity
pub trait OwnershipQuery {
    fn is_owner(&self, entity: EntityId) -> bool;
}

impl<F> OwnershipQuery for F
where
    F: Fn(EntityId) -> bool,
{
    fn is_owner(&self, entity: EntityId) -> bool {
        self(entity)
    }
}

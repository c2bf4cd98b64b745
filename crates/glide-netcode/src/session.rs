//! Per-peer registry of synchronized entities
//!
//! A [`SyncSession`] routes every synchronized entity to its owner-side
//! [`StateTransmitter`] or remote-side [`TransformResolver`], depending on
//! what the host's [`OwnershipQuery`] says, and swaps the two when
//! ownership moves.

use crate::error::{Error, Result};
use crate::resolver::{ResolvePhase, TransformResolver};
use crate::transmitter::StateTransmitter;
use crate::transport::{OwnershipQuery, StateTransport};
use glide_core::{EntityId, Movable, SyncConfig, TimestampedState};
use glide_history_buffer::InsertOutcome;
use indexmap::IndexMap;

/// The side of the sync an entity is on for this peer
#[derive(Debug)]
pub enum Role {
    /// This peer owns the entity and sends its state
    Owner(StateTransmitter),
    /// Another peer owns the entity; this peer follows it
    Remote(Box<TransformResolver>),
}

/// A registered entity
#[derive(Debug)]
pub struct SyncedEntity {
    config: SyncConfig,
    role: Role,
}

impl SyncedEntity {
    fn new(config: SyncConfig, is_owner: bool) -> Result<Self> {
        let role = if is_owner {
            Role::Owner(StateTransmitter::new(config.clone())?)
        } else {
            Role::Remote(Box::new(TransformResolver::new(config.clone())?))
        };
        Ok(Self { config, role })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn is_owner(&self) -> bool {
        matches!(self.role, Role::Owner(_))
    }

    pub fn transmitter(&self) -> Option<&StateTransmitter> {
        match &self.role {
            Role::Owner(transmitter) => Some(transmitter),
            Role::Remote(_) => None,
        }
    }

    pub fn resolver(&self) -> Option<&TransformResolver> {
        match &self.role {
            Role::Owner(_) => None,
            Role::Remote(resolver) => Some(&**resolver),
        }
    }
}

/// What one entity tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Owner { sent: bool },
    Remote { phase: ResolvePhase },
}

/// Every synchronized entity known to this peer
pub struct SyncSession<T, O> {
    /// Config for entities registered without their own
    config: SyncConfig,
    transport: T,
    ownership: O,
    entities: IndexMap<EntityId, SyncedEntity>,
}

impl<T, O> SyncSession<T, O>
where
    T: StateTransport,
    O: OwnershipQuery,
{
    /// Create a session, validating the default entity config
    pub fn new(config: SyncConfig, transport: T, ownership: O) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            ownership,
            entities: IndexMap::new(),
        })
    }

    /// Start synchronizing `entity` with the session's default config
    pub fn register(&mut self, entity: EntityId) -> Result<()> {
        self.register_with_config(entity, self.config.clone())
    }

    /// Start synchronizing `entity` with its own config
    ///
    /// Re-registering an entity replaces its previous state.
    pub fn register_with_config(&mut self, entity: EntityId, config: SyncConfig) -> Result<()> {
        let is_owner = self.ownership.is_owner(entity);
        let synced = SyncedEntity::new(config, is_owner)?;
        tracing::debug!(%entity, is_owner, "Registered entity");
        self.entities.insert(entity, synced);
        Ok(())
    }

    /// Stop synchronizing `entity`
    pub fn unregister(&mut self, entity: EntityId) -> Option<SyncedEntity> {
        self.entities.shift_remove(&entity)
    }

    pub fn entity(&self, entity: EntityId) -> Option<&SyncedEntity> {
        self.entities.get(&entity)
    }

    /// Registered entities in registration order
    pub fn entities(&self) -> impl Iterator<Item = (&EntityId, &SyncedEntity)> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Route a state received from the network
    ///
    /// Returns `Ok(None)` when this peer owns the entity; its own state
    /// coming back is ignored.
    pub fn on_state_received(
        &mut self,
        entity: EntityId,
        state: TimestampedState,
    ) -> Result<Option<InsertOutcome>> {
        let synced = self
            .entities
            .get_mut(&entity)
            .ok_or(Error::UnknownEntity(entity))?;

        match &mut synced.role {
            Role::Owner(_) => {
                tracing::trace!(%entity, "Ignoring state for owned entity");
                Ok(None)
            }
            Role::Remote(resolver) => Ok(Some(resolver.receive_state(state))),
        }
    }

    /// Re-evaluate who owns `entity` after the host reports a change
    pub fn on_ownership_changed(&mut self, entity: EntityId) -> Result<()> {
        let synced = self
            .entities
            .get_mut(&entity)
            .ok_or(Error::UnknownEntity(entity))?;
        let is_owner = self.ownership.is_owner(entity);

        match (synced.is_owner(), is_owner) {
            (true, true) => {}
            (true, false) => {
                let mut resolver = TransformResolver::new(synced.config.clone())?;
                resolver.on_authority_changed();
                synced.role = Role::Remote(Box::new(resolver));
                tracing::info!(%entity, "Lost ownership");
            }
            (false, true) => {
                synced.role = Role::Owner(StateTransmitter::new(synced.config.clone())?);
                tracing::info!(%entity, "Took ownership");
            }
            (false, false) => {
                if let Role::Remote(resolver) = &mut synced.role {
                    resolver.on_authority_changed();
                }
                tracing::info!(%entity, "Ownership moved between remote peers");
            }
        }
        Ok(())
    }

    /// Make the next state sent for an owned entity a teleport
    ///
    /// Has no effect on remote entities.
    pub fn teleport(&mut self, entity: EntityId) -> Result<()> {
        let synced = self
            .entities
            .get_mut(&entity)
            .ok_or(Error::UnknownEntity(entity))?;
        if let Role::Owner(transmitter) = &mut synced.role {
            transmitter.teleport();
        }
        Ok(())
    }

    /// Run one tick for `entity`
    ///
    /// Owned entities are sampled and possibly sent; remote entities are
    /// resolved and `movable` is moved toward the result.
    pub fn tick_entity<M: Movable + ?Sized>(
        &mut self,
        entity: EntityId,
        delta_time: f32,
        movable: &mut M,
    ) -> Result<TickOutcome> {
        let synced = self
            .entities
            .get_mut(&entity)
            .ok_or(Error::UnknownEntity(entity))?;

        Ok(match &mut synced.role {
            Role::Owner(transmitter) => TickOutcome::Owner {
                sent: transmitter.tick(entity, delta_time, &*movable, &mut self.transport),
            },
            Role::Remote(resolver) => TickOutcome::Remote {
                phase: resolver.tick(delta_time, movable),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glide_core::{Pose, PositionUpdate, TransformUpdate, Vec3};
    use std::cell::Cell;
    use std::rc::Rc;

    type Sent = Vec<(EntityId, TimestampedState)>;

    const ENTITY: EntityId = EntityId(9);

    fn owner_session() -> SyncSession<Sent, impl OwnershipQuery> {
        SyncSession::new(SyncConfig::default(), Sent::new(), |_: EntityId| true).unwrap()
    }

    fn remote_session() -> SyncSession<Sent, impl OwnershipQuery> {
        SyncSession::new(SyncConfig::default(), Sent::new(), |_: EntityId| false).unwrap()
    }

    fn move_to(pose: &mut Pose, position: Vec3) {
        pose.apply_resolved_transform(TransformUpdate {
            position: Some(PositionUpdate::Set(position)),
            ..TransformUpdate::default()
        });
    }

    #[test]
    fn test_remote_tracks_owner() {
        let dt = 1.0 / 60.0;
        let mut owner = owner_session();
        let mut remote = remote_session();
        owner.register(ENTITY).unwrap();
        remote.register(ENTITY).unwrap();

        let mut owner_pose = Pose::IDENTITY;
        let mut remote_pose = Pose::IDENTITY;

        for i in 0..120 {
            let t = (i + 1) as f32 * dt;
            move_to(&mut owner_pose, Vec3::new(0.0, 0.0, 30.0 * t));
            owner.tick_entity(ENTITY, dt, &mut owner_pose).unwrap();

            let sent: Sent = owner.transport_mut().drain(..).collect();
            for (entity, state) in sent {
                remote.on_state_received(entity, state).unwrap();
            }
            remote.tick_entity(ENTITY, dt, &mut remote_pose).unwrap();

            if t > 0.1 {
                let expected = 30.0 * (t - 0.1);
                assert!(
                    (remote_pose.position.z - expected).abs() < 1.0,
                    "t={} remote={} expected={}",
                    t,
                    remote_pose.position.z,
                    expected
                );
            }
        }
    }

    #[test]
    fn test_owned_entity_ignores_received_states() {
        let mut session = owner_session();
        session.register(ENTITY).unwrap();

        let outcome = session
            .on_state_received(ENTITY, TimestampedState::at(1.0, Vec3::X))
            .unwrap();
        assert!(outcome.is_none());
        assert!(session.entity(ENTITY).unwrap().is_owner());
    }

    #[test]
    fn test_unknown_entity() {
        let mut session = remote_session();
        let result = session.on_state_received(ENTITY, TimestampedState::default());
        assert!(matches!(result, Err(Error::UnknownEntity(id)) if id == ENTITY));

        let mut pose = Pose::IDENTITY;
        assert!(session.tick_entity(ENTITY, 0.016, &mut pose).is_err());
        assert!(session.teleport(ENTITY).is_err());
    }

    #[test]
    fn test_ownership_swap() {
        let owned = Rc::new(Cell::new(true));
        let query = {
            let owned = Rc::clone(&owned);
            move |_: EntityId| owned.get()
        };
        let mut session = SyncSession::new(SyncConfig::default(), Sent::new(), query).unwrap();
        session.register(ENTITY).unwrap();
        let mut pose = Pose::IDENTITY;

        assert_eq!(
            session.tick_entity(ENTITY, 0.016, &mut pose).unwrap(),
            TickOutcome::Owner { sent: true }
        );

        owned.set(false);
        session.on_ownership_changed(ENTITY).unwrap();
        let synced = session.entity(ENTITY).unwrap();
        assert!(!synced.is_owner());
        assert!(synced.resolver().unwrap().buffer().is_empty());
        assert_eq!(
            session.tick_entity(ENTITY, 0.016, &mut pose).unwrap(),
            TickOutcome::Remote {
                phase: ResolvePhase::Uninitialized
            }
        );

        owned.set(true);
        session.on_ownership_changed(ENTITY).unwrap();
        assert!(session.entity(ENTITY).unwrap().transmitter().is_some());
    }

    #[test]
    fn test_teleport_reaches_remote() {
        let mut owner = owner_session();
        owner.register(ENTITY).unwrap();
        let mut pose = Pose::IDENTITY;
        owner.tick_entity(ENTITY, 0.1, &mut pose).unwrap();

        owner.teleport(ENTITY).unwrap();
        move_to(&mut pose, Vec3::new(100.0, 0.0, 0.0));
        owner.tick_entity(ENTITY, 0.1, &mut pose).unwrap();

        let (_, last) = owner.transport().last().unwrap();
        assert!(last.teleport);
        assert_eq!(last.position.x, 100.0);
    }

    #[test]
    fn test_unregister() {
        let mut session = remote_session();
        session.register(ENTITY).unwrap();
        session.register(EntityId(10)).unwrap();
        assert_eq!(session.len(), 2);

        assert!(session.unregister(ENTITY).is_some());
        assert!(session.unregister(ENTITY).is_none());
        let ids: Vec<_> = session.entities().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![EntityId(10)]);
    }
}

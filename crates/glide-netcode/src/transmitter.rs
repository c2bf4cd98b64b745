//! Owner-side state transmission
//!
//! The owning peer samples its entity on a fixed network tick and sends the
//! result to every remote peer. Sending is throttled three ways:
//!
//! - **Send rate**: at most `send_rate` states per second, with the
//!   remainder of each interval carried over so the cadence does not drift
//! - **Thresholds**: a channel that moved less than its send threshold since
//!   the last sent state does not force a send
//! - **Rest**: once the entity has been still for `rest_threshold_count`
//!   network ticks, one state flagged at rest is sent and sending pauses
//!   until it moves again

use crate::error::Result;
use crate::transport::StateTransport;
use glide_core::time::MIN_TIME_PRECISION;
use glide_core::{EntityId, LocalClock, Movable, Pose, SyncConfig, TimestampedState, Vec3};

/// Tolerance for "the pose did not change"
const STILL_EPSILON: f32 = 1e-5;

/// Samples and sends the state of one locally owned entity
#[derive(Debug)]
pub struct StateTransmitter {
    config: SyncConfig,
    clock: LocalClock,
    /// Time carried toward the next network tick
    accumulator: f32,
    started: bool,
    last_sent: Option<TimestampedState>,
    /// Pose seen on the previous network tick
    last_observed: Option<Pose>,
    position_still_ticks: u32,
    rotation_still_ticks: u32,
    teleport_pending: bool,
}

impl StateTransmitter {
    /// Create a transmitter, validating `config`
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock: LocalClock::new(),
            accumulator: 0.0,
            started: false,
            last_sent: None,
            last_observed: None,
            position_still_ticks: 0,
            rotation_still_ticks: 0,
            teleport_pending: false,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn clock(&self) -> &LocalClock {
        &self.clock
    }

    /// The last state handed to the transport
    pub fn last_sent(&self) -> Option<&TimestampedState> {
        self.last_sent.as_ref()
    }

    /// Mark the next state as a teleport
    ///
    /// Receivers jump to it instead of easing, and it is sent on the next
    /// network tick regardless of thresholds or rest.
    pub fn teleport(&mut self) {
        self.teleport_pending = true;
        self.position_still_ticks = 0;
        self.rotation_still_ticks = 0;
    }

    fn at_positional_rest(&self) -> bool {
        self.position_still_ticks >= self.config.send.rest_threshold_count
    }

    fn at_rotational_rest(&self) -> bool {
        self.rotation_still_ticks >= self.config.send.rest_threshold_count
    }

    /// Capture the entity's current state on the local clock
    pub fn sample<M: Movable + ?Sized>(&self, movable: &M) -> TimestampedState {
        let motion = movable.sample();
        TimestampedState::new(self.clock.time(), motion.pose)
            .with_velocity(motion.velocity.unwrap_or(Vec3::ZERO))
            .with_angular_velocity(motion.angular_velocity.unwrap_or(Vec3::ZERO))
            .with_rest(self.at_positional_rest(), self.at_rotational_rest())
            .with_teleport(self.teleport_pending)
            .with_reset_indicator(self.clock.reset_indicator())
    }

    /// Decide whether `state` is worth sending
    pub fn should_send(&self, state: &TimestampedState) -> bool {
        let last = match &self.last_sent {
            Some(last) if !state.teleport => last,
            _ => return true,
        };

        if state.at_positional_rest != last.at_positional_rest
            || state.at_rotational_rest != last.at_rotational_rest
        {
            return true;
        }
        if state.is_at_rest() {
            return false;
        }

        let send = &self.config.send;
        exceeds(send.position_threshold, state.position.distance(last.position))
            || exceeds(
                send.rotation_threshold,
                state.rotation.angle_between(last.rotation).to_degrees(),
            )
            || exceeds(send.scale_threshold, state.scale.distance(last.scale))
    }

    /// Hand `state` to the transport
    ///
    /// Failures are logged and dropped. Returns whether the transport
    /// accepted the state.
    pub fn send<T: StateTransport + ?Sized>(
        &mut self,
        entity: EntityId,
        state: &TimestampedState,
        transport: &mut T,
    ) -> bool {
        self.last_sent = Some(*state);
        if state.teleport {
            self.teleport_pending = false;
        }

        match transport.send(entity, state) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%entity, error = %e, "Failed to send state");
                false
            }
        }
    }

    /// Run one owner tick
    ///
    /// Returns true if a state was sent this tick.
    pub fn tick<M, T>(
        &mut self,
        entity: EntityId,
        delta_time: f32,
        movable: &M,
        transport: &mut T,
    ) -> bool
    where
        M: Movable + ?Sized,
        T: StateTransport + ?Sized,
    {
        if let Some(origin) = self.clock.advance(delta_time) {
            if let Some(last) = self.last_sent.as_mut() {
                last.owner_timestamp -= origin;
            }
        }
        if !self.network_tick_due(delta_time) {
            return false;
        }

        self.observe(&movable.sample().pose);
        let state = self.sample(movable);
        if !self.should_send(&state) {
            return false;
        }
        self.send(entity, &state, transport)
    }

    /// Consume accumulated time; true once per send interval
    fn network_tick_due(&mut self, delta_time: f32) -> bool {
        if !self.started {
            self.started = true;
            self.accumulator = 0.0;
            return true;
        }

        let interval = self.config.send_rate.recip();
        self.accumulator += delta_time;
        if self.accumulator + MIN_TIME_PRECISION < interval {
            return false;
        }
        self.accumulator = (self.accumulator - interval).clamp(0.0, interval);
        true
    }

    /// Update the rest counters from this network tick's pose
    fn observe(&mut self, pose: &Pose) {
        if let Some(previous) = self.last_observed {
            if pose.position.abs_diff_eq(previous.position, STILL_EPSILON) {
                self.position_still_ticks = self.position_still_ticks.saturating_add(1);
            } else {
                self.position_still_ticks = 0;
            }
            if pose.rotation.abs_diff_eq(previous.rotation, STILL_EPSILON) {
                self.rotation_still_ticks = self.rotation_still_ticks.saturating_add(1);
            } else {
                self.rotation_still_ticks = 0;
            }
        }
        self.last_observed = Some(*pose);
    }
}

fn exceeds(threshold: Option<f32>, difference: f32) -> bool {
    threshold.map_or(true, |limit| difference > limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glide_core::{Motion, PositionUpdate, SendConfig, TransformUpdate};

    type Sent = Vec<(EntityId, TimestampedState)>;

    const ENTITY: EntityId = EntityId(1);

    fn every_tick() -> SyncConfig {
        SyncConfig {
            send_rate: 10.0,
            ..SyncConfig::default()
        }
    }

    fn move_to(pose: &mut Pose, position: Vec3) {
        pose.apply_resolved_transform(TransformUpdate {
            position: Some(PositionUpdate::Set(position)),
            ..TransformUpdate::default()
        });
    }

    #[test]
    fn test_sends_at_send_rate() {
        let mut transmitter = StateTransmitter::new(SyncConfig::default()).unwrap();
        let mut sent = Sent::new();
        let mut pose = Pose::IDENTITY;

        let mut sent_ticks = Vec::new();
        for i in 0..60 {
            move_to(&mut pose, Vec3::new(0.0, 0.0, i as f32 * 0.5));
            if transmitter.tick(ENTITY, 1.0 / 60.0, &pose, &mut sent) {
                sent_ticks.push(i);
            }
        }

        assert_eq!(sent.len(), 30);
        assert_eq!(&sent_ticks[..4], &[0, 2, 4, 6]);
    }

    #[test]
    fn test_sample_carries_clock_and_motion() {
        struct Body(Motion);
        impl Movable for Body {
            fn sample(&self) -> Motion {
                self.0
            }
            fn apply_resolved_transform(&mut self, _update: TransformUpdate) {}
        }

        let mut transmitter = StateTransmitter::new(every_tick()).unwrap();
        let mut sent = Sent::new();
        let body = Body(Motion {
            pose: Pose::from_position(Vec3::Y),
            velocity: Some(Vec3::X),
            angular_velocity: None,
        });

        transmitter.tick(ENTITY, 0.25, &body, &mut sent);
        let state = sent[0].1;
        assert_eq!(state.owner_timestamp, 0.25);
        assert_eq!(state.position, Vec3::Y);
        assert_eq!(state.velocity, Vec3::X);
        assert_eq!(state.angular_velocity, Vec3::ZERO);
        assert_eq!(state.local_time_reset_indicator, 0);
    }

    #[test]
    fn test_rest_transition_sent_once() {
        let mut transmitter = StateTransmitter::new(every_tick()).unwrap();
        let mut sent = Sent::new();
        let mut pose = Pose::IDENTITY;

        // First tick plus two still ticks below the rest count
        for _ in 0..3 {
            assert!(transmitter.tick(ENTITY, 0.1, &pose, &mut sent));
        }
        // Third still tick flags rest
        assert!(transmitter.tick(ENTITY, 0.1, &pose, &mut sent));
        assert!(sent.last().unwrap().1.is_at_rest());

        // Then sending pauses
        for _ in 0..5 {
            assert!(!transmitter.tick(ENTITY, 0.1, &pose, &mut sent));
        }
        assert_eq!(sent.len(), 4);

        // Moving again clears the flags
        move_to(&mut pose, Vec3::X);
        assert!(transmitter.tick(ENTITY, 0.1, &pose, &mut sent));
        let state = sent.last().unwrap().1;
        assert!(!state.at_positional_rest);
        assert!(state.at_rotational_rest);
    }

    #[test]
    fn test_send_thresholds() {
        let config = SyncConfig {
            send: SendConfig {
                position_threshold: Some(0.5),
                rotation_threshold: Some(1.0),
                scale_threshold: Some(0.1),
                rest_threshold_count: 100,
            },
            ..every_tick()
        };
        let mut transmitter = StateTransmitter::new(config).unwrap();
        let mut sent = Sent::new();
        let mut pose = Pose::IDENTITY;

        assert!(transmitter.tick(ENTITY, 0.1, &pose, &mut sent));
        let mut sent_at = Vec::new();
        for i in 1..=10 {
            move_to(&mut pose, Vec3::new(i as f32 * 0.2, 0.0, 0.0));
            if transmitter.tick(ENTITY, 0.1, &pose, &mut sent) {
                sent_at.push(i);
            }
        }
        // 0.6 and every 0.6 after that
        assert_eq!(sent_at, vec![3, 6, 9]);
    }

    #[test]
    fn test_teleport_always_sent_once() {
        let mut transmitter = StateTransmitter::new(every_tick()).unwrap();
        let mut sent = Sent::new();
        let pose = Pose::IDENTITY;

        for _ in 0..8 {
            transmitter.tick(ENTITY, 0.1, &pose, &mut sent);
        }
        let before = sent.len();

        transmitter.teleport();
        assert!(transmitter.tick(ENTITY, 0.1, &pose, &mut sent));
        let state = sent.last().unwrap().1;
        assert!(state.teleport);
        assert!(!state.is_at_rest());

        transmitter.tick(ENTITY, 0.1, &pose, &mut sent);
        assert!(sent.iter().skip(before + 1).all(|(_, s)| !s.teleport));
    }

    #[test]
    fn test_transport_failure_is_dropped() {
        #[derive(Debug, thiserror::Error)]
        #[error("offline")]
        struct Offline;

        struct Failing;
        impl StateTransport for Failing {
            type Error = Offline;
            fn send(
                &mut self,
                _: EntityId,
                _: &TimestampedState,
            ) -> std::result::Result<(), Offline> {
                Err(Offline)
            }
        }

        let mut transmitter = StateTransmitter::new(every_tick()).unwrap();
        transmitter.teleport();
        assert!(!transmitter.tick(ENTITY, 0.1, &Pose::IDENTITY, &mut Failing));
        assert!(transmitter.last_sent().unwrap().teleport);

        // The teleport is not retried
        transmitter.tick(ENTITY, 0.1, &Pose::IDENTITY, &mut Failing);
        assert!(!transmitter.last_sent().unwrap().teleport);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = SyncConfig {
            send_rate: -1.0,
            ..SyncConfig::default()
        };
        assert!(StateTransmitter::new(config).is_err());
    }
}

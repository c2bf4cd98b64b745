//! Remote Follow Demo
//!
//! Runs one owning peer and one remote peer in a single process. The owner
//! drives an entity around a circle and sends its state over an in-memory
//! link with random latency and packet loss; the remote peer follows it.
//! Halfway through, the owner teleports the entity.
//!
//! Usage: `remote_follow [config.ron]`. Set `RUST_LOG=debug` to see clock
//! snaps and extrapolation refusals.

use glide_core::{
    EntityId, Movable, Pose, PositionUpdate, SyncConfig, TimestampedState, TransformUpdate, Vec3,
};
use glide_netcode::{ResolvePhase, StateTransport, SyncSession, TickOutcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::convert::Infallible;
use std::env;

const TICK_RATE: f32 = 60.0;
const DURATION: f32 = 10.0;
const TELEPORT_AT: f32 = 5.0;
const TELEPORT_OFFSET: Vec3 = Vec3::new(50.0, 0.0, 0.0);

/// One-way link that delays, reorders and drops states
struct LossyLink {
    rng: StdRng,
    now: f32,
    min_latency: f32,
    max_latency: f32,
    loss: f64,
    in_flight: Vec<(f32, EntityId, TimestampedState)>,
    dropped: u32,
}

impl LossyLink {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            now: 0.0,
            min_latency: 0.03,
            max_latency: 0.12,
            loss: 0.05,
            in_flight: Vec::new(),
            dropped: 0,
        }
    }

    /// Remove every state due at `now`, in arrival order
    fn deliver(&mut self, now: f32) -> Vec<(EntityId, TimestampedState)> {
        self.now = now;
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.in_flight.drain(..).partition(|(at, _, _)| *at <= now);
        self.in_flight = pending;
        due.sort_by(|a, b| a.0.total_cmp(&b.0));
        due.into_iter().map(|(_, entity, state)| (entity, state)).collect()
    }
}

impl StateTransport for LossyLink {
    type Error = Infallible;

    fn send(&mut self, entity: EntityId, state: &TimestampedState) -> Result<(), Self::Error> {
        if self.rng.gen_bool(self.loss) {
            self.dropped += 1;
            tracing::trace!(%entity, owner_timestamp = state.owner_timestamp, "Link dropped state");
            return Ok(());
        }
        let latency = self.rng.gen_range(self.min_latency..self.max_latency);
        self.in_flight.push((self.now + latency, entity, *state));
        Ok(())
    }
}

/// Where the owner puts the entity at time `t`
fn path(t: f32) -> Vec3 {
    let angle = t * 0.8;
    let circle = Vec3::new(angle.cos() * 10.0, 0.0, angle.sin() * 10.0);
    if t >= TELEPORT_AT {
        circle + TELEPORT_OFFSET
    } else {
        circle
    }
}

fn phase_name(phase: ResolvePhase) -> String {
    match phase {
        ResolvePhase::Frozen(reason) => format!("frozen ({:?})", reason),
        other => format!("{:?}", other).to_lowercase(),
    }
}

fn main() -> glide_netcode::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match env::args().nth(1) {
        Some(path) => SyncConfig::from_ron_file(&path)?,
        None => SyncConfig::default(),
    };
    tracing::info!(
        send_rate = config.send_rate,
        interpolation_back_time = config.interpolation_back_time,
        "Starting remote follow demo"
    );

    let entity = EntityId::new(1);
    let mut owner = SyncSession::new(config.clone(), LossyLink::new(7), |_: EntityId| true)?;
    let mut remote = SyncSession::new(
        config.clone(),
        Vec::<(EntityId, TimestampedState)>::new(),
        |_: EntityId| false,
    )?;
    owner.register(entity)?;
    remote.register(entity)?;

    let dt = TICK_RATE.recip();
    let ticks = (DURATION * TICK_RATE) as u32;
    let mut owner_pose = Pose::from_position(path(0.0));
    let mut remote_pose = Pose::IDENTITY;
    let mut sent = 0u32;
    let mut worst_error = 0.0f32;
    let mut teleported = false;

    for i in 1..=ticks {
        let t = i as f32 * dt;

        if t >= TELEPORT_AT && !teleported {
            owner.teleport(entity)?;
            teleported = true;
            tracing::info!(t, "Owner teleported entity");
        }
        owner_pose.apply_resolved_transform(TransformUpdate {
            position: Some(PositionUpdate::Set(path(t))),
            ..TransformUpdate::default()
        });

        owner.transport_mut().now = t;
        if let TickOutcome::Owner { sent: true } = owner.tick_entity(entity, dt, &mut owner_pose)? {
            sent += 1;
        }

        for (id, state) in owner.transport_mut().deliver(t) {
            remote.on_state_received(id, state)?;
        }
        let outcome = remote.tick_entity(entity, dt, &mut remote_pose)?;

        // The remote renders the owner's past; compare against that
        let expected = path(t - config.interpolation_back_time);
        let error = remote_pose.position.distance(expected);
        let settling = (t - TELEPORT_AT).abs() < 0.5 || t < 1.0;
        if !settling {
            worst_error = worst_error.max(error);
        }

        if i % TICK_RATE as u32 == 0 {
            if let TickOutcome::Remote { phase } = outcome {
                let stats = remote
                    .entity(entity)
                    .and_then(|synced| synced.resolver())
                    .map(|resolver| resolver.buffer().stats());
                tracing::info!(
                    t,
                    error,
                    phase = %phase_name(phase),
                    has_target = phase.has_target(),
                    buffered = stats.map_or(0, |s| s.count),
                    buffered_span = stats.map_or(0.0, |s| s.time_span()),
                    "Remote tracking"
                );
            }
        }
    }

    tracing::info!(
        sent,
        dropped = owner.transport().dropped,
        worst_error,
        "Demo finished"
    );
    Ok(())
}

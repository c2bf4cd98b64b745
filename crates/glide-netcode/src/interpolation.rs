//! State interpolation for smooth rendering
//!
//! Blends between the two buffered states that bracket the render time.
//! Remote entities are always rendered slightly in the past, so in the normal
//! case both bracketing states have already arrived.

use glide_core::{ChannelFlags, ChannelThresholds, TimestampedState};
use glide_history_buffer::{Bracket, StateHistoryBuffer};

/// Output of one interpolation step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolation {
    pub state: TimestampedState,
    /// Channels that must jump rather than ease this tick
    pub snap: ChannelFlags,
}

/// Interpolator over a state history buffer
///
/// Remembers which state it last used as the newer bracket so it can notice
/// when a slow tick jumped over a teleport.
#[derive(Debug, Default)]
pub struct Interpolator {
    /// Sequence number of the newer bracket used last time
    last_end_sequence: Option<u64>,
}

impl Interpolator {
    /// Create a new interpolator
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpolate the buffered states at `target_time`
    ///
    /// Returns `None` when the buffer is empty.
    pub fn interpolate(
        &mut self,
        buffer: &StateHistoryBuffer,
        target_time: f32,
        snap_threshold: &ChannelThresholds,
    ) -> Option<Interpolation> {
        let bracket = buffer.bracket(target_time)?;
        let start = *buffer.get(bracket.start)?;
        let end = *buffer.get(bracket.end)?;

        let span = end.owner_timestamp - start.owner_timestamp;
        let mut t = if span > 0.0 {
            ((target_time - start.owner_timestamp) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let mut snap = ChannelFlags::NONE;
        if end.teleport || self.skipped_teleport(buffer, bracket, &start, &end) {
            t = 1.0;
            snap = ChannelFlags::ALL;
        }
        self.last_end_sequence = Some(end.sequence);

        let mut state = start.lerp(&end, t);

        if let Some(limit) = snap_threshold.position {
            if start.position.distance(end.position) > limit {
                state.position = end.position;
                snap.position = true;
            }
        }
        if let Some(limit) = snap_threshold.rotation {
            if start.rotation.angle_between(end.rotation).to_degrees() > limit {
                state.rotation = end.rotation;
                snap.rotation = true;
            }
        }
        if let Some(limit) = snap_threshold.scale {
            if start.scale.distance(end.scale) > limit {
                state.scale = end.scale;
                snap.scale = true;
            }
        }

        Some(Interpolation { state, snap })
    }

    /// Check whether a teleport lies between the previous and current bracket
    ///
    /// Looks at every state newer than the last used end bracket, up to and
    /// including the current start bracket.
    fn skipped_teleport(
        &self,
        buffer: &StateHistoryBuffer,
        bracket: Bracket,
        start: &TimestampedState,
        end: &TimestampedState,
    ) -> bool {
        let last = match self.last_end_sequence {
            Some(sequence) if sequence != start.sequence && sequence != end.sequence => sequence,
            _ => return false,
        };
        let last_index = match buffer.position_of(last) {
            Some(index) if index > bracket.start => index,
            _ => return false,
        };

        (bracket.start..last_index)
            .filter_map(|i| buffer.get(i))
            .any(|s| s.teleport)
    }

    /// Forget the previously used bracket
    pub fn reset(&mut self) {
        self.last_end_sequence = None;
    }
}

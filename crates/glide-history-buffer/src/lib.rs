//! Glide History Buffer - Fixed-capacity ring of received transform states
//!
//! Each remote entity keeps one [`StateHistoryBuffer`]. States are stored
//! newest-first: index 0 is always the most recent accepted state.
//!
//! # Features
//!
//! - **Bounded memory**: Allocated once, never resized
//! - **Ordered**: Stale states from the same clock epoch are dropped
//! - **Stable identity**: Every accepted state gets a monotonic sequence number
//! - **Rebasing**: Timestamps can be shifted wholesale when a clock resets
//!
//! # Example
//!
//! ```rust
//! use glide_core::{TimestampedState, Vec3};
//! use glide_history_buffer::{InsertOutcome, StateHistoryBuffer};
//!
//! let mut buffer = StateHistoryBuffer::new(30);
//!
//! buffer.insert(TimestampedState::at(0.0, Vec3::ZERO), 0.0);
//! buffer.insert(TimestampedState::at(0.1, Vec3::X), 0.1);
//!
//! // An older state from the same epoch is dropped
//! let outcome = buffer.insert(TimestampedState::at(0.05, Vec3::Y), 0.12);
//! assert_eq!(outcome, InsertOutcome::Stale);
//!
//! assert_eq!(buffer.len(), 2);
//! assert_eq!(buffer.newest().unwrap().owner_timestamp, 0.1);
//! ```

use glide_core::{SyncConfig, TimestampedState};

/// Result of [`StateHistoryBuffer::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The state was stored at index 0
    Inserted {
        /// Sequence number stamped on the stored state
        sequence: u64,
    },
    /// The state was not newer than the newest state of the same epoch
    Stale,
}

/// Two buffer indices bracketing a target time
///
/// `start` is the newest state at or before the target time (or the oldest
/// state if all are newer); `end` is the state one slot newer, clamped to
/// index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bracket {
    pub start: usize,
    pub end: usize,
}

/// A newest-first ring of timestamped states
#[derive(Debug, Clone)]
pub struct StateHistoryBuffer {
    /// Slot storage; only the first `count` slots are meaningful
    states: Vec<TimestampedState>,
    /// Number of populated slots
    count: usize,
    /// Next sequence number to stamp
    next_sequence: u64,
}

impl StateHistoryBuffer {
    /// Create a new buffer holding at most `capacity` states
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");
        Self {
            states: vec![TimestampedState::default(); capacity],
            count: 0,
            next_sequence: 1,
        }
    }

    /// Create a buffer sized by [`SyncConfig::history_capacity`]
    pub fn for_config(config: &SyncConfig) -> Self {
        Self::new(config.history_capacity())
    }

    /// Insert a received state
    ///
    /// The state is dropped if the buffer already holds a state from the same
    /// clock epoch with an equal or later owner timestamp. Otherwise every
    /// entry shifts one slot toward the tail (discarding the oldest when
    /// full) and the state is written at index 0, stamped with `received_at`
    /// and a fresh sequence number.
    ///
    /// Callers that track remote time must check
    /// [`epoch_change_origin`](Self::epoch_change_origin) first and rebase.
    pub fn insert(&mut self, mut state: TimestampedState, received_at: f32) -> InsertOutcome {
        if let Some(newest) = self.newest() {
            if state.local_time_reset_indicator == newest.local_time_reset_indicator
                && state.owner_timestamp - newest.owner_timestamp <= 0.0
            {
                tracing::trace!(
                    owner_timestamp = state.owner_timestamp,
                    newest = newest.owner_timestamp,
                    "Dropping stale state"
                );
                return InsertOutcome::Stale;
            }
        }

        let capacity = self.capacity();
        if capacity > 1 {
            self.states.copy_within(0..capacity - 1, 1);
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        state.received_timestamp = received_at;
        state.sequence = sequence;
        self.states[0] = state;

        if self.count < capacity {
            self.count += 1;
        }

        InsertOutcome::Inserted { sequence }
    }

    /// Origin to rebase by before inserting `state`, if it starts a new epoch
    ///
    /// Returns the newest buffered owner timestamp when `state` carries a
    /// different reset indicator than the newest buffered state.
    pub fn epoch_change_origin(&self, state: &TimestampedState) -> Option<f32> {
        self.newest()
            .filter(|newest| newest.local_time_reset_indicator != state.local_time_reset_indicator)
            .map(|newest| newest.owner_timestamp)
    }

    /// The most recent state
    pub fn newest(&self) -> Option<&TimestampedState> {
        self.get(0)
    }

    /// The state at `index` (0 = newest)
    pub fn get(&self, index: usize) -> Option<&TimestampedState> {
        if index < self.count {
            Some(&self.states[index])
        } else {
            None
        }
    }

    /// Iterate from newest to oldest
    pub fn iter(&self) -> impl Iterator<Item = &TimestampedState> {
        self.states[..self.count].iter()
    }

    /// Index of the state stamped with `sequence`, if still buffered
    pub fn position_of(&self, sequence: u64) -> Option<usize> {
        self.iter().position(|s| s.sequence == sequence)
    }

    /// Find the states bracketing `target_time`
    ///
    /// Walks newest to oldest for the first state at or before the target.
    /// Returns `None` when the buffer is empty.
    pub fn bracket(&self, target_time: f32) -> Option<Bracket> {
        if self.count == 0 {
            return None;
        }
        let start = self
            .iter()
            .position(|s| s.owner_timestamp <= target_time)
            .unwrap_or(self.count - 1);
        Some(Bracket {
            start,
            end: start.saturating_sub(1),
        })
    }

    /// Subtract `origin` from every buffered owner timestamp
    pub fn rebase_owner_timestamps(&mut self, origin: f32) {
        for state in &mut self.states[..self.count] {
            state.owner_timestamp -= origin;
        }
    }

    /// Subtract `origin` from every buffered received timestamp
    pub fn rebase_received_timestamps(&mut self, origin: f32) {
        for state in &mut self.states[..self.count] {
            state.received_timestamp -= origin;
        }
    }

    /// Forget every buffered state
    ///
    /// Sequence numbers keep increasing across resets.
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Number of buffered states
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if no states are buffered
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Maximum number of buffered states
    pub fn capacity(&self) -> usize {
        self.states.len()
    }

    /// Check if the buffer is full
    pub fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    /// Get statistics about the buffer
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            capacity: self.capacity(),
            count: self.count,
            oldest_timestamp: self.get(self.count.wrapping_sub(1)).map(|s| s.owner_timestamp),
            newest_timestamp: self.newest().map(|s| s.owner_timestamp),
        }
    }
}

/// Statistics about a history buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferStats {
    /// Maximum capacity
    pub capacity: usize,
    /// Current number of stored states
    pub count: usize,
    /// Owner timestamp of the oldest state
    pub oldest_timestamp: Option<f32>,
    /// Owner timestamp of the newest state
    pub newest_timestamp: Option<f32>,
}

impl BufferStats {
    /// Seconds of sender time covered by the buffer
    pub fn time_span(&self) -> f32 {
        match (self.oldest_timestamp, self.newest_timestamp) {
            (Some(oldest), Some(newest)) => newest - oldest,
            _ => 0.0,
        }
    }

    /// Get the fill percentage (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f32 {
        self.count as f32 / self.capacity as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn state(t: f32) -> TimestampedState {
        TimestampedState::at(t, Vec3::new(t, 0.0, 0.0))
    }

    fn timestamps(buffer: &StateHistoryBuffer) -> Vec<f32> {
        buffer.iter().map(|s| s.owner_timestamp).collect()
    }

    #[test]
    fn test_new() {
        let buffer = StateHistoryBuffer::new(30);
        assert_eq!(buffer.capacity(), 30);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
        assert!(buffer.newest().is_none());
        assert!(buffer.bracket(1.0).is_none());
    }

    #[test]
    fn test_for_config() {
        let buffer = StateHistoryBuffer::for_config(&SyncConfig::default());
        assert_eq!(buffer.capacity(), 30);
    }

    #[test]
    fn test_newest_first_ordering() {
        let mut buffer = StateHistoryBuffer::new(30);
        for i in 0..10 {
            let s = state(i as f32 * 0.1);
            buffer.insert(s, 0.0);
            assert_eq!(buffer.newest().unwrap().owner_timestamp, s.owner_timestamp);
        }

        let ts = timestamps(&buffer);
        assert!(ts.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_rejects_out_of_order() {
        let mut buffer = StateHistoryBuffer::new(30);
        buffer.insert(state(1.0), 0.0);
        buffer.insert(state(2.0), 0.0);
        let before = timestamps(&buffer);

        assert_eq!(buffer.insert(state(1.5), 0.0), InsertOutcome::Stale);
        assert_eq!(buffer.insert(state(2.0), 0.0), InsertOutcome::Stale);
        assert_eq!(timestamps(&buffer), before);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_rejects_out_of_order_with_single_entry() {
        let mut buffer = StateHistoryBuffer::new(30);
        buffer.insert(state(1.0), 0.0);
        assert_eq!(buffer.insert(state(0.5), 0.0), InsertOutcome::Stale);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_accepts_older_timestamp_from_new_epoch() {
        let mut buffer = StateHistoryBuffer::new(30);
        buffer.insert(state(4000.0), 0.0);

        let next = state(0.1).with_reset_indicator(1);
        assert_eq!(buffer.epoch_change_origin(&next), Some(4000.0));
        assert!(matches!(buffer.insert(next, 0.0), InsertOutcome::Inserted { .. }));
        assert_eq!(buffer.len(), 2);

        // Same epoch as the newest: no origin
        assert_eq!(buffer.epoch_change_origin(&state(0.2).with_reset_indicator(1)), None);
    }

    #[test]
    fn test_capacity_bound_keeps_most_recent() {
        let mut buffer = StateHistoryBuffer::new(4);
        for i in 0..10 {
            buffer.insert(state(i as f32), 0.0);
        }

        assert_eq!(buffer.len(), 4);
        assert!(buffer.is_full());
        assert_eq!(timestamps(&buffer), vec![9.0, 8.0, 7.0, 6.0]);
    }

    #[test]
    fn test_stamps_received_time_and_sequence() {
        let mut buffer = StateHistoryBuffer::new(8);
        let first = buffer.insert(state(1.0), 5.0);
        let second = buffer.insert(state(2.0), 6.0);

        assert_eq!(first, InsertOutcome::Inserted { sequence: 1 });
        assert_eq!(second, InsertOutcome::Inserted { sequence: 2 });
        assert_eq!(buffer.newest().unwrap().received_timestamp, 6.0);
        assert_eq!(buffer.get(1).unwrap().received_timestamp, 5.0);
        assert_eq!(buffer.position_of(1), Some(1));
        assert_eq!(buffer.position_of(3), None);
    }

    #[test]
    fn test_bracket() {
        let mut buffer = StateHistoryBuffer::new(8);
        for t in [0.0, 1.0, 2.0, 3.0] {
            buffer.insert(state(t), 0.0);
        }

        // Between 1.0 and 2.0
        assert_eq!(buffer.bracket(1.5), Some(Bracket { start: 2, end: 1 }));
        // Exactly on a state
        assert_eq!(buffer.bracket(2.0), Some(Bracket { start: 1, end: 0 }));
        // Past the newest: start and end both newest
        assert_eq!(buffer.bracket(5.0), Some(Bracket { start: 0, end: 0 }));
        // Before the oldest: start is the oldest
        assert_eq!(buffer.bracket(-1.0), Some(Bracket { start: 3, end: 2 }));
    }

    #[test]
    fn test_rebase_preserves_gaps() {
        let mut buffer = StateHistoryBuffer::new(8);
        buffer.insert(state(10.0), 100.0);
        buffer.insert(state(10.5), 100.5);
        buffer.insert(state(11.5), 101.5);

        buffer.rebase_owner_timestamps(11.5);
        buffer.rebase_received_timestamps(100.0);

        assert_eq!(timestamps(&buffer), vec![0.0, -1.0, -1.5]);
        let received: Vec<f32> = buffer.iter().map(|s| s.received_timestamp).collect();
        assert_eq!(received, vec![1.5, 0.5, 0.0]);
    }

    #[test]
    fn test_reset() {
        let mut buffer = StateHistoryBuffer::new(8);
        buffer.insert(state(1.0), 0.0);
        buffer.insert(state(2.0), 0.0);
        buffer.reset();

        assert!(buffer.is_empty());
        // Older timestamps are accepted again after a reset
        assert_eq!(
            buffer.insert(state(0.5), 0.0),
            InsertOutcome::Inserted { sequence: 3 }
        );
    }

    #[test]
    fn test_stats() {
        let mut buffer = StateHistoryBuffer::new(8);
        assert_eq!(buffer.stats().time_span(), 0.0);

        buffer.insert(state(1.0), 0.0);
        buffer.insert(state(2.0), 0.0);
        buffer.insert(state(3.0), 0.0);

        let stats = buffer.stats();
        assert_eq!(stats.capacity, 8);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.oldest_timestamp, Some(1.0));
        assert_eq!(stats.newest_timestamp, Some(3.0));
        assert_eq!(stats.time_span(), 2.0);
        assert_eq!(stats.fill_ratio(), 3.0 / 8.0);
    }
}

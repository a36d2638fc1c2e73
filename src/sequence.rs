//! # Sequence identifiers and the atomic counter behind them.
//!
//! A [`SequenceId`] names one unit of work flowing through the pipeline.
//! Identifiers are signed 64-bit integers: normal values are `>= 0` and
//! strictly monotonic, negative values are reserved for control signals
//! (`-1` uninitialised / stop-stage, `-2` stop-all).
//!
//! [`Sequence`] is the single concurrency primitive under the group
//! forwarder: an atomic cell with linearisable `get`/`set`/`next`
//! semantics. A fresh counter holds `-1` so the first [`Sequence::next`]
//! yields `0`.
//!
//! [`masked_index`] builds the default identifier-to-slot mapping: the low
//! `log2(size)` bits of the identifier, which requires `size` to be a
//! power of two.

use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

/// Monotonic 64-bit identifier for one unit of work.
pub type SequenceId = i64;

/// Maps a [`SequenceId`] to a slot index in `[0, size)`.
///
/// Must be pure: the same identifier always maps to the same slot.
pub type IndexFn = Arc<dyn Fn(SequenceId) -> usize + Send + Sync>;

const INITIAL_SEQUENCE_VALUE: SequenceId = -1;

/// Returns the default slot-index function for a ring of `size` slots.
///
/// Computes `id & (size - 1)`, so `size` must be a power of two.
///
/// # Example
/// ```
/// use seqpipe::masked_index;
///
/// let f = masked_index(8);
/// assert_eq!(f(0), 0);
/// assert_eq!(f(7), 7);
/// assert_eq!(f(8), 0);
/// assert_eq!(f(13), 5);
/// ```
pub fn masked_index(size: usize) -> IndexFn {
    debug_assert!(size.is_power_of_two(), "ring size must be a power of two");
    let mask = size as SequenceId - 1;
    Arc::new(move |id| (id & mask) as usize)
}

/// Atomic monotonic sequence counter.
///
/// Starts at `-1` ("nothing processed yet"); [`Sequence::next`] increments
/// and returns the new value, so the first call yields `0`.
///
/// One writer per counter is enough for the pipeline hot path (the group
/// forwarder is the sole writer of `last_processed`), so plain
/// load/store cover it; [`Sequence::compare_and_set`] and
/// [`Sequence::add`] are there for callers that share a counter between
/// writers.
///
/// # Example
/// ```
/// use seqpipe::Sequence;
///
/// let seq = Sequence::new();
/// assert_eq!(seq.get(), -1);
/// assert_eq!(seq.next(), 0);
/// assert_eq!(seq.next(), 1);
/// assert_eq!(seq.add(3), 4);
/// ```
#[derive(Debug)]
pub struct Sequence {
    value: AtomicI64,
}

impl Sequence {
    /// Creates a counter holding the initial value `-1`.
    pub fn new() -> Self {
        Self {
            value: AtomicI64::new(INITIAL_SEQUENCE_VALUE),
        }
    }

    /// Reads the current value. Never blocks.
    pub fn get(&self) -> SequenceId {
        self.value.load(Ordering::SeqCst)
    }

    /// Stores a new value.
    pub fn set(&self, id: SequenceId) {
        self.value.store(id, Ordering::SeqCst);
    }

    /// Increments the counter and returns the post-increment value.
    pub fn next(&self) -> SequenceId {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Atomically replaces `expected` with `new`.
    ///
    /// Returns `true` when the swap happened. Monotonic use means there is
    /// no ABA concern.
    pub fn compare_and_set(&self, expected: SequenceId, new: SequenceId) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Adds `delta` via a CAS retry loop and returns the new value.
    pub fn add(&self, delta: SequenceId) -> SequenceId {
        loop {
            let current = self.get();
            let new = current + delta;
            if self.compare_and_set(current, new) {
                return new;
            }
        }
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_counter_holds_initial_value() {
        let seq = Sequence::new();
        assert_eq!(seq.get(), -1);
    }

    #[test]
    fn next_yields_zero_then_one() {
        let seq = Sequence::new();
        assert_eq!(seq.next(), 0);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.get(), 1);
    }

    #[test]
    fn add_from_one_yields_four() {
        let seq = Sequence::new();
        seq.set(1);
        assert_eq!(seq.add(3), 4);
        assert_eq!(seq.get(), 4);
    }

    #[test]
    fn compare_and_set_swaps_only_on_match() {
        let seq = Sequence::new();
        assert!(seq.compare_and_set(-1, 10));
        assert!(!seq.compare_and_set(-1, 20));
        assert_eq!(seq.get(), 10);
    }

    #[test]
    fn masked_index_wraps_at_size() {
        let f = masked_index(1024);
        assert_eq!(f(0), 0);
        assert_eq!(f(1023), 1023);
        assert_eq!(f(1024), 0);
        assert_eq!(f(4097), 1);
    }
}

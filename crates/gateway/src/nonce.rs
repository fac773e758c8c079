//! Nonce generators
//!
//! Implementations of the injected [`NonceProvider`] port: a wall-clock
//! seeded monotonic counter for production, and a deterministic sequence
//! for tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use iris_ports::NonceProvider;

/// Monotonic, process-unique nonce source seeded from the Unix epoch in
/// microseconds so restarts keep values strictly increasing
pub struct MonotonicNonce {
    counter: AtomicU64,
}

impl MonotonicNonce {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Self {
            counter: AtomicU64::new(seed),
        }
    }
}

impl Default for MonotonicNonce {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceProvider for MonotonicNonce {
    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Deterministic nonce sequence for tests
pub struct SequenceNonce {
    counter: AtomicU64,
}

impl SequenceNonce {
    pub fn starting_at(first: u64) -> Self {
        Self {
            counter: AtomicU64::new(first),
        }
    }
}

impl NonceProvider for SequenceNonce {
    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }
}

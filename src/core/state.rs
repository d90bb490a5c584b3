//! # Current leadership value.
//!
//! [`StateCell`] holds the single "am I the leader" boolean. The broadcaster is
//! the only writer (one `swap` per feed event); sessions read it to build the
//! initial snapshot for a new subscriber.

use std::sync::atomic::{AtomicBool, Ordering};

/// Atomic cell holding the current leadership value. Starts as `false`.
#[derive(Debug, Default)]
pub struct StateCell {
    is_leader: AtomicBool,
}

impl StateCell {
    /// Creates a cell holding `false`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value. Never blocks.
    #[inline]
    pub fn load(&self) -> bool {
        self.is_leader.load(Ordering::Acquire)
    }

    /// Stores `value` and returns the previously stored one.
    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.is_leader.swap(value, Ordering::AcqRel)
    }
}

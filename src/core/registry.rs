//! # Subscription registry.
//!
//! Tracks the currently active [`Subscription`]s and hands the broadcaster a
//! point-in-time snapshot for each fan-out round.
//!
//! ## Architecture
//! ```text
//! Session ──► register(sub) ─► slot ──┐               (write lock, append)
//! Session ──► remove(slot)  ──────────┼──► RwLock<Slots { next, BTreeMap<slot, Subscription> }>
//! Broadcaster ► snapshot() ───────────┘               (read lock, clone out)
//! ```
//!
//! ## Rules
//! - Slots are handed out under the write lock by `register`, so map order is
//!   registration order. Subscription ids are allocated earlier (at subscribe
//!   time) and do not decide the order.
//! - `snapshot()` copies out under the read lock and releases it before any
//!   delivery happens: registrations during a round are never blocked by it
//!   and only become visible from the next round.
//! - Cancelled entries are skipped by `snapshot()` and removed by their
//!   session on termination; the map holds live subscribers plus those mid-teardown.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::core::subscription::Subscription;

/// Registration slot; orders the registry.
pub type Slot = u64;

#[derive(Default)]
struct Slots {
    next: Slot,
    entries: BTreeMap<Slot, Subscription>,
}

/// Concurrent registry of active subscriptions.
#[derive(Default)]
pub struct SubscriptionRegistry {
    slots: RwLock<Slots>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next subscription id.
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Appends a subscription and returns its slot. Never waits on subscriber behavior.
    pub async fn register(&self, sub: Subscription) -> Slot {
        let mut slots = self.slots.write().await;
        let slot = slots.next;
        slots.next += 1;
        slots.entries.insert(slot, sub);
        slot
    }

    /// Removes the subscription registered at `slot`. Returns `true` if it was present.
    pub async fn remove(&self, slot: Slot) -> bool {
        self.slots.write().await.entries.remove(&slot).is_some()
    }

    /// Returns the live subscriptions in registration order.
    pub async fn snapshot(&self) -> Vec<Subscription> {
        self.slots
            .read()
            .await
            .entries
            .values()
            .filter(|s| !s.is_cancelled())
            .cloned()
            .collect()
    }

    /// Number of entries in the backing map (live or mid-teardown).
    pub async fn len(&self) -> usize {
        self.slots.read().await.entries.len()
    }

    /// Returns true if the registry holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.entries.is_empty()
    }
}

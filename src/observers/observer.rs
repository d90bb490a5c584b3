//! # Observer trait.
//!
//! Implement [`Observe`] to see the operational story of a runtime: leadership
//! transitions, subscribers joining and being evicted, stream requests, shutdown.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! use async_trait::async_trait;
//! use leadercast::{Event, EventKind, Observe};
//!
//! #[derive(Default)]
//! struct Evictions(AtomicU64);
//!
//! #[async_trait]
//! impl Observe for Evictions {
//!     async fn on_event(&self, _ev: &Event) {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!     }
//!
//!     fn interested(&self, kind: EventKind) -> bool {
//!         kind == EventKind::SubscriberEvicted
//!     }
//!
//!     fn name(&self) -> &'static str { "evictions" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

/// Runtime event observer.
///
/// Runs on its own worker with its own bounded queue: a slow observer only
/// loses its own events, and never delays leadership delivery.
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Handles one event. Must not block the executor.
    async fn on_event(&self, event: &Event);

    /// Whether events of `kind` should be queued for this observer at all.
    ///
    /// Default: every kind.
    fn interested(&self, kind: EventKind) -> bool {
        let _ = kind;
        true
    }

    /// Name used in overflow and panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity, clamped to at least 1. Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}

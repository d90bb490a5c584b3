//! # Runtime event bus.
//!
//! ```text
//! Broadcaster ─┐
//! Session N   ─┼─► Bus (broadcast ring) ─► ObserverSet::listen()
//! Gateway     ─┤                        └► any Bus::subscribe() receiver
//! Runtime     ─┘
//! ```
//!
//! Publishing is fire-and-forget and sits off the leadership delivery path.
//! Events published while nobody listens are gone; a receiver that falls more
//! than `capacity` events behind skips the oldest ones.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable handle to the runtime event channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus retaining up to `capacity` events (at least 1) per receiver.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes `ev`. Never waits.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

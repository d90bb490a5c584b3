//! # Subscription session: one subscriber's lifecycle.
//!
//! ```text
//! Created ──► deliver(state.load()) ──► Active ──► Terminated
//!   │              │ cancelled first        │
//!   │              └──────────────────────► Terminated (never registered)
//!   │                                       │
//!   │         slot = register(sub), then wait for the first of:
//!   │           - caller token cancelled      (subscriber departure)
//!   │           - subscription token cancelled (shutdown, eviction, stream dropped)
//!   └─ token = shutdown.child_token()        ▼
//!                                  cancel, remove(slot)
//! ```
//!
//! ## Rules
//! - The first value a subscriber sees is the state at the moment its session started.
//! - A subscriber cancelled before taking that value is never registered.
//! - Termination always cancels the subscription token, which ends the consumer's stream.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::broadcaster::Broadcaster;
use crate::core::subscription::{Delivery, LeaderStream, Subscription};
use crate::core::tracker::Tracker;
use crate::events::{Event, EventKind};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Channel allocated, initial value not yet taken.
    Created,
    /// Registered; receiving broadcasts.
    Active,
    /// Subscription cancelled and removed.
    Terminated,
}

/// One subscriber's session task.
pub(crate) struct Session {
    hub: Arc<Broadcaster>,
    sub: Subscription,
    caller: CancellationToken,
}

impl Session {
    /// Allocates the subscription; its token is a child of `shutdown`.
    pub(crate) fn open(
        hub: Arc<Broadcaster>,
        caller: CancellationToken,
        shutdown: &CancellationToken,
    ) -> (Session, LeaderStream) {
        let (sub, stream) = Subscription::pair(hub.registry().next_id(), shutdown.child_token());
        (Session { hub, sub, caller }, stream)
    }

    /// Drives the session to `Terminated`, returning the last state reached before it.
    pub(crate) async fn run(self) -> SessionState {
        let initial = self.hub.state().load();

        let delivered = tokio::select! {
            biased;
            _ = self.caller.cancelled() => Delivery::Cancelled,
            d = self.sub.deliver(initial) => d,
        };
        if delivered == Delivery::Cancelled {
            self.sub.cancel();
            return SessionState::Created;
        }

        let id = self.sub.id();
        let slot = self.hub.registry().register(self.sub.clone()).await;
        self.hub.bus().publish(
            Event::new(EventKind::SubscriberAdded)
                .with_subscription(id)
                .with_value(initial),
        );

        tokio::select! {
            _ = self.caller.cancelled() => {}
            _ = self.sub.cancelled() => {}
        }

        self.sub.cancel();
        self.hub.registry().remove(slot).await;
        self.hub
            .bus()
            .publish(Event::new(EventKind::SubscriberLeft).with_subscription(id));
        SessionState::Active
    }
}

/// Opens subscription sessions and tracks their tasks.
///
/// Cheap to clone; shared by the runtime and the gateway.
#[derive(Clone)]
pub struct Sessions {
    hub: Arc<Broadcaster>,
    tracker: Tracker,
    shutdown: CancellationToken,
}

impl Sessions {
    pub(crate) fn new(hub: Arc<Broadcaster>, tracker: Tracker, shutdown: CancellationToken) -> Self {
        Self {
            hub,
            tracker,
            shutdown,
        }
    }

    /// Subscribes to leadership updates.
    ///
    /// The returned stream yields the current value first, then every broadcast
    /// value, and ends when `caller` is cancelled, the stream is dropped, global
    /// shutdown fires, or the broadcaster evicts the subscriber.
    pub fn subscribe(&self, caller: CancellationToken) -> LeaderStream {
        let (session, stream) = Session::open(Arc::clone(&self.hub), caller, &self.shutdown);
        self.tracker.spawn(format!("session-{}", stream.id()), async move {
            session.run().await;
        });
        stream
    }

    /// The broadcaster these sessions attach to.
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.hub
    }

    pub(crate) fn bus(&self) -> &crate::events::Bus {
        self.hub.bus()
    }
}

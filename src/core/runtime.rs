//! # Runtime: wires the broadcaster, gateway and observers, and owns shutdown.
//!
//! ## High-level architecture
//! ```text
//! serve(feed, listener):
//!   observe(): ObserverSet::listen() ─► Bus.subscribe() ─► per-observer queues
//!   feed.start(tracker, root.child_token()) ─► mpsc::Receiver<bool>   (tracked as "feed")
//!   tracker.spawn("broadcaster", Broadcaster::run(rx, root))
//!   tracker.spawn("gateway",     tcp::serve(listener, gateway, tracker, root))
//!                                              └─► tracker.spawn("conn-<peer>", ...)
//!                                                    └─► tracker.spawn("session-<id>", ...)
//!
//! Shutdown path:
//!   wait_for_shutdown(root)   (OS signal, or Runtime::shutdown())
//!     └─► Bus.publish(ShutdownRequested)
//!     └─► root.cancel()      → broadcaster, acceptor, every session token
//!     └─► tracker.wait(cfg.grace):
//!            ├─ Ok       → Bus.publish(AllStoppedWithin)
//!            └─ Timeout  → Bus.publish(GraceExceeded), RuntimeError::GraceExceeded
//!     └─► observers drained and stopped
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use leadercast::{ChannelFeed, Config, Runtime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, feed) = ChannelFeed::channel(16);
//!     let rt = Runtime::builder(Config::default()).build();
//!
//!     tokio::spawn(async move {
//!         let _ = tx.send(true).await;
//!     });
//!     rt.run(feed).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::core::builder::RuntimeBuilder;
use crate::core::broadcaster::Broadcaster;
use crate::core::session::Sessions;
use crate::core::shutdown;
use crate::core::subscription::LeaderStream;
use crate::core::tracker::Tracker;
use crate::feed::LeaderFeed;
use crate::gateway::{Gateway, tcp};
use crate::observers::{Observe, ObserverHandle, ObserverSet};
use crate::{
    config::Config,
    error::RuntimeError,
    events::{Bus, Event, EventKind},
};

/// Process-level owner of the leadership broadcaster and its tasks.
pub struct Runtime {
    cfg: Config,
    bus: Bus,
    sessions: Sessions,
    tracker: Tracker,
    root: CancellationToken,
    observers: std::sync::Mutex<Vec<Arc<dyn Observe>>>,
}

impl Runtime {
    /// Starts building a runtime.
    pub fn builder(cfg: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        sessions: Sessions,
        tracker: Tracker,
        root: CancellationToken,
        observers: Vec<Arc<dyn Observe>>,
    ) -> Self {
        Self {
            cfg,
            bus,
            sessions,
            tracker,
            root,
            observers: std::sync::Mutex::new(observers),
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Event bus; `subscribe()` on it to observe runtime events directly.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The broadcaster (current value, subscriber count, phase).
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        self.sessions.broadcaster()
    }

    /// Gateway bound to this runtime's sessions, for custom transports.
    pub fn gateway(&self) -> Gateway {
        Gateway::new(self.sessions.clone())
    }

    /// Subscribes an in-process consumer. See [`Sessions::subscribe`].
    pub fn subscribe(&self, caller: CancellationToken) -> LeaderStream {
        self.sessions.subscribe(caller)
    }

    /// Requests graceful shutdown of a running runtime.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    /// Binds `cfg.listen` and serves until shutdown.
    pub async fn run<F: LeaderFeed>(&self, feed: F) -> Result<(), RuntimeError> {
        let listener = tcp::bind(self.cfg.listen)?;
        self.serve(feed, listener).await
    }

    /// Serves on an already bound listener until shutdown.
    ///
    /// Bind with [`tcp::bind`] so accepted connections get the small send
    /// buffer that lets a client which stops reading be evicted promptly.
    pub async fn serve<F: LeaderFeed>(
        &self,
        feed: F,
        listener: TcpListener,
    ) -> Result<(), RuntimeError> {
        let observers = self.observe();

        let rx = feed.start(&self.tracker, self.root.child_token());
        let hub = Arc::clone(self.sessions.broadcaster());
        let root = self.root.clone();
        self.tracker.spawn("broadcaster", async move {
            hub.run(rx, root).await;
        });

        self.tracker.spawn(
            "gateway",
            tcp::serve(
                listener,
                self.gateway(),
                self.tracker.clone(),
                self.root.clone(),
            ),
        );

        shutdown::wait_for_shutdown(&self.root).await;
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.root.cancel();

        let res = self.wait_all_with_grace().await;

        if let Some(observers) = observers {
            observers.stop().await;
        }
        res
    }

    /// Starts the observer set on the bus, if any observers were registered.
    fn observe(&self) -> Option<ObserverHandle> {
        let observers = std::mem::take(
            &mut *self
                .observers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        if observers.is_empty() {
            return None;
        }
        Some(ObserverSet::new(observers, self.bus.clone()).listen())
    }

    /// Waits for every tracked task within the configured grace period.
    async fn wait_all_with_grace(&self) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        match self.tracker.wait(grace).await {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(stuck) => {
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(format!("stuck: {stuck:?}")),
                );
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }
}

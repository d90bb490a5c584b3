//! # Gateway: one stream request → one subscription session.
//!
//! ```text
//! request ──► Gateway::handle(caller, sink)
//!               ├─► sessions.subscribe(caller) ──► LeaderStream   (StreamOpened)
//!               ├─► loop: recv value ──► sink.send({ is_leader })  within slow_client_timeout
//!               │                          ├─ Err     → cancel caller, Transport error
//!               │                          └─ timeout → cancel caller, SubscriberEvicted
//!               └─► stream ended ──► Ok(())
//!             ──► StreamClosed { duration, error }
//!
//! panic anywhere inside ──► caught ──► GatewayPanicked event ──► Internal error
//! ```
//!
//! A write that does not complete within the slow-client timeout means the peer
//! stopped reading; it is treated as eviction, the same as a subscriber that does
//! not take a value from its stream.
//!
//! The transport is abstracted by [`MessageSink`]; [`tcp`] provides a
//! newline-delimited JSON endpoint on top of it.

pub mod tcp;

use std::io;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::{LeaderStream, Sessions};
use crate::error::GatewayError;
use crate::events::{Bus, Event, EventKind};
use crate::observers::panic_message;

/// One outbound protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderMessage {
    pub is_leader: bool,
}

/// Outbound half of a stream transport.
#[async_trait]
pub trait MessageSink: Send {
    /// Writes one message. An error ends the stream.
    async fn send(&mut self, msg: LeaderMessage) -> io::Result<()>;
}

/// Adapter between stream requests and subscription sessions.
#[derive(Clone)]
pub struct Gateway {
    sessions: Sessions,
}

impl Gateway {
    pub fn new(sessions: Sessions) -> Self {
        Self { sessions }
    }

    /// Serves one subscribe request until the subscription ends.
    ///
    /// Returns `Ok(())` on a normal end of stream (departure, shutdown,
    /// eviction), `Transport` if writing to `sink` failed, and `Internal` if the
    /// handler panicked.
    pub async fn handle<S>(&self, caller: CancellationToken, sink: &mut S) -> Result<(), GatewayError>
    where
        S: MessageSink + ?Sized,
    {
        self.handle_from(None, caller, sink).await
    }

    /// Same as [`Gateway::handle`], tagging the request events with the peer address.
    pub async fn handle_from<S>(
        &self,
        peer: Option<&str>,
        caller: CancellationToken,
        sink: &mut S,
    ) -> Result<(), GatewayError>
    where
        S: MessageSink + ?Sized,
    {
        let started = Instant::now();
        let stream = self.sessions.subscribe(caller.clone());
        let request = stream.id();

        let mut opened = Event::new(EventKind::StreamOpened).with_subscription(request);
        if let Some(peer) = peer {
            opened = opened.with_reason(peer);
        }
        self.bus().publish(opened);

        let relay = self.relay(stream, &caller, sink);
        let res = match std::panic::AssertUnwindSafe(relay).catch_unwind().await {
            Ok(res) => res,
            Err(panic) => {
                caller.cancel();
                self.bus().publish(
                    Event::new(EventKind::GatewayPanicked)
                        .with_subscription(request)
                        .with_reason(panic_message(&*panic)),
                );
                Err(GatewayError::Internal)
            }
        };

        let mut closed = Event::new(EventKind::StreamClosed)
            .with_subscription(request)
            .with_duration(started.elapsed());
        if let Err(e) = &res {
            closed = closed.with_reason(e.to_string());
        }
        self.bus().publish(closed);
        res
    }

    async fn relay<S>(
        &self,
        mut stream: LeaderStream,
        caller: &CancellationToken,
        sink: &mut S,
    ) -> Result<(), GatewayError>
    where
        S: MessageSink + ?Sized,
    {
        let write_timeout = self.sessions.broadcaster().slow_client_timeout();

        while let Some(is_leader) = stream.recv().await {
            match tokio::time::timeout(write_timeout, sink.send(LeaderMessage { is_leader })).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    caller.cancel();
                    self.bus().publish(
                        Event::new(EventKind::GatewayTransportFailed)
                            .with_subscription(stream.id())
                            .with_reason(e.to_string()),
                    );
                    return Err(GatewayError::Transport(e));
                }
                Err(_elapsed) => {
                    caller.cancel();
                    self.bus().publish(
                        Event::new(EventKind::SubscriberEvicted)
                            .with_subscription(stream.id())
                            .with_timeout(write_timeout),
                    );
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn bus(&self) -> &Bus {
        self.sessions.bus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::{Broadcaster, Tracker};
    use crate::events::Bus;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct ChanSink(mpsc::UnboundedSender<LeaderMessage>);

    #[async_trait]
    impl MessageSink for ChanSink {
        async fn send(&mut self, msg: LeaderMessage) -> io::Result<()> {
            self.0
                .send(msg)
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    struct FailingSink;

    #[async_trait]
    impl MessageSink for FailingSink {
        async fn send(&mut self, _msg: LeaderMessage) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::ConnectionReset))
        }
    }

    struct PanickingSink;

    #[async_trait]
    impl MessageSink for PanickingSink {
        async fn send(&mut self, _msg: LeaderMessage) -> io::Result<()> {
            panic!("sink exploded");
        }
    }

    struct StalledSink;

    #[async_trait]
    impl MessageSink for StalledSink {
        async fn send(&mut self, _msg: LeaderMessage) -> io::Result<()> {
            std::future::pending().await
        }
    }

    async fn next_of(events: &mut tokio::sync::broadcast::Receiver<Event>, kind: EventKind) -> Event {
        loop {
            let ev = events.recv().await.unwrap();
            if ev.kind == kind {
                return ev;
            }
        }
    }

    fn setup() -> (Gateway, Bus, Tracker, CancellationToken) {
        let bus = Bus::new(64);
        let hub = Broadcaster::new(&Config::default(), bus.clone());
        let tracker = Tracker::new();
        let shutdown = CancellationToken::new();
        let sessions = Sessions::new(Arc::clone(&hub), tracker.clone(), shutdown.clone());
        (Gateway::new(sessions), bus, tracker, shutdown)
    }

    #[tokio::test]
    async fn test_relays_initial_value_and_ends_on_departure() {
        let (gw, _bus, tracker, _shutdown) = setup();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let caller = CancellationToken::new();

        let c = caller.clone();
        let handler = tokio::spawn(async move { gw.handle(c, &mut ChanSink(tx)).await });

        assert_eq!(rx.recv().await, Some(LeaderMessage { is_leader: false }));
        caller.cancel();
        assert!(handler.await.unwrap().is_ok());
        assert!(tracker.wait(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_transport_failure_cancels_session() {
        let (gw, bus, tracker, _shutdown) = setup();
        let mut events = bus.subscribe();
        let caller = CancellationToken::new();

        let err = gw.handle(caller.clone(), &mut FailingSink).await.unwrap_err();
        assert_eq!(err.as_label(), "gateway_transport");
        assert!(caller.is_cancelled());
        assert!(tracker.wait(Duration::from_secs(1)).await.is_ok());

        let failed = next_of(&mut events, EventKind::GatewayTransportFailed).await;
        let closed = next_of(&mut events, EventKind::StreamClosed).await;
        assert_eq!(closed.subscription, failed.subscription);
        assert!(closed.reason.is_some());
    }

    #[tokio::test]
    async fn test_stream_lifecycle_events_share_request_id() {
        let (gw, bus, _tracker, _shutdown) = setup();
        let mut events = bus.subscribe();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let caller = CancellationToken::new();

        let c = caller.clone();
        let handler = tokio::spawn(async move {
            gw.handle_from(Some("10.0.0.1:5000"), c, &mut ChanSink(tx)).await
        });
        assert!(rx.recv().await.is_some());
        caller.cancel();
        assert!(handler.await.unwrap().is_ok());

        let opened = next_of(&mut events, EventKind::StreamOpened).await;
        assert_eq!(opened.reason.as_deref(), Some("10.0.0.1:5000"));
        let closed = next_of(&mut events, EventKind::StreamClosed).await;
        assert_eq!(closed.subscription, opened.subscription);
        assert!(closed.duration_ms.is_some());
        assert!(closed.reason.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_is_eviction() {
        let (gw, bus, tracker, _shutdown) = setup();
        let mut events = bus.subscribe();
        let caller = CancellationToken::new();

        assert!(gw.handle(caller.clone(), &mut StalledSink).await.is_ok());
        assert!(caller.is_cancelled());

        let evicted = next_of(&mut events, EventKind::SubscriberEvicted).await;
        assert_eq!(evicted.timeout_ms, Some(5000));
        assert!(tracker.wait(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_panic_is_recovered() {
        let (gw, bus, tracker, _shutdown) = setup();
        let mut events = bus.subscribe();
        let caller = CancellationToken::new();

        let err = gw.handle(caller.clone(), &mut PanickingSink).await.unwrap_err();
        assert_eq!(err.to_string(), "internal server error");
        assert!(tracker.wait(Duration::from_secs(1)).await.is_ok());

        let ev = next_of(&mut events, EventKind::GatewayPanicked).await;
        assert_eq!(ev.reason.as_deref(), Some("sink exploded"));
        let closed = next_of(&mut events, EventKind::StreamClosed).await;
        assert_eq!(closed.reason.as_deref(), Some("internal server error"));
    }

    #[tokio::test]
    async fn test_shutdown_ends_stream_without_error() {
        let (gw, _bus, _tracker, shutdown) = setup();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handler =
            tokio::spawn(async move { gw.handle(CancellationToken::new(), &mut ChanSink(tx)).await });
        assert!(rx.recv().await.is_some());

        shutdown.cancel();
        assert!(handler.await.unwrap().is_ok());
    }
}

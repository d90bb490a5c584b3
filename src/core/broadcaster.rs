//! # Broadcaster: the leadership fan-out loop.
//!
//! Consumes the upstream feed, stores each value in the [`StateCell`] and
//! delivers it to every subscription in the registry snapshot, evicting
//! subscribers that do not accept a value within the slow-client timeout.
//!
//! ## Lifecycle
//! ```text
//! Running ──(shutdown | feed closed)──► Draining ──(loop exits)──► Stopped
//!
//! loop {
//!   ├─► v = feed.recv()                      (or shutdown / feed closed → exit)
//!   ├─► old = state.swap(v)
//!   ├─► if old != v → publish LeaderChanged  (notice only, never gates delivery)
//!   ├─► subs = registry.snapshot()
//!   └─► fan-out v to subs; per subscriber, first of:
//!          ├─ shutdown        → abort the round, exit loop
//!          ├─ timeout elapsed → cancel subscriber (eviction), go on
//!          └─ accepted        → go on
//! }
//! ```
//!
//! ## Rules
//! - Rounds are never pipelined: the next feed value is read only after the
//!   current round settles, so every surviving subscriber sees feed order.
//! - Values are not deduplicated on the delivery path; repeats are delivered.
//! - Each subscriber gets at most one attempt per value; a miss is not retried.
//! - Eviction or departure of one subscriber never stops the round for the others.
//! - Exiting the loop does not unregister anyone; sessions end on their own tokens.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Fanout};
use crate::core::registry::SubscriptionRegistry;
use crate::core::state::StateCell;
use crate::core::subscription::{Delivery, Subscription};
use crate::events::{Bus, Event, EventKind};

/// Broadcaster loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for feed values and fanning them out.
    Running,
    /// Shutdown or feed closure observed; loop is winding down.
    Draining,
    /// Loop body has exited.
    Stopped,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Phase::Running,
            1 => Phase::Draining,
            _ => Phase::Stopped,
        }
    }
}

/// Why the broadcaster loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcasterExit {
    /// Global shutdown fired.
    Shutdown,
    /// The upstream feed closed.
    FeedClosed,
}

/// Per-round delivery summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Subscribers that accepted the value.
    pub delivered: usize,
    /// Subscribers evicted for slowness.
    pub evicted: usize,
    /// Subscribers already gone when their turn came.
    pub skipped: usize,
    /// Subscribers never reached because shutdown aborted the round.
    pub pending: usize,
    /// `true` if shutdown cut the round short.
    pub aborted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Evicted,
    Skipped,
}

impl RoundReport {
    fn tally(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Delivered => self.delivered += 1,
            Outcome::Evicted => self.evicted += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }
}

/// Owns the leadership state and the subscription registry, and runs the fan-out loop.
pub struct Broadcaster {
    state: StateCell,
    registry: SubscriptionRegistry,
    bus: Bus,
    slow_client_timeout: Duration,
    fanout: Fanout,
    phase: AtomicU8,
}

impl Broadcaster {
    /// Creates a broadcaster with state `false` and an empty registry.
    pub fn new(cfg: &Config, bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            state: StateCell::new(),
            registry: SubscriptionRegistry::new(),
            bus,
            slow_client_timeout: cfg.slow_client_timeout,
            fanout: cfg.fanout,
            phase: AtomicU8::new(Phase::Running as u8),
        })
    }

    /// Current leadership value.
    pub fn current(&self) -> bool {
        self.state.load()
    }

    /// Time a subscriber has to take a value before it is evicted.
    pub fn slow_client_timeout(&self) -> Duration {
        self.slow_client_timeout
    }

    /// Current loop phase.
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Number of registry entries (live or mid-teardown).
    pub async fn subscriber_count(&self) -> usize {
        self.registry.len().await
    }

    pub(crate) fn state(&self) -> &StateCell {
        &self.state
    }

    pub(crate) fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Runs the loop until `shutdown` fires or `feed` closes.
    pub async fn run(
        self: Arc<Self>,
        mut feed: mpsc::Receiver<bool>,
        shutdown: CancellationToken,
    ) -> BroadcasterExit {
        self.set_phase(Phase::Running);

        let exit = loop {
            let value = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break BroadcasterExit::Shutdown,
                v = feed.recv() => match v {
                    Some(v) => v,
                    None => {
                        self.bus.publish(Event::new(EventKind::FeedClosed));
                        break BroadcasterExit::FeedClosed;
                    }
                },
            };

            if self.broadcast(value, &shutdown).await.aborted {
                break BroadcasterExit::Shutdown;
            }
        };

        self.set_phase(Phase::Draining);
        self.set_phase(Phase::Stopped);
        exit
    }

    /// Processes one feed value: swap, change notice, snapshot, fan-out.
    pub async fn broadcast(&self, value: bool, shutdown: &CancellationToken) -> RoundReport {
        let old = self.state.swap(value);
        if old != value {
            self.bus
                .publish(Event::new(EventKind::LeaderChanged).with_transition(old, value));
        }

        let subs = self.registry.snapshot().await;
        let report = match self.fanout {
            Fanout::Sequential => self.fanout_sequential(&subs, value, shutdown).await,
            Fanout::Concurrent => self.fanout_concurrent(&subs, value, shutdown).await,
        };

        if report.aborted {
            self.bus.publish(
                Event::new(EventKind::FanoutAborted)
                    .with_value(value)
                    .with_pending(report.pending),
            );
        }
        report
    }

    async fn fanout_sequential(
        &self,
        subs: &[Subscription],
        value: bool,
        shutdown: &CancellationToken,
    ) -> RoundReport {
        let mut report = RoundReport::default();

        for (i, sub) in subs.iter().enumerate() {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    report.aborted = true;
                    report.pending = subs.len() - i;
                    break;
                }
                outcome = self.deliver_one(sub, value) => report.tally(outcome),
            }
        }
        report
    }

    /// One delivery future (and timer) per subscriber, all polled within this round.
    async fn fanout_concurrent(
        &self,
        subs: &[Subscription],
        value: bool,
        shutdown: &CancellationToken,
    ) -> RoundReport {
        let mut report = RoundReport::default();
        let mut group: FuturesUnordered<_> =
            subs.iter().map(|sub| self.deliver_one(sub, value)).collect();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    report.aborted = true;
                    report.pending = group.len();
                    break;
                }
                next = group.next() => match next {
                    Some(outcome) => report.tally(outcome),
                    None => break,
                },
            }
        }
        report
    }

    async fn deliver_one(&self, sub: &Subscription, value: bool) -> Outcome {
        match tokio::time::timeout(self.slow_client_timeout, sub.deliver(value)).await {
            Ok(Delivery::Accepted) => Outcome::Delivered,
            Ok(Delivery::Cancelled) => Outcome::Skipped,
            Err(_elapsed) => {
                sub.cancel();
                self.bus.publish(
                    Event::new(EventKind::SubscriberEvicted)
                        .with_subscription(sub.id())
                        .with_timeout(self.slow_client_timeout),
                );
                Outcome::Evicted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(fanout: Fanout) -> Config {
        Config {
            slow_client_timeout: Duration::from_millis(100),
            fanout,
            ..Config::default()
        }
    }

    async fn registered(hub: &Broadcaster) -> (Subscription, crate::core::LeaderStream) {
        let (sub, stream) =
            Subscription::pair(hub.registry().next_id(), CancellationToken::new());
        hub.registry().register(sub.clone()).await;
        (sub, stream)
    }

    #[tokio::test]
    async fn test_change_notice_only_on_transition() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let hub = Broadcaster::new(&config(Fanout::Sequential), bus);
        let shutdown = CancellationToken::new();

        hub.broadcast(true, &shutdown).await;
        hub.broadcast(true, &shutdown).await;
        hub.broadcast(false, &shutdown).await;

        let ev = rx.recv().await.unwrap();
        assert_eq!((ev.kind, ev.from, ev.to), (EventKind::LeaderChanged, Some(false), Some(true)));
        let ev = rx.recv().await.unwrap();
        assert_eq!((ev.kind, ev.from, ev.to), (EventKind::LeaderChanged, Some(true), Some(false)));
        assert!(rx.try_recv().is_err());
        assert!(!hub.current());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_eviction_does_not_stop_round() {
        let hub = Broadcaster::new(&config(Fanout::Sequential), Bus::new(16));
        let shutdown = CancellationToken::new();

        let (slow, _slow_stream) = registered(&hub).await;
        let (_fast, mut fast_stream) = registered(&hub).await;

        let reader = tokio::spawn(async move { fast_stream.recv().await });
        let report = hub.broadcast(true, &shutdown).await;

        assert_eq!(report.evicted, 1);
        assert_eq!(report.delivered, 1);
        assert!(slow.is_cancelled());
        assert_eq!(reader.await.unwrap(), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_round_is_not_delayed_by_slow_subscriber() {
        let hub = Broadcaster::new(&config(Fanout::Concurrent), Bus::new(16));
        let shutdown = CancellationToken::new();

        let (_slow, _slow_stream) = registered(&hub).await;
        let (_fast, mut fast_stream) = registered(&hub).await;

        let start = tokio::time::Instant::now();
        let reader = tokio::spawn(async move {
            let v = fast_stream.recv().await;
            (v, start.elapsed())
        });
        let report = hub.broadcast(true, &shutdown).await;

        let (v, waited) = reader.await.unwrap();
        assert_eq!(v, Some(true));
        assert!(waited < Duration::from_millis(100));
        assert_eq!(report.evicted, 1);
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_round() {
        let hub = Broadcaster::new(&config(Fanout::Sequential), Bus::new(16));
        let shutdown = CancellationToken::new();

        let (_a, _sa) = registered(&hub).await;
        let (_b, _sb) = registered(&hub).await;

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let report = hub.broadcast(true, &shutdown).await;

        assert!(report.aborted);
        assert_eq!(report.pending, 2);
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn test_cancelled_subscriber_is_skipped() {
        let hub = Broadcaster::new(&config(Fanout::Sequential), Bus::new(16));
        let (gone, stream) = registered(&hub).await;
        drop(stream);

        let report = hub.broadcast(true, &CancellationToken::new()).await;
        assert!(gone.is_cancelled());
        assert_eq!(report, RoundReport::default());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let hub = Broadcaster::new(&config(Fanout::Concurrent), Bus::new(16));
        let (tx, rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&hub).run(rx, shutdown.clone()));

        tx.send(true).await.unwrap();
        while !hub.current() {
            tokio::task::yield_now().await;
        }
        shutdown.cancel();

        assert_eq!(task.await.unwrap(), BroadcasterExit::Shutdown);
        assert_eq!(hub.phase(), Phase::Stopped);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_round_registration_joins_next_round() {
        let hub = Broadcaster::new(&config(Fanout::Sequential), Bus::new(16));
        let shutdown = CancellationToken::new();
        let (_slow, _slow_stream) = registered(&hub).await;

        let round_hub = Arc::clone(&hub);
        let round_stop = shutdown.clone();
        let round = tokio::spawn(async move { round_hub.broadcast(true, &round_stop).await });

        // round is now waiting on the slow subscriber
        tokio::time::sleep(Duration::from_millis(10)).await;
        let (_late, mut late_stream) = registered(&hub).await;

        let report = round.await.unwrap();
        assert_eq!((report.delivered, report.evicted), (0, 1));

        let reader = tokio::spawn(async move { late_stream.recv().await });
        let report = hub.broadcast(false, &shutdown).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(reader.await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_run_stops_on_feed_close() {
        let hub = Broadcaster::new(&config(Fanout::Concurrent), Bus::new(16));
        let (tx, rx) = mpsc::channel(4);
        tx.send(true).await.unwrap();
        drop(tx);

        let exit = Arc::clone(&hub).run(rx, CancellationToken::new()).await;
        assert_eq!(exit, BroadcasterExit::FeedClosed);
        assert_eq!(hub.phase(), Phase::Stopped);
        assert!(hub.current());
    }
}

//! # Runtime events emitted by the broadcaster, sessions, gateway and runtime.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Leadership events**: state-change notices and feed lifecycle
//! - **Subscription events**: subscribers joining, leaving, being evicted
//! - **Gateway events**: connections and stream requests, including their failures
//! - **Shutdown events**: graceful termination progress
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! subscription ids, leadership values and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use leadercast::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::LeaderChanged).with_transition(false, true);
//!
//! assert_eq!(ev.kind, EventKind::LeaderChanged);
//! assert_eq!(ev.from, Some(false));
//! assert_eq!(ev.to, Some(true));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Leadership events ===
    /// Leadership value differs from the previously stored one.
    ///
    /// Sets:
    /// - `from`: previous value
    /// - `to`: new value
    LeaderChanged,

    /// Upstream feed closed; the broadcaster loop is stopping.
    FeedClosed,

    /// A fan-out round was cut short by global shutdown.
    ///
    /// Sets:
    /// - `to`: value that was being delivered
    /// - `pending`: subscribers the round never reached
    FanoutAborted,

    // === Subscription events ===
    /// Subscriber received its initial value and joined the registry.
    ///
    /// Sets:
    /// - `subscription`: subscription id
    /// - `to`: initial value delivered
    SubscriberAdded,

    /// Subscriber session terminated (departure, shutdown or after eviction).
    ///
    /// Sets:
    /// - `subscription`: subscription id
    SubscriberLeft,

    /// Subscriber did not accept a value within the slow-client timeout.
    ///
    /// Sets:
    /// - `subscription`: subscription id
    /// - `timeout_ms`: configured slow-client timeout (ms)
    SubscriberEvicted,

    // === Gateway events ===
    /// Gateway accepted a transport connection.
    ///
    /// Sets:
    /// - `reason`: peer address
    ConnectionAccepted,

    /// A stream request started serving.
    ///
    /// Sets:
    /// - `subscription`: subscription id, doubles as the request id
    /// - `reason`: peer address, if the transport knows it
    StreamOpened,

    /// A stream request finished.
    ///
    /// Sets:
    /// - `subscription`: subscription id (request id)
    /// - `duration_ms`: time the stream was open
    /// - `reason`: handler error, absent on a normal end of stream
    StreamClosed,

    /// Writing a message to the transport failed.
    ///
    /// Sets:
    /// - `subscription`: subscription id, if known
    /// - `reason`: transport error
    GatewayTransportFailed,

    /// Request handler panicked; recovered at the gateway boundary.
    ///
    /// Sets:
    /// - `reason`: panic payload
    GatewayPanicked,

    // === Observer events ===
    /// Observer panicked during event processing.
    ///
    /// Sets:
    /// - `observer`: observer name
    /// - `reason`: panic info/message
    ObserverPanicked,

    /// Observer dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `observer`: observer name
    /// - `reason`: reason string (e.g., "full", "closed")
    ObserverOverflow,

    // === Shutdown events ===
    /// Shutdown requested (OS signal or explicit call).
    ShutdownRequested,

    /// All tracked tasks stopped within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some tasks did not stop in time.
    GraceExceeded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Subscription id, if applicable.
    pub subscription: Option<u64>,
    /// Previous leadership value.
    pub from: Option<bool>,
    /// New (or delivered) leadership value.
    pub to: Option<bool>,
    /// Slow-client timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Elapsed time in milliseconds.
    pub duration_ms: Option<u64>,
    /// Number of subscribers left undelivered.
    pub pending: Option<usize>,
    /// Observer name, if applicable.
    pub observer: Option<&'static str>,
    /// Human-readable reason (errors, peers, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            subscription: None,
            from: None,
            to: None,
            timeout_ms: None,
            duration_ms: None,
            pending: None,
            observer: None,
            reason: None,
        }
    }

    /// Attaches a subscription id.
    #[inline]
    pub fn with_subscription(mut self, id: u64) -> Self {
        self.subscription = Some(id);
        self
    }

    /// Attaches an old → new leadership transition.
    #[inline]
    pub fn with_transition(mut self, from: bool, to: bool) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Attaches the leadership value concerned by this event.
    #[inline]
    pub fn with_value(mut self, value: bool) -> Self {
        self.to = Some(value);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches an elapsed duration (stored as milliseconds).
    #[inline]
    pub fn with_duration(mut self, d: Duration) -> Self {
        self.duration_ms = Some(d.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    /// Attaches the count of undelivered subscribers.
    #[inline]
    pub fn with_pending(mut self, n: usize) -> Self {
        self.pending = Some(n);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates an observer overflow event.
    #[inline]
    pub fn observer_overflow(observer: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::ObserverOverflow)
            .with_reason(format!("observer={observer} reason={reason}"));
        ev.observer = Some(observer);
        ev
    }

    /// Creates an observer panic event.
    #[inline]
    pub fn observer_panicked(observer: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::ObserverPanicked).with_reason(info);
        ev.observer = Some(observer);
        ev
    }

    #[inline]
    pub fn is_observer_overflow(&self) -> bool {
        matches!(self.kind, EventKind::ObserverOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::FeedClosed);
        let b = Event::new(EventKind::FeedClosed);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_timeout_clamps_to_u32() {
        let ev = Event::new(EventKind::SubscriberEvicted)
            .with_timeout(Duration::from_millis(u64::MAX));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
    }

    #[test]
    fn test_stream_closed_carries_duration_and_error() {
        let ev = Event::new(EventKind::StreamClosed)
            .with_subscription(7)
            .with_duration(Duration::from_millis(1500))
            .with_reason("broken pipe");
        assert_eq!(ev.subscription, Some(7));
        assert_eq!(ev.duration_ms, Some(1500));
        assert_eq!(ev.reason.as_deref(), Some("broken pipe"));
    }

    #[test]
    fn test_overflow_helper_sets_observer() {
        let ev = Event::observer_overflow("metrics", "full");
        assert!(ev.is_observer_overflow());
        assert_eq!(ev.observer, Some("metrics"));
        assert_eq!(ev.reason.as_deref(), Some("observer=metrics reason=full"));
    }
}

//! # Subscription handle and delivery channel.
//!
//! A subscription is a pair of halves sharing one [`CancellationToken`]:
//! - [`Subscription`]: producer side, held by the registry and its session;
//! - [`LeaderStream`]: consumer side, handed to whoever subscribed.
//!
//! ## Handoff
//! ```text
//! deliver(v) ──► reserve slot ──► send Handoff{v, ack} ──► wait ack
//!                                                            ▲
//! LeaderStream::recv() ──────────── take Handoff ───────── ack ┘
//! ```
//! A delivery completes only when the consumer has actually taken the value,
//! so the broadcaster's slow-client timeout measures the consumer, not a buffer.
//!
//! ## Rules
//! - Once the token is cancelled, `deliver` is a no-op and `recv` returns `None`.
//! - Dropping the [`LeaderStream`] cancels the token (subscriber departure).
//! - A handoff whose sender gave up (eviction, shutdown) is never surfaced to the consumer.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};

struct Handoff {
    value: bool,
    ack: oneshot::Sender<()>,
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The consumer took the value.
    Accepted,
    /// The subscription is (or became) cancelled; nothing was delivered.
    Cancelled,
}

/// Producer half of a subscription.
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    tx: mpsc::Sender<Handoff>,
    token: CancellationToken,
}

impl Subscription {
    /// Creates both halves of a subscription bound to `token`.
    pub(crate) fn pair(id: u64, token: CancellationToken) -> (Subscription, LeaderStream) {
        let (tx, rx) = mpsc::channel(1);
        let sub = Subscription {
            id,
            tx,
            token: token.clone(),
        };
        let stream = LeaderStream {
            id,
            rx,
            _guard: token.clone().drop_guard(),
            token,
        };
        (sub, stream)
    }

    /// Subscription id (unique per runtime, allocated at subscribe time).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns `true` once the subscription was cancelled by any party.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancels the subscription. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Resolves when the subscription is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Hands `value` to the consumer and waits until it has been taken.
    ///
    /// Not bounded in time; callers race it against their own timer.
    pub(crate) async fn deliver(&self, value: bool) -> Delivery {
        if self.token.is_cancelled() {
            return Delivery::Cancelled;
        }

        let handoff = async {
            let permit = self.tx.reserve().await.ok()?;
            let (ack, acked) = oneshot::channel();
            permit.send(Handoff { value, ack });
            acked.await.ok()
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Delivery::Cancelled,
            res = handoff => match res {
                Some(()) => Delivery::Accepted,
                None => Delivery::Cancelled,
            },
        }
    }
}

/// Consumer half of a subscription: yields the initial value, then every
/// value broadcast while the subscription is alive.
///
/// `recv` returning `None` is the ordinary end of stream, whatever ended it
/// (departure, global shutdown, or eviction for slowness).
pub struct LeaderStream {
    id: u64,
    rx: mpsc::Receiver<Handoff>,
    token: CancellationToken,
    // cancels the subscription when the consumer goes away
    _guard: DropGuard,
}

impl LeaderStream {
    /// Subscription id this stream belongs to.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receives the next leadership value, or `None` once the subscription ended.
    pub async fn recv(&mut self) -> Option<bool> {
        if self.token.is_cancelled() {
            self.rx.close();
            return None;
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                self.rx.close();
                None
            }
            msg = self.rx.recv() => {
                let handoff = msg?;
                match handoff.ack.send(()) {
                    Ok(()) => Some(handoff.value),
                    // producer abandoned the handoff; the subscription is being torn down
                    Err(()) => {
                        self.rx.close();
                        None
                    }
                }
            }
        }
    }

    /// Ends the subscription from the consumer side.
    pub fn close(&mut self) {
        self.token.cancel();
        self.rx.close();
    }

    /// Token shared with the producer half.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

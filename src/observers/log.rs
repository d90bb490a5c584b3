//! # LogWriter: renders runtime events through `tracing`.
//!
//! ## Example output (compact formatter)
//! ```text
//! INFO  leadercast: leadership changed from=false to=true
//! INFO  leadercast: handling stream request request_id=Some(3) peer=Some("127.0.0.1:50412")
//! INFO  leadercast: subscriber added subscription=3 initial=true
//! WARN  leadercast: slow subscriber evicted subscription=4 timeout_ms=5000
//! INFO  leadercast: subscriber left subscription=4
//! INFO  leadercast: stream closed request_id=Some(4) duration_ms=Some(5012)
//! INFO  leadercast: feed closed
//! INFO  leadercast: shutdown requested
//! ERROR leadercast: grace exceeded reason="stuck: [\"session-7\"]"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::observers::Observe;

/// Event writer observer.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Observe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::LeaderChanged => {
                info!(target: "leadercast", from = ?e.from, to = ?e.to, "leadership changed");
            }
            EventKind::FeedClosed => {
                info!(target: "leadercast", "feed closed");
            }
            EventKind::FanoutAborted => {
                info!(target: "leadercast", value = ?e.to, pending = ?e.pending, "fan-out aborted by shutdown");
            }
            EventKind::SubscriberAdded => {
                info!(target: "leadercast", subscription = ?e.subscription, initial = ?e.to, "subscriber added");
            }
            EventKind::SubscriberLeft => {
                info!(target: "leadercast", subscription = ?e.subscription, "subscriber left");
            }
            EventKind::SubscriberEvicted => {
                warn!(target: "leadercast", subscription = ?e.subscription, timeout_ms = ?e.timeout_ms, "slow subscriber evicted");
            }
            EventKind::ConnectionAccepted => {
                debug!(target: "leadercast", peer = ?e.reason, "connection accepted");
            }
            EventKind::StreamOpened => {
                info!(target: "leadercast", request_id = ?e.subscription, peer = ?e.reason, "handling stream request");
            }
            EventKind::StreamClosed => match &e.reason {
                Some(err) => {
                    error!(target: "leadercast", request_id = ?e.subscription, duration_ms = ?e.duration_ms, err = %err, "cannot handle request");
                }
                None => {
                    info!(target: "leadercast", request_id = ?e.subscription, duration_ms = ?e.duration_ms, "stream closed");
                }
            },
            EventKind::GatewayTransportFailed => {
                warn!(target: "leadercast", subscription = ?e.subscription, err = ?e.reason, "cannot send to response stream");
            }
            EventKind::GatewayPanicked => {
                error!(target: "leadercast", panic = ?e.reason, "panic during handling stream request");
            }
            EventKind::ObserverOverflow => {
                warn!(target: "leadercast", observer = ?e.observer, reason = ?e.reason, "observer overflow");
            }
            EventKind::ObserverPanicked => {
                error!(target: "leadercast", observer = e.observer.unwrap_or("unknown"), info = e.reason.as_deref().unwrap_or("unknown"), "observer panicked");
            }
            EventKind::ShutdownRequested => {
                info!(target: "leadercast", "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                info!(target: "leadercast", "all tasks stopped within grace");
            }
            EventKind::GraceExceeded => {
                error!(target: "leadercast", reason = ?e.reason, "grace exceeded");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

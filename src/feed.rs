//! # Upstream leadership feed.
//!
//! The election algorithm itself lives elsewhere; this crate only consumes its
//! output as a channel of booleans. A [`LeaderFeed`] is started with the
//! runtime's [`Tracker`] and a cancellation token and returns that channel; the
//! channel closes when the token is cancelled or the source ends. Values may repeat.
//!
//! Provided feeds:
//! - [`ChannelFeed`]: wraps a receiver you already have (embedding, tests);
//! - [`LinesFeed`]: parses one value per line from an async reader;
//! - [`StdinFeed`]: parses lines from the process's standard input, e.g. the
//!   stdout of an election agent piped into the process.

use std::io::BufRead;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::Tracker;

/// Source of leadership transitions.
pub trait LeaderFeed: Send + 'static {
    /// Starts producing values. Any task the feed needs is spawned on `tracker`
    /// so shutdown waits for it. The receiver closes when `token` is cancelled
    /// or the underlying source stops.
    fn start(self, tracker: &Tracker, token: CancellationToken) -> mpsc::Receiver<bool>;
}

/// Feed backed by an existing channel.
pub struct ChannelFeed {
    rx: mpsc::Receiver<bool>,
}

impl ChannelFeed {
    /// Wraps `rx`.
    pub fn new(rx: mpsc::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Creates a feed together with the sender that drives it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<bool>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }
}

impl LeaderFeed for ChannelFeed {
    fn start(self, tracker: &Tracker, token: CancellationToken) -> mpsc::Receiver<bool> {
        let mut upstream = self.rx;
        let (tx, rx) = mpsc::channel(1);
        tracker.spawn("feed", async move {
            loop {
                let value = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    v = upstream.recv() => match v {
                        Some(v) => v,
                        None => break,
                    },
                };
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    res = tx.send(value) => if res.is_err() { break },
                }
            }
        });
        rx
    }
}

/// Feed reading one leadership value per line.
///
/// Accepted (case-insensitive): `true`/`false`, `1`/`0`, `leader`/`follower`,
/// `yes`/`no`. Blank and unrecognized lines are skipped.
///
/// The reader must be cancel-safe on a tokio worker. For the process's
/// standard input use [`StdinFeed`].
pub struct LinesFeed<R> {
    reader: R,
}

impl<R> LinesFeed<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    /// Reads values from `reader`.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R> LeaderFeed for LinesFeed<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn start(self, tracker: &Tracker, token: CancellationToken) -> mpsc::Receiver<bool> {
        let (tx, rx) = mpsc::channel(1);
        let mut lines = self.reader.lines();
        tracker.spawn("feed", async move {
            loop {
                let line = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(target: "leadercast", err = %e, "feed read failed");
                            break;
                        }
                    },
                };
                let Some(value) = accept_line(&line) else {
                    continue;
                };
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    res = tx.send(value) => if res.is_err() { break },
                }
            }
        });
        rx
    }
}

/// Feed reading one leadership value per line from standard input.
///
/// Lines are read on a dedicated OS thread: a blocking stdin read cannot be
/// cancelled, and on a tokio blocking thread it would hold the runtime open
/// after shutdown while the election agent is idle. The thread ends at EOF or
/// on the first line read after the feed has stopped.
pub struct StdinFeed {
    capacity: usize,
}

impl StdinFeed {
    /// Creates a stdin feed buffering up to 16 parsed values.
    pub fn new() -> Self {
        Self { capacity: 16 }
    }
}

impl Default for StdinFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaderFeed for StdinFeed {
    fn start(self, tracker: &Tracker, token: CancellationToken) -> mpsc::Receiver<bool> {
        let (tx, raw) = mpsc::channel(self.capacity.max(1));
        let reader = std::thread::Builder::new()
            .name("leadercast-stdin".into())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            tracing::warn!(target: "leadercast", err = %e, "feed read failed");
                            break;
                        }
                    };
                    if let Some(value) = accept_line(&line) {
                        if tx.blocking_send(value).is_err() {
                            break;
                        }
                    }
                }
            });
        // On spawn failure `tx` is gone with the closure, so the feed closes right away.
        if let Err(e) = reader {
            tracing::error!(target: "leadercast", err = %e, "cannot start stdin reader");
        }
        ChannelFeed::new(raw).start(tracker, token)
    }
}

fn accept_line(line: &str) -> Option<bool> {
    let value = parse_value(line);
    if value.is_none() && !line.trim().is_empty() {
        tracing::debug!(target: "leadercast", line = %line, "skipping unrecognized feed line");
    }
    value
}

/// Parses one feed line.
pub fn parse_value(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "leader" | "yes" => Some(true),
        "false" | "0" | "follower" | "no" => Some(false),
        _ => None,
    }
}

//! # leadercast
//!
//! **leadercast** tells a dynamic set of consumers whether this process is
//! currently the elected leader, and every time that changes.
//!
//! It consumes an external election feed (a stream of booleans), keeps the
//! current value, and fans each value out to every subscriber. A new
//! subscriber immediately receives the current value; a subscriber that does
//! not accept a value within the slow-client timeout is evicted so it cannot
//! stall everybody else.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!        election agent
//!              │  bool, bool, ...            (LeaderFeed)
//!              ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Broadcaster (one task)                                           │
//! │  - StateCell       (current value, swap per feed event)           │
//! │  - Registry        (subscriptions by id, snapshot per round)      │
//! │  - fan-out round   (sequential or per-subscriber timers)          │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐
//!   │ Session  │       │ Session  │       │ Session  │   one task per subscriber
//!   └────┬─────┘       └────┬─────┘       └────┬─────┘
//!        ▼                  ▼                  ▼
//!   LeaderStream       LeaderStream       LeaderStream  (rendezvous handoff)
//!        │                  │                  │
//!   in-process         Gateway ──► TCP    Gateway ──► custom MessageSink
//!   consumer           {"is_leader":..}
//! ```
//!
//! ### Subscriber lifecycle
//! ```text
//! subscribe(caller)
//!   ├─► deliver current value           (cancelled first → never registered)
//!   ├─► register
//!   ├─► receive every broadcast value, in feed order, repeats included
//!   └─► end of stream when the first of these happens:
//!         - caller cancelled / stream dropped / transport write failed
//!         - global shutdown
//!         - eviction (value not taken within slow_client_timeout)
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types                                   |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Broadcasting**  | Feed → state → fan-out with slow-client eviction.           | [`Broadcaster`], [`Fanout`]                 |
//! | **Subscribing**   | In-process streams with initial snapshot.                   | [`Runtime::subscribe`], [`LeaderStream`]    |
//! | **Gateway**       | Request → session adapter, TCP JSON-lines endpoint.         | [`Gateway`], [`MessageSink`]                |
//! | **Observability** | Runtime events and pluggable observers.                     | [`Event`], [`Observe`]                      |
//! | **Errors**        | Typed errors for runtime, gateway and config.               | [`RuntimeError`], [`GatewayError`]          |
//! | **Configuration** | Centralized settings, TOML loading.                         | [`Config`]                                  |
//!
//! ## Optional features
//! - `logging`: exports [`LogWriter`], an observer rendering events through `tracing`.
//! - `cli`: builds the `leadercast` binary.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use leadercast::{Config, Runtime};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let rt = Runtime::builder(Config::default()).build();
//!
//!     let caller = CancellationToken::new();
//!     let mut stream = rt.subscribe(caller.clone());
//!     assert_eq!(stream.recv().await, Some(false));
//!
//!     caller.cancel();
//!     assert_eq!(stream.recv().await, None);
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod feed;
mod gateway;
mod observers;

// ---- Public re-exports ----

pub use config::{Config, ElectionConfig, Fanout};
pub use crate::core::{
    Broadcaster, BroadcasterExit, LeaderStream, Phase, RoundReport, Runtime, RuntimeBuilder,
    SessionState, Sessions, ShutdownTrigger, StateCell, Subscription, SubscriptionRegistry,
    Tracker, wait_for_shutdown,
};
pub use error::{ConfigError, GatewayError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use feed::{ChannelFeed, LeaderFeed, LinesFeed, StdinFeed, parse_value};
pub use gateway::tcp;
pub use gateway::{Gateway, LeaderMessage, MessageSink};
pub use observers::{Observe, ObserverHandle, ObserverSet};

// Optional: expose a built-in tracing observer.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use observers::LogWriter;

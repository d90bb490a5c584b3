//! Runtime core: leadership state, subscriptions, fan-out and lifecycle.
//!
//! Internal modules:
//! - [`state`]: atomic current leadership value;
//! - [`subscription`]: subscription handle and its rendezvous delivery channel;
//! - [`registry`]: concurrent registry of active subscriptions with snapshots;
//! - [`broadcaster`]: feed → state → fan-out loop with slow-client eviction;
//! - [`session`]: one subscriber's lifecycle (initial value, registration, teardown);
//! - [`tracker`]: tracks spawned tasks for graceful shutdown;
//! - [`runtime`]: wires everything and drives shutdown;
//! - [`shutdown`]: OS signal / explicit shutdown trigger.

mod broadcaster;
mod builder;
mod registry;
mod runtime;
mod session;
mod shutdown;
mod state;
mod subscription;
mod tracker;

pub use broadcaster::{Broadcaster, BroadcasterExit, Phase, RoundReport};
pub use builder::RuntimeBuilder;
pub use registry::SubscriptionRegistry;
pub use runtime::Runtime;
pub use session::{SessionState, Sessions};
pub use shutdown::{ShutdownTrigger, wait_for_shutdown};
pub use state::StateCell;
pub use subscription::{LeaderStream, Subscription};
pub use tracker::Tracker;

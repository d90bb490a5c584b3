//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish runtime events emitted by the broadcaster, subscription sessions,
//! the gateway and the runtime itself.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Broadcaster`, `Session`, `Gateway`, `Runtime`,
//!   `ObserverSet` workers (overflow/panic).
//! - **Consumers**: `ObserverSet::listen()`, and anything holding `Bus::subscribe()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};

//! # Event observers for the leadercast runtime.
//!
//! This module provides the [`Observe`] trait and built-in implementations
//! for handling runtime events broadcast through the [`Bus`](crate::events::Bus).
//!
//! Observers see the *operational* story (transitions, evictions, shutdown).
//! They are not leadership subscribers: those receive values through
//! [`LeaderStream`](crate::LeaderStream) and are subject to back-pressure.
//!
//! ## Architecture
//! ```text
//!   Broadcaster ── publish(Event) ──► Bus ──► ObserverSet::listen()
//!                                                 │  interested(kind)?
//!                                            ┌────┴────┬─────────┐
//!                                            ▼         ▼         ▼
//!                                        LogWriter  Evictions  Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod observer;
mod observer_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use observer::Observe;
pub(crate) use observer_set::panic_message;
pub use observer_set::{ObserverHandle, ObserverSet};

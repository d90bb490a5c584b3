//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the leadercast runtime, and
//! [`Config::from_file`] to load them from TOML.
//!
//! ## File layout
//! ```toml
//! [stream]
//! listen = "127.0.0.1:7070"
//! slow_client_read_ttl = "5s"
//! fanout = "concurrent"        # or "sequential"
//!
//! [runtime]
//! grace = "30s"
//! bus_capacity = 1024
//!
//! [election]                   # passed through to the election agent
//! addr = "127.0.0.1:8500"
//! session_ttl = "10s"
//! key_recheck_ttl = "1s"
//! session_name = "leadercast"
//! key_name = "service/leadercast/leader"
//! ```
//!
//! Durations use humantime syntax (`"250ms"`, `"5s"`, `"1m 30s"`).
//! Every field is optional; missing ones fall back to [`Config::default`].

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// How a fan-out round delivers one value to the subscriber snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fanout {
    /// One subscriber at a time, in snapshot order. A slow subscriber delays
    /// the start of delivery to the ones after it by up to the slow-client timeout.
    Sequential,
    /// Every subscriber in the snapshot gets its own delivery future and timer
    /// within the round; the round ends when all of them settle.
    #[default]
    Concurrent,
}

/// Settings consumed by the external election agent, kept verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Coordination backend address.
    pub addr: Option<String>,
    /// Session / lock time-to-live.
    pub session_ttl: Option<String>,
    /// Lock recheck interval.
    pub key_recheck_ttl: Option<String>,
    /// Session name.
    pub session_name: Option<String>,
    /// Lock key name.
    pub key_name: Option<String>,
}

/// Global configuration for the leadercast runtime.
///
/// ## Field semantics
/// - `listen`: address of the stream endpoint
/// - `slow_client_timeout`: max wait for one subscriber to accept one value
/// - `grace`: max wait for tracked tasks on shutdown (`0s` = don't wait)
/// - `bus_capacity`: observability bus ring buffer size (min 1; clamped by Bus)
/// - `fanout`: per-round delivery strategy
#[derive(Clone, Debug)]
pub struct Config {
    /// Listen address for the externally-facing stream endpoint.
    pub listen: SocketAddr,

    /// Maximum time the broadcaster waits for a subscriber to accept one
    /// value before evicting it. Must be non-zero.
    pub slow_client_timeout: Duration,

    /// Maximum time to wait for graceful shutdown.
    ///
    /// When shutdown is requested:
    /// - The root `CancellationToken` is cancelled
    /// - Runtime waits up to `grace` for every tracked task to exit
    /// - If exceeded, returns `RuntimeError::GraceExceeded`
    pub grace: Duration,

    /// Capacity of the observability bus.
    pub bus_capacity: usize,

    /// Fan-out strategy.
    pub fanout: Fanout,

    /// Election agent settings (not used by this crate).
    pub election: ElectionConfig,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Loads configuration from a TOML file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text and validates it.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        let mut cfg = Config::default();

        if let Some(listen) = raw.stream.listen {
            cfg.listen = listen.parse().map_err(|e| ConfigError::Invalid {
                field: "stream.listen",
                reason: format!("{listen:?}: {e}"),
            })?;
        }
        if let Some(ttl) = raw.stream.slow_client_read_ttl {
            cfg.slow_client_timeout = parse_duration("stream.slow_client_read_ttl", &ttl)?;
        }
        if let Some(fanout) = raw.stream.fanout {
            cfg.fanout = fanout;
        }
        if let Some(grace) = raw.runtime.grace {
            cfg.grace = parse_duration("runtime.grace", &grace)?;
        }
        if let Some(cap) = raw.runtime.bus_capacity {
            cfg.bus_capacity = cap;
        }
        cfg.election = raw.election;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates field values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slow_client_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "stream.slow_client_read_ttl",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `listen = 127.0.0.1:7070`
    /// - `slow_client_timeout = 5s`
    /// - `grace = 30s`
    /// - `bus_capacity = 1024`
    /// - `fanout = Fanout::Concurrent`
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 7070)),
            slow_client_timeout: Duration::from_secs(5),
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
            fanout: Fanout::default(),
            election: ElectionConfig::default(),
        }
    }
}

fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("{value:?}: {e}"),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    stream: RawStream,
    runtime: RawRuntime,
    election: ElectionConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStream {
    listen: Option<String>,
    slow_client_read_ttl: Option<String>,
    fanout: Option<Fanout>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRuntime {
    grace: Option<String>,
    bus_capacity: Option<usize>,
}

//! Error types used by the leadercast runtime, gateway and configuration.
//!
//! - [`RuntimeError`]: errors raised by the runtime itself (startup, shutdown).
//! - [`GatewayError`]: errors surfaced to the caller of one stream request.
//! - [`ConfigError`]: errors loading or validating configuration.
//!
//! All types provide `as_label` for logging/metrics. Slow-client eviction is
//! deliberately absent: it is a policy action, not an error.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the leadercast runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some tasks remained stuck.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of tasks that did not shut down in time.
        stuck: Vec<String>,
    },

    /// The stream listener could not be bound. Fatal at startup.
    #[error("cannot run listener on {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use leadercast::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Bind { .. } => "runtime_bind_failed",
        }
    }
}

/// # Errors returned by one gateway stream request.
///
/// A normal end of stream (departure, shutdown, eviction) is `Ok(())`, not an error.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Writing a message to the transport failed. The session has been cancelled.
    #[error("cannot send to response stream: {0}")]
    Transport(#[from] std::io::Error),

    /// The handler failed unexpectedly (panic). Detail is only published to observers.
    #[error("internal server error")]
    Internal,
}

impl GatewayError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            GatewayError::Transport(_) => "gateway_transport",
            GatewayError::Internal => "gateway_internal",
        }
    }
}

/// # Errors loading configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has wrong field types.
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field has an invalid value.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "config_read",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_error_hides_detail() {
        assert_eq!(GatewayError::Internal.to_string(), "internal server error");
        assert_eq!(GatewayError::Internal.as_label(), "gateway_internal");
    }

    #[test]
    fn test_transport_error_from_io() {
        let err: GatewayError = std::io::Error::from(std::io::ErrorKind::BrokenPipe).into();
        assert_eq!(err.as_label(), "gateway_transport");
        assert!(err.to_string().starts_with("cannot send to response stream"));
    }
}

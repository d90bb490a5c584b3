//! # Shutdown triggers.
//!
//! [`wait_for_shutdown`] completes on whichever comes first: a process
//! termination signal, or cancellation of the runtime's own token (explicit
//! [`Runtime::shutdown`](crate::Runtime::shutdown)).
//!
//! ## Signals
//! **Unix platforms:** `SIGINT`, `SIGTERM`, `SIGQUIT`, plus [`tokio::signal::ctrl_c`].
//!
//! **Windows platforms:** `Ctrl-C` via [`tokio::signal::ctrl_c`].

use tokio_util::sync::CancellationToken;

/// What ended the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// An OS termination signal arrived.
    Signal,
    /// The token was cancelled from inside the process.
    Requested,
}

/// Waits for an OS signal or `token` cancellation.
///
/// If signal registration fails, only `token` is awaited.
pub async fn wait_for_shutdown(token: &CancellationToken) -> ShutdownTrigger {
    tokio::select! {
        _ = token.cancelled() => ShutdownTrigger::Requested,
        res = wait_for_signal() => match res {
            Ok(()) => ShutdownTrigger::Signal,
            Err(_) => {
                token.cancelled().await;
                ShutdownTrigger::Requested
            }
        },
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requested_shutdown() {
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(wait_for_shutdown(&token).await, ShutdownTrigger::Requested);
    }
}

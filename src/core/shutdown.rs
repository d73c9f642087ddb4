//! # OS shutdown signals.
//!
//! [`shutdown_requested`] resolves with the name of the first termination signal seen:
//! `SIGINT`, `SIGTERM` or `SIGQUIT` on Unix, Ctrl-C elsewhere. When signal handling is
//! disabled it never resolves.

use std::io;

/// Waits for a termination signal, or forever when `enabled` is false.
///
/// Listeners are registered on first poll; registration failure is returned as `Err`.
pub(crate) async fn shutdown_requested(enabled: bool) -> io::Result<&'static str> {
    if !enabled {
        return std::future::pending().await;
    }
    wait_for_signal().await
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv()  => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

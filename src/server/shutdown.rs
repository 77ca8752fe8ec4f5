//! Termination signal handling
//!
//! SIGTERM and SIGINT are turned into a single cancellation of a
//! process-wide token:
//! - Handlers are registered up front, so registration failures are fatal at startup
//! - The first signal cancels the token and the watcher exits
//! - Later signals have nowhere to go and cannot restart the drain

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Register termination handlers and return the token they cancel
///
/// Must be called from within a Tokio runtime.
#[cfg(unix)]
pub fn spawn_signal_watcher() -> std::io::Result<CancellationToken> {
    let mut signals = TerminationSignals::register()?;
    let token = CancellationToken::new();

    let cancel = token.clone();
    tokio::spawn(async move {
        let signal = signals.recv().await;
        info!(signal, "Initiating graceful shutdown");
        cancel.cancel();
    });

    Ok(token)
}

#[cfg(not(unix))]
pub fn spawn_signal_watcher() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();

    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(signal = "CTRL_C", "Initiating graceful shutdown");
            cancel.cancel();
        }
    });

    Ok(token)
}

#[cfg(unix)]
struct TerminationSignals {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl TerminationSignals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => {
                info!("Received SIGTERM");
                "SIGTERM"
            }
            _ = self.sigint.recv() => {
                info!("Received SIGINT");
                "SIGINT"
            }
        }
    }
}

//! Listener ownership and termination orchestration
//!
//! ```text
//! Starting → Listening → Draining → Stopped
//! ```
//!
//! Draining begins on whichever comes first: the process-wide shutdown token
//! is cancelled, or the listener task ends on its own. The listener always
//! stops before telemetry is torn down, so spans for the last requests are
//! still exported.

use axum::Router;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{error, info, warn};

use crate::telemetry::Teardown;

/// Grace period for in-flight requests once draining starts
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Listening,
    Draining,
    Stopped,
}

/// Why draining began
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The shutdown token was cancelled (OS signal)
    Signal,
    /// The listener task failed
    ListenerFailed(String),
    /// The listener stopped without error
    ListenerClosed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Signal => write!(f, "termination signal"),
            TerminationReason::ListenerFailed(e) => write!(f, "listener failed: {}", e),
            TerminationReason::ListenerClosed => write!(f, "listener closed"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("listener failed: {0}")]
    ListenerFatal(String),

    #[error("graceful drain did not finish within {0:?}")]
    DrainTimeout(Duration),

    #[error("graceful drain failed: {0}")]
    Drain(String),
}

/// Bind the service listener
pub async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, SupervisorError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| SupervisorError::Bind { addr, source })
}

type ServeFuture = Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>;

/// Starts serving; stops accepting once the given future resolves
type ServeFn = Box<dyn FnOnce(WaitForCancellationFutureOwned) -> ServeFuture + Send>;

/// Owns the listener and the telemetry handle until the process stops
pub struct Supervisor<T> {
    serve: ServeFn,
    local_addr: Option<SocketAddr>,
    telemetry: T,
    drain_timeout: Duration,
    state: watch::Sender<SupervisorState>,
}

impl<T: Teardown> Supervisor<T> {
    /// Serve `app` on `listener` with axum
    pub fn new(listener: TcpListener, app: Router, telemetry: T) -> Self {
        let local_addr = listener.local_addr().ok();
        let mut supervisor = Self::with_serve(
            move |stop_accepting| async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(stop_accepting)
                    .await
            },
            telemetry,
        );
        supervisor.local_addr = local_addr;
        supervisor
    }

    /// Supervise an arbitrary server future
    ///
    /// `serve` receives the signal to stop accepting and must resolve once
    /// in-flight work is done.
    pub fn with_serve<F, Fut>(serve: F, telemetry: T) -> Self
    where
        F: FnOnce(WaitForCancellationFutureOwned) -> Fut + Send + 'static,
        Fut: Future<Output = std::io::Result<()>> + Send + 'static,
    {
        let (state, _) = watch::channel(SupervisorState::Starting);
        Self {
            serve: Box::new(move |stop_accepting| Box::pin(serve(stop_accepting)) as ServeFuture),
            local_addr: None,
            telemetry,
            drain_timeout: DRAIN_TIMEOUT,
            state,
        }
    }

    /// Override the grace period (used by tests to keep drains short)
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Bound address, when supervising a TCP listener
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Serve until termination, drain, then tear telemetry down
    ///
    /// Returns an error when the listener failed or the drain did not
    /// complete cleanly; telemetry teardown failures are only logged.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), SupervisorError> {
        let Supervisor {
            serve,
            telemetry,
            drain_timeout,
            state,
            ..
        } = self;

        let drain = CancellationToken::new();
        let mut server: JoinHandle<std::io::Result<()>> =
            tokio::spawn(serve(drain.clone().cancelled_owned()));
        state.send_replace(SupervisorState::Listening);

        let reason = tokio::select! {
            _ = shutdown.cancelled() => TerminationReason::Signal,
            joined = &mut server => match joined {
                Ok(Ok(())) => TerminationReason::ListenerClosed,
                Ok(Err(e)) => TerminationReason::ListenerFailed(e.to_string()),
                Err(e) => TerminationReason::ListenerFailed(format!("server task failed: {}", e)),
            },
        };

        state.send_replace(SupervisorState::Draining);
        info!(reason = %reason, "Shutting down server");

        let outcome = match reason {
            TerminationReason::Signal => drain_listener(server, drain, drain_timeout).await,
            TerminationReason::ListenerClosed => Ok(()),
            TerminationReason::ListenerFailed(e) => {
                error!(error = %e, "Failed to run server");
                Err(SupervisorError::ListenerFatal(e))
            }
        };

        state.send_replace(SupervisorState::Stopped);
        if let Err(e) = telemetry.teardown().await {
            error!(error = %e, "Failed to shut down telemetry");
        }

        info!("Shutdown complete");
        outcome
    }
}

/// Stop accepting and give in-flight requests the grace period
///
/// Connections still open when it expires are abandoned.
async fn drain_listener(
    mut server: JoinHandle<std::io::Result<()>>,
    drain: CancellationToken,
    timeout: Duration,
) -> Result<(), SupervisorError> {
    drain.cancel();

    match tokio::time::timeout(timeout, &mut server).await {
        Ok(Ok(Ok(()))) => {
            info!("Server stopped");
            Ok(())
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "Failed to shutdown server");
            Err(SupervisorError::Drain(e.to_string()))
        }
        Ok(Err(e)) => {
            error!(error = %e, "Server task failed while draining");
            Err(SupervisorError::Drain(e.to_string()))
        }
        Err(_) => {
            server.abort();
            let _ = server.await;
            warn!(timeout = ?timeout, "Drain timed out, abandoning in-flight requests");
            Err(SupervisorError::DrainTimeout(timeout))
        }
    }
}

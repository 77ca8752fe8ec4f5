//! Health probes and the route table
//!
//! - `/livez` - Liveness: Is the process alive?
//! - `/readyz` - Readiness: Can it take traffic? Same answer, there is
//!   nothing else to depend on
//! - `/shutdown` - Power the host off (see `poweroff`)

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

use crate::power::PowerOff;
use crate::telemetry::{log_requests, trace_requests};

/// Body returned by both probes
pub const PROBE_BODY: &str = "ok";

/// Shared state for request handlers
///
/// Handlers only read from it; nothing here needs locking.
#[derive(Clone)]
pub struct AppState {
    pub(super) power: Arc<dyn PowerOff>,
}

impl AppState {
    pub fn new(power: Arc<dyn PowerOff>) -> Self {
        Self { power }
    }
}

/// Liveness probe handler
///
/// Always returns 200 OK - if this responds, the process is alive.
async fn livez() -> &'static str {
    PROBE_BODY
}

/// Readiness probe handler
///
/// Always returns 200 OK while the listener is serving.
async fn readyz() -> &'static str {
    PROBE_BODY
}

/// Build the router for probes and the shutdown trigger
///
/// Layer order, outermost first: access log, panic recovery, request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .route("/shutdown", post(super::poweroff::handle_shutdown))
        .with_state(state)
        .layer(axum::middleware::from_fn(trace_requests))
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn(log_requests))
}

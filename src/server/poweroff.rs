//! Shutdown trigger endpoint
//!
//! Serves the `/shutdown` route. Signal-driven shutdown of this process lives
//! in `server::shutdown`.
//!
//! ## Endpoints
//! - POST /shutdown - Run the host power-off command
//!
//! The endpoint is unauthenticated; the agent is expected to sit on a
//! trusted network. Concurrent calls each run the command independently and
//! rely on repeated power-off requests being harmless at the OS level.
//!
//! Callers only see a short success/failure body. Captured output and the
//! failure kind go to the log.

use axum::{extract::State, http::StatusCode};
use tracing::error;

use super::health::AppState;

pub const SHUTDOWN_OK_BODY: &str = "shutdown command executed";
pub const SHUTDOWN_FAILED_BODY: &str = "failed to shutdown";

/// Handle POST /shutdown
///
/// A failed attempt is contained to this request; the agent keeps serving.
pub async fn handle_shutdown(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let result = state.power.execute().await;
    if result.success {
        return (StatusCode::OK, SHUTDOWN_OK_BODY);
    }

    let kind = result.error.as_ref().map_or("unknown", |e| e.kind());
    let reason = result
        .error
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_default();
    error!(
        kind,
        error = %reason,
        stdout = %result.stdout,
        stderr = %result.stderr,
        "Failed to shutdown"
    );

    (StatusCode::INTERNAL_SERVER_ERROR, SHUTDOWN_FAILED_BODY)
}

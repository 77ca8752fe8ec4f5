//! Distributed tracing for inbound requests
//!
//! ```text
//! request → middleware (span per non-probe request)
//!         → tracing-opentelemetry layer
//!         → batch span processor → OTLP/HTTP exporter
//! ```
//!
//! The provider is built once at startup. `TracerHandle::shutdown` flushes
//! whatever is still queued and must only run after the listener has stopped.

mod middleware;
mod provider;

pub use middleware::{log_requests, trace_requests};
pub use provider::{
    TracerHandle, MAX_EXPORT_BATCH_SIZE, MAX_QUEUE_SIZE, SCHEDULED_DELAY, SHUTDOWN_TIMEOUT,
};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::Metadata;

/// Service name attached to every exported span
pub const SERVICE_NAME: &str = "shutdown-manager";

/// Paths polled by the orchestrator; never traced or access-logged
pub const PROBE_PATHS: [&str; 2] = ["/livez", "/readyz"];

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to create trace exporter: {0}")]
    Exporter(String),

    #[error("failed to shutdown tracer provider: {0}")]
    Shutdown(String),

    #[error("telemetry shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Skip predicate shared by request tracing and access logging
pub fn is_probe_path(path: &str) -> bool {
    PROBE_PATHS.contains(&path)
}

/// Whether a callsite is one of this crate's spans
///
/// Keeps dependency spans (HTTP client internals included) out of the
/// export pipeline.
pub fn is_own_span(metadata: &Metadata<'_>) -> bool {
    metadata.is_span() && metadata.target().starts_with(env!("CARGO_CRATE_NAME"))
}

/// One-shot teardown of the process-wide telemetry resource
///
/// Consuming `self` makes a second teardown impossible.
#[async_trait]
pub trait Teardown: Send + 'static {
    async fn teardown(self) -> Result<(), TelemetryError>;
}

#[async_trait]
impl Teardown for TracerHandle {
    async fn teardown(self) -> Result<(), TelemetryError> {
        self.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_check_paths_are_skipped() {
        assert!(is_probe_path("/livez"));
        assert!(is_probe_path("/readyz"));
    }

    #[test]
    fn test_skip_predicate_is_exact() {
        assert!(!is_probe_path("/shutdown"));
        assert!(!is_probe_path("/livez/"));
        assert!(!is_probe_path("/readyz?full=1"));
        assert!(!is_probe_path("/healthz"));
        assert!(!is_probe_path(""));
    }
}

#[cfg(test)]
#[path = "telemetry_test.rs"]
mod telemetry_tests;

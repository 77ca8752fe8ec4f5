//! Request tracing and access logging middleware
//!
//! Both layers skip the health probes so orchestrator polling produces
//! neither spans nor log lines.

use axum::extract::{MatchedPath, Request};
use axum::http::header::USER_AGENT;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use std::time::Instant;
use tracing::field::Empty;
use tracing::{info, info_span, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::is_probe_path;

/// Read-only view of request headers for context extraction
struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

/// Wrap each non-probe request in a server span
///
/// An incoming `traceparent` header makes the span join the caller's trace.
pub async fn trace_requests(request: Request, next: Next) -> Response {
    if is_probe_path(request.uri().path()) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let parent = TraceContextPropagator::new().extract(&HeaderExtractor(request.headers()));
    let name = format!("{} {}", method, route);

    let span = info_span!(
        "http.request",
        otel.name = name.as_str(),
        otel.kind = "server",
        otel.status_code = Empty,
        http.request.method = %method,
        http.route = route.as_str(),
        url.path = path.as_str(),
        http.response.status_code = Empty,
    );
    // Without a valid `traceparent` this starts a new trace
    span.set_parent(parent);

    let response = next.run(request).instrument(span.clone()).await;

    let status = response.status();
    span.record("http.response.status_code", status.as_u16());
    if status.is_server_error() {
        span.record("otel.status_code", "ERROR");
    }
    response
}

/// Emit one access log line per non-probe request
pub async fn log_requests(request: Request, next: Next) -> Response {
    if is_probe_path(request.uri().path()) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        user_agent = %user_agent,
        "request completed"
    );
    response
}

//! OpenTelemetry tracer provider and its teardown handle
//!
//! Export settings come from the standard OpenTelemetry environment:
//! - `OTEL_EXPORTER_OTLP_TRACES_ENDPOINT` - full traces URL
//! - `OTEL_EXPORTER_OTLP_ENDPOINT` - base URL, `/v1/traces` is appended
//! - `OTEL_EXPORTER_OTLP_TIMEOUT` - export timeout in milliseconds (default: 10000)

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, Sampler, SdkTracer, SdkTracerProvider, SpanExporter,
};
use opentelemetry_sdk::Resource;
use std::time::Duration;
use tracing::info;

use super::{TelemetryError, SERVICE_NAME};

/// Spans held in memory before new ones are dropped
pub const MAX_QUEUE_SIZE: usize = 2048;

/// Largest batch handed to the exporter at once
pub const MAX_EXPORT_BATCH_SIZE: usize = 512;

/// Interval between scheduled flushes
pub const SCHEDULED_DELAY: Duration = Duration::from_secs(5);

/// Bound on the final flush during teardown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owner of the process-wide tracer provider
///
/// There is one per process. `shutdown` consumes the handle, flushes queued
/// spans and shuts the exporter down.
pub struct TracerHandle {
    provider: SdkTracerProvider,
    shutdown_timeout: Duration,
}

impl TracerHandle {
    /// OTLP/HTTP export configured from the environment
    pub fn from_env() -> Result<Self, TelemetryError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .build()
            .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

        Ok(Self::with_exporter(exporter))
    }

    /// OTLP/HTTP export to an explicit traces URL
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, TelemetryError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

        Ok(Self::with_exporter(exporter))
    }

    /// Batch every span into `exporter`
    pub fn with_exporter<E: SpanExporter + 'static>(exporter: E) -> Self {
        let batch = BatchConfigBuilder::default()
            .with_max_queue_size(MAX_QUEUE_SIZE)
            .with_max_export_batch_size(MAX_EXPORT_BATCH_SIZE)
            .with_scheduled_delay(SCHEDULED_DELAY)
            .build();
        let processor = BatchSpanProcessor::builder(exporter)
            .with_batch_config(batch)
            .build();

        Self::new(
            SdkTracerProvider::builder()
                .with_span_processor(processor)
                .with_sampler(Sampler::AlwaysOn)
                .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
                .build(),
        )
    }

    pub fn new(provider: SdkTracerProvider) -> Self {
        Self {
            provider,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }

    /// Tracer feeding the `tracing` bridge layer
    pub fn tracer(&self) -> SdkTracer {
        self.provider.tracer(env!("CARGO_PKG_NAME"))
    }

    /// Flush buffered spans and release the exporter
    ///
    /// Failures are returned for logging; they are never fatal.
    pub async fn shutdown(self) -> Result<(), TelemetryError> {
        let provider = self.provider;
        // The SDK blocks while the batch worker drains
        let flush = tokio::task::spawn_blocking(move || provider.shutdown());

        let result = match tokio::time::timeout(self.shutdown_timeout, flush).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(TelemetryError::Shutdown(e.to_string())),
            Ok(Err(e)) => Err(TelemetryError::Shutdown(e.to_string())),
            Err(_) => Err(TelemetryError::ShutdownTimeout(self.shutdown_timeout)),
        };

        if result.is_ok() {
            info!("Telemetry pipeline shut down");
        }
        result
    }
}

//! Log level and encoding selection, and subscriber installation

use std::str::FromStr;

use opentelemetry_sdk::trace::SdkTracer;
use tracing::{Level, Subscriber};
use tracing_subscriber::filter::{filter_fn, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::Layer;

use super::{ConfigError, ServiceConfig};
use crate::telemetry::is_own_span;

/// Log encoding, resolved once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable console output
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidLogType(other.to_string())),
        }
    }
}

impl LogFormat {
    /// Build the formatting layer for this encoding
    ///
    /// Source file and line are included when `add_source` is set.
    pub fn layer<S>(self, add_source: bool) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        match self {
            LogFormat::Text => tracing_subscriber::fmt::layer()
                .with_file(add_source)
                .with_line_number(add_source)
                .boxed(),
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_file(add_source)
                .with_line_number(add_source)
                .boxed(),
        }
    }
}

/// Parse a textual level name (`trace`, `debug`, `info`, `warn`, `error`)
///
/// Matching is case-insensitive and `warning` is accepted for `warn`. A
/// signed offset may follow the name (`INFO+2`, `debug-4`); it is applied on
/// the numeric scale `debug=-4, info=0, warn=4, error=8` and the result
/// becomes the most verbose level still at or above that threshold.
pub fn parse_log_level(raw: &str) -> Result<Level, ConfigError> {
    let invalid = || ConfigError::InvalidLogLevel(raw.to_string());

    let (name, offset) = match raw.find(|c| c == '+' || c == '-') {
        Some(at) => {
            let offset = raw[at..].parse::<i32>().map_err(|_| invalid())?;
            (&raw[..at], offset)
        }
        None => (raw, 0),
    };

    let base: i32 = match name.to_ascii_lowercase().as_str() {
        "trace" => -8,
        "debug" => -4,
        "info" => 0,
        "warn" | "warning" => 4,
        "error" => 8,
        _ => return Err(invalid()),
    };

    Ok(level_at_threshold(base.saturating_add(offset)))
}

fn level_at_threshold(threshold: i32) -> Level {
    match threshold {
        i32::MIN..=-5 => Level::TRACE,
        -4 => Level::DEBUG,
        -3..=0 => Level::INFO,
        1..=4 => Level::WARN,
        _ => Level::ERROR,
    }
}

/// Install the global subscriber
///
/// The formatting layer honours the configured level; the OpenTelemetry
/// bridge only ever sees this crate's own spans, whatever the log level.
/// Without a tracer only the formatting layer is installed.
pub fn init_logging(config: &ServiceConfig, tracer: Option<SdkTracer>) -> Result<(), TryInitError> {
    let add_source = config.log_level >= Level::DEBUG;
    let spans = tracer.map(|tracer| {
        tracing_opentelemetry::layer()
            .with_tracer(tracer)
            .with_filter(filter_fn(is_own_span))
    });

    tracing_subscriber::registry()
        .with(spans)
        .with(
            config
                .log_format
                .layer(add_source)
                .with_filter(LevelFilter::from_level(config.log_level)),
        )
        .try_init()
}

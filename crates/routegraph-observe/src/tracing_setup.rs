//! Tracing subscriber initialization with structured logging and optional
//! OpenTelemetry span export.
//!
//! # Usage
//!
//! ```no_run
//! use routegraph_observe::tracing_setup::{LogFormat, TracingOptions, init_tracing};
//!
//! init_tracing(&TracingOptions {
//!     filter: "info,routegraph=debug".to_string(),
//!     format: LogFormat::Pretty,
//!     enable_otel: false,
//! })
//! .unwrap();
//! ```

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Stores the OTel tracer provider so it can be shut down cleanly on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One JSON object per event, for log shippers.
    Json,
}

#[derive(Debug, Clone)]
pub struct TracingOptions {
    /// Directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
    /// Bridge spans to OpenTelemetry with a stdout exporter.
    pub enable_otel: bool,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
            format: LogFormat::Pretty,
            enable_otel: false,
        }
    }
}

/// Filter directive for a CLI verbosity level.
pub fn filter_for_verbosity(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,routegraph=debug",
        _ => "trace",
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `options.filter`. Span close events are
/// logged so node and request latencies show up without extra fields.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set or the
/// filter directive is invalid.
pub fn init_tracing(options: &TracingOptions) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directive) if !directive.is_empty() => EnvFilter::try_new(directive)?,
        _ => EnvFilter::try_new(&options.filter)?,
    };

    let fmt_layer = match options.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    };

    let otel_layer = if options.enable_otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("routegraph");

        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(())
}

/// Flush pending spans and shut down the OpenTelemetry tracer provider.
///
/// No-op when OTel was not enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_filters() {
        assert_eq!(filter_for_verbosity(0, true), "error");
        assert_eq!(filter_for_verbosity(0, false), "warn");
        assert_eq!(filter_for_verbosity(1, false), "info,routegraph=debug");
        assert_eq!(filter_for_verbosity(3, true), "trace");
    }

    #[test]
    fn default_options_are_quiet() {
        let options = TracingOptions::default();
        assert_eq!(options.filter, "warn");
        assert_eq!(options.format, LogFormat::Pretty);
        assert!(!options.enable_otel);
    }
}

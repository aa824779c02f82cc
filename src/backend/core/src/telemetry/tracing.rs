//! OpenTelemetry span export over OTLP.

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{self as sdktrace, Sampler};
use opentelemetry_sdk::Resource;
use serde::Deserialize;

/// Span export configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TracingConfig {
    /// OTLP gRPC endpoint, e.g. `http://otel-collector:4317`. Export is off when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Fraction of traces to keep, 0.0 to 1.0
    #[serde(default = "default_sample_ratio")]
    pub sample_ratio: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            sample_ratio: default_sample_ratio(),
        }
    }
}

fn default_sample_ratio() -> f64 {
    1.0
}

/// Build an OTLP batch exporter, or `None` when no endpoint is configured.
///
/// Must run inside a tokio runtime.
pub fn init_tracer(
    config: &TracingConfig,
    service_name: &str,
    environment: &str,
) -> anyhow::Result<Option<sdktrace::Tracer>> {
    let Some(endpoint) = config.otlp_endpoint.as_deref() else {
        return Ok(None);
    };

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(
            sdktrace::config()
                .with_sampler(Sampler::TraceIdRatioBased(config.sample_ratio))
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", service_name.to_string()),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    KeyValue::new("deployment.environment", environment.to_string()),
                ])),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    Ok(Some(tracer))
}

/// Flush and stop span export.
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}

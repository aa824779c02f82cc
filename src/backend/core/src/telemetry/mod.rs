//! Telemetry: structured logging, span export and Prometheus metrics.
//!
//! # Example
//!
//! ```rust,no_run
//! use courier_core::telemetry::{init_telemetry, TelemetryConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let handle = init_telemetry(&TelemetryConfig::default(), "development")?;
//! // ... serve ...
//! handle.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use logging::{
    init_logging, LogFormat, LoggingConfig, RedactionConfig, SensitiveFieldRedactor, SpanEvent,
};
pub use metrics::{init_metrics, MetricsConfig, MetricsRegistry};
pub use tracing::{init_tracer, shutdown_tracing, TracingConfig};

use serde::Deserialize;

/// Unified telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Service name reported in spans and metric labels
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Span export configuration
    #[serde(default)]
    pub tracing: TracingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logging: LoggingConfig::default(),
            tracing: TracingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "courier".to_string()
}

/// Initialize metrics, span export and logging, in that order.
///
/// Call once at startup, from inside the tokio runtime.
pub fn init_telemetry(config: &TelemetryConfig, environment: &str) -> anyhow::Result<TelemetryHandle> {
    let metrics = init_metrics(&config.metrics, &config.service_name)?;
    let tracer = init_tracer(&config.tracing, &config.service_name, environment)?;
    let exporting_spans = tracer.is_some();

    init_logging(&config.logging, environment, tracer)?;

    ::tracing::info!(
        service_name = %config.service_name,
        environment,
        exporting_spans,
        "Telemetry initialized"
    );

    Ok(TelemetryHandle {
        metrics,
        exporting_spans,
    })
}

/// Handle for managing telemetry lifecycle.
pub struct TelemetryHandle {
    pub metrics: MetricsRegistry,
    exporting_spans: bool,
}

impl TelemetryHandle {
    /// Flush any pending spans.
    pub fn shutdown(self) {
        if self.exporting_spans {
            shutdown_tracing();
        }
        ::tracing::info!("Telemetry shutdown complete");
    }
}

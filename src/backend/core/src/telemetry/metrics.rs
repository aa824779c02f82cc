//! Prometheus metrics.
//!
//! Metrics are recorded through the `metrics` facade at the call sites
//! (`courier_deliveries_total` in the orchestrator, `courier_errors_total`
//! in the error type, and so on). This module installs the Prometheus
//! recorder, registers descriptions, and renders the text exposition served
//! at `GET /metrics`.

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Global metrics registry.
static METRICS_REGISTRY: OnceLock<MetricsRegistry> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Buckets for `courier_delivery_duration_seconds`
    #[serde(default = "default_delivery_buckets")]
    pub delivery_buckets: Vec<f64>,

    /// Labels added to every metric
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            delivery_buckets: default_delivery_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_delivery_buckets() -> Vec<f64> {
    vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
}

/// Holds the Prometheus handle used for rendering.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// The registry installed by [`init_metrics`]. Renders nothing before that.
    pub fn global() -> &'static MetricsRegistry {
        METRICS_REGISTRY.get_or_init(MetricsRegistry::default)
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Install the Prometheus recorder and register metric descriptions.
pub fn init_metrics(config: &MetricsConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::default());
    }

    let mut builder = PrometheusBuilder::new().add_global_label("service", service_name);
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    builder = builder.set_buckets_for_metric(
        Matcher::Full("courier_delivery_duration_seconds".to_string()),
        &config.delivery_buckets,
    )?;

    let handle = builder.install_recorder()?;
    register_metric_descriptions();

    let registry = MetricsRegistry {
        prometheus_handle: Some(handle),
    };
    let _ = METRICS_REGISTRY.set(registry.clone());

    tracing::info!(service_name = %service_name, "Metrics initialized");

    Ok(registry)
}

fn register_metric_descriptions() {
    describe_counter!(
        "courier_deliveries_total",
        "Delivery attempts by outcome (sent, failed, already_terminal)"
    );
    describe_histogram!(
        "courier_delivery_duration_seconds",
        Unit::Seconds,
        "Time spent in the relay send, including timeouts"
    );
    describe_counter!(
        "courier_scheduler_dispatched_total",
        "Due jobs handed to the delivery worker by the scheduler"
    );
    describe_counter!(
        "courier_email_jobs_created_total",
        "Email jobs accepted for delivery"
    );
    describe_counter!(
        "courier_errors_total",
        "Errors by code, category and severity"
    );
}

//! Configuration management.
//!
//! Configuration is read once at startup and passed down explicitly; core
//! components never consult the process environment themselves.

use serde::Deserialize;
use std::time::Duration;

use crate::delivery::{SchedulerConfig, WorkerConfig};
use crate::error::{CourierError, ErrorCode, Result};
use crate::telemetry::TelemetryConfig;
use crate::transport::{RelayConfig, TlsMode};

/// Environment variable prefix, e.g. `COURIER__RELAY__HOST`.
pub const ENV_PREFIX: &str = "COURIER";

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Outbound relay configuration
    pub relay: RelaySettings,

    /// Delivery pipeline configuration
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Logging, span export and metrics
    #[serde(default)]
    pub observability: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Apply bundled migrations at startup
    #[serde(default)]
    pub run_migrations: bool,
}

/// Relay parameters as they appear in configuration sources.
#[derive(Clone, Deserialize)]
pub struct RelaySettings {
    /// SMTP relay hostname
    pub host: String,

    /// SMTP relay port
    #[serde(default = "default_relay_port")]
    pub port: u16,

    /// Login name for the relay
    pub username: Option<String>,

    /// Credential for the relay
    pub password: Option<String>,

    /// Sender address placed in the From header
    pub from: String,

    /// starttls, tls or none
    #[serde(default)]
    pub tls: TlsMode,

    /// Connect/command timeout in seconds
    #[serde(default = "default_relay_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for RelaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("from", &self.from)
            .field("tls", &self.tls)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl RelaySettings {
    pub fn to_relay_config(&self) -> RelayConfig {
        RelayConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            from: self.from.clone(),
            tls: self.tls,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Ceiling for a single send attempt, in seconds
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Maximum concurrent delivery attempts
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Capacity of the dispatch channel
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Grace period for in-flight deliveries on shutdown, in seconds
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Interval between scans for due jobs, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub scheduler_poll_interval_ms: u64,

    /// Maximum due jobs dispatched per scan
    #[serde(default = "default_batch_size")]
    pub scheduler_batch_size: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            send_timeout_secs: default_send_timeout_secs(),
            worker_concurrency: default_worker_concurrency(),
            queue_capacity: default_queue_capacity(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            scheduler_poll_interval_ms: default_poll_interval_ms(),
            scheduler_batch_size: default_batch_size(),
        }
    }
}

impl DeliveryConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.worker_concurrency,
            queue_capacity: self.queue_capacity,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            name: "courier-delivery".to_string(),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: Duration::from_millis(self.scheduler_poll_interval_ms),
            batch_size: self.scheduler_batch_size,
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_environment() -> String { "development".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_acquire_timeout_secs() -> u64 { 5 }
fn default_relay_port() -> u16 { 587 }
fn default_relay_timeout_secs() -> u64 { 10 }
fn default_send_timeout_secs() -> u64 { 30 }
fn default_worker_concurrency() -> usize { 8 }
fn default_queue_capacity() -> usize { 1024 }
fn default_shutdown_timeout_secs() -> u64 { 30 }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_batch_size() -> usize { 100 }

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the delivery pipeline cannot run with.
    ///
    /// A zero poll interval would stop the scheduler, and a zero send
    /// timeout would fail every job, so both are refused at load.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("database.max_connections", self.database.max_connections as u64),
            ("relay.timeout_secs", self.relay.timeout_secs),
            ("delivery.send_timeout_secs", self.delivery.send_timeout_secs),
            ("delivery.worker_concurrency", self.delivery.worker_concurrency as u64),
            ("delivery.queue_capacity", self.delivery.queue_capacity as u64),
            ("delivery.scheduler_poll_interval_ms", self.delivery.scheduler_poll_interval_ms),
            ("delivery.scheduler_batch_size", self.delivery.scheduler_batch_size as u64),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(invalid(format!("{} must be greater than zero", key)));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(invalid(
                "database.min_connections must not exceed database.max_connections".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(message: String) -> CourierError {
    CourierError::new(ErrorCode::InvalidConfiguration, message)
}

//! Courier Server - main entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use courier_core::{
    api::{self, AppState},
    config::Config,
    db::Database,
    delivery::{DeliveryOrchestrator, DeliveryWorker, DueJobScheduler},
    service::EmailJobService,
    store::EmailJobStore,
    telemetry::{self, SensitiveFieldRedactor},
    transport::{MailTransport, SmtpMailTransport},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = match std::env::var("COURIER_CONFIG") {
        Ok(path) => Config::from_file(&path),
        Err(_) => Config::load(),
    }
    .context("Failed to load configuration")?;

    let telemetry = telemetry::init_telemetry(&config.observability, &config.server.environment)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.server.environment,
        "Starting Courier Server"
    );

    // Storage
    let db = Database::new(&config.database).await?;
    tracing::info!(
        url = %SensitiveFieldRedactor::global().redact_value(&config.database.url),
        "Connected to database"
    );
    if config.database.run_migrations {
        db.migrate().await?;
        tracing::info!("Database migrations applied");
    }
    let store: Arc<dyn EmailJobStore> = Arc::new(db);

    // Relay
    let transport: Arc<dyn MailTransport> =
        Arc::new(SmtpMailTransport::from_config(config.relay.to_relay_config())?);
    tracing::info!(
        host = %config.relay.host,
        port = config.relay.port,
        tls = ?config.relay.tls,
        "Mail relay configured"
    );

    // Delivery pipeline
    let orchestrator = Arc::new(DeliveryOrchestrator::new(
        Arc::clone(&store),
        transport,
        config.delivery.send_timeout(),
    ));
    let worker = DeliveryWorker::start(Arc::clone(&orchestrator), config.delivery.worker_config());
    let scheduler = DueJobScheduler::start(
        Arc::clone(&store),
        worker.clone(),
        config.delivery.scheduler_config(),
    );

    let service = EmailJobService::new(store, orchestrator, worker.clone());
    let app = api::build_router(AppState::new(service));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop feeding the worker before draining it.
    scheduler.shutdown().await;
    worker.shutdown().await;

    telemetry.shutdown();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

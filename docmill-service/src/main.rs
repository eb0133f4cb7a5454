use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

mod api;
mod config;
mod db;
mod error;
mod extraction;
mod inference;
mod notify;
mod queue;
mod service;
mod storage;

use crate::config::ServiceConfig;
use crate::db::Database;
use crate::inference::{InferenceClient, InferenceProvider};
use crate::service::DocmillService;
use crate::storage::StorageBackend;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!("Starting docmill service v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(ServiceConfig::load()?);
    info!(
        host = %config.server.host,
        port = config.server.port,
        "Configuration loaded"
    );

    std::fs::create_dir_all(&config.storage.data_dir)?;

    let db_path = config.storage.data_dir.join("docmill.db");
    let db = Arc::new(Database::open(&db_path)?);
    info!(path = %db_path.display(), "Database initialized");

    let storage = Arc::new(StorageBackend::from_config(&config.storage)?);
    let inference = Arc::new(InferenceClient::new(
        InferenceProvider::from_config(&config.inference)?,
        config.inference.clone(),
    ));

    let service = Arc::new(DocmillService::new(
        config.clone(),
        db,
        storage,
        inference,
    ));

    service.start_workers();
    service.spawn_sweeper();

    // Pick up work items a previous run left behind
    if let Err(e) = service.resume_pending_work() {
        tracing::warn!(error = %e, "Failed to resume pending work items");
    }

    let app = api::router(service.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(service))
        .await?;

    Ok(())
}

async fn shutdown_signal(service: Arc<DocmillService>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
    service.shutdown();
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format().with_target(true).compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docmill_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}

pub mod api; // Triage REST API + notification gateway
pub mod broadcast; // Notification publish boundary
pub mod config;
pub mod db;
pub mod engine; // Real-time recompute, triage queue, overrides, sweep
pub mod intake; // Change payload parsing + merge
pub mod models;
pub mod persistence; // Store / audit contracts
pub mod scoring; // Risk Scoring Function

mod log_hygiene;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::api::{start_api_server, ApiContext};
use crate::broadcast::TenantBroadcaster;
use crate::config::{AppConfig, ConfigError};
use crate::db::{ChainStatus, DatabaseError, SqliteAssessmentStore, SqliteAuditTrail};
use crate::engine::{start_sweep_scheduler, EngineError, RiskEngine};
use crate::persistence::{AuditError, RetryingStore};

/// Fatal errors while bringing the service up.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Audit trail error: {0}")]
    Audit(#[from] AuditError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Startup task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Wire config → database → stores → engine (warm load) → scheduler → HTTP
/// server, then run until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env()?;
    let database_path = config.database_path();
    tracing::info!(path = %database_path.display(), "Opening database");

    let conn = tokio::task::spawn_blocking(move || db::open_database(&database_path)).await??;
    let conn = db::store::share(conn);

    let audit = Arc::new(SqliteAuditTrail::new(conn.clone()));
    let status = {
        let audit = audit.clone();
        tokio::task::spawn_blocking(move || audit.verify_chain()).await??
    };
    match status {
        ChainStatus::Intact { entries } => {
            tracing::info!(entries, "Audit chain verified");
        }
        ChainStatus::Broken { entry_id, position } => {
            tracing::error!(%entry_id, position, "Audit chain broken, entries may have been altered");
        }
    }

    let store = RetryingStore::new(SqliteAssessmentStore::new(conn), config.engine.store_retry);
    let notifications = Arc::new(TenantBroadcaster::default());
    let engine = Arc::new(RiskEngine::new(
        Arc::new(store),
        audit,
        notifications.clone(),
        config.engine.clone(),
    ));

    let warm = {
        let engine = engine.clone();
        tokio::task::spawn_blocking(move || engine.warm_load()).await??
    };
    tracing::info!(patients = warm, "Engine ready");

    let scheduler = start_sweep_scheduler(engine.clone(), &config.engine);
    let server = start_api_server(ApiContext::new(engine, notifications), config.bind).await?;
    tracing::info!(addr = %server.addr, "{} listening", config::APP_NAME);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    // Intake closes first so every accepted change is covered by the final sweep.
    server.shutdown().await;
    scheduler.shutdown().await;
    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}

//! identity_server: REST server for identity reconciliation.
//!
//! Reads config from env vars (a `.env` file is honoured):
//!   DATABASE_URL          Postgres connection string
//!   DATABASE_POOL_SIZE    pool size (default: 10)
//!   STORAGE_BACKEND       postgres | memory (default: postgres)
//!   BIND_ADDR / PORT      listen address (default: 0.0.0.0:3000)
//!   REQUEST_TIMEOUT_SECS  per-request timeout (default: 30)
//!   IDENTIFY_MAX_RETRIES  retries of a transient failure (default: 2)

use std::sync::Arc;

use anyhow::{anyhow, Context};
use identity_core::{ContactStore, IdentityService, MemoryContactStore};
use identity_service::{build_router, ServiceConfig, StorageBackend};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,identity_service=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServiceConfig::from_env().map_err(|e| anyhow!(e))?;

    let (store, database) = open_store(config.storage).await?;
    let service = Arc::new(IdentityService::new(store));
    let app = build_router(service, &config);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!("identity_server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    close_store(database).await;
    info!("Server shut down");
    Ok(())
}

#[cfg(feature = "database")]
type Database = Option<identity_postgres::DatabaseManager>;

#[cfg(not(feature = "database"))]
type Database = Option<()>;

async fn open_store(backend: StorageBackend) -> anyhow::Result<(Arc<dyn ContactStore>, Database)> {
    match backend {
        StorageBackend::Memory => {
            warn!("Using in-memory contact store; contacts are lost on exit");
            Ok((Arc::new(MemoryContactStore::new()), None))
        }
        #[cfg(feature = "database")]
        StorageBackend::Postgres => {
            let manager = identity_postgres::DatabaseManager::with_default_config()
                .await
                .context("failed to connect to the database")?;
            manager
                .test_connection()
                .await
                .context("database connectivity check failed")?;
            info!("Connected to database successfully");
            manager.ensure_schema().await.context("failed to prepare schema")?;
            Ok((Arc::new(manager.contact_store()), Some(manager)))
        }
        #[cfg(not(feature = "database"))]
        StorageBackend::Postgres => Err(anyhow!(
            "built without the `database` feature; set STORAGE_BACKEND=memory"
        )),
    }
}

#[cfg(feature = "database")]
async fn close_store(database: Database) {
    if let Some(manager) = database {
        manager.close().await;
        info!("Database connection closed");
    }
}

#[cfg(not(feature = "database"))]
async fn close_store(_database: Database) {}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}

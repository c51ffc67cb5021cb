use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crcon_bot::commands::Dispatcher;
use crcon_bot::config::Config;
use crcon_bot::crcon::health::{spawn_health_probe, HealthMonitor};
use crcon_bot::crcon::CrconClient;
use crcon_bot::db::Database;
use crcon_bot::permissions::PermissionStore;
use crcon_bot::{metrics, onebot};

/// Create the directory holding an on-disk SQLite database.
fn ensure_database_dir(database_url: &str) -> std::io::Result<()> {
    let path = database_url
        .trim_start_matches("sqlite:")
        .trim_start_matches("//");
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.contains(":memory:") {
        return Ok(());
    }
    match Path::new(path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    metrics::register_metrics();

    let config = Arc::new(Config::load()?);
    tracing::info!(
        servers = config.servers.len(),
        owners = config.owners.len(),
        prefixes = ?config.command_prefixes,
        "configuration loaded"
    );

    ensure_database_dir(&config.database_url)?;
    let db = Arc::new(Database::new(&config.database_url).await?);
    let permissions = Arc::new(PermissionStore::load(db, config.owners.clone()).await?);

    let crcon = CrconClient::new(&config)?;
    let health = HealthMonitor::new();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let probe = spawn_health_probe(
        crcon.clone(),
        health.clone(),
        config.health_check_interval,
        shutdown_rx,
    );

    let dispatcher = Arc::new(Dispatcher::new(config.clone(), permissions, crcon, health));
    let app = onebot::router(dispatcher);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("crcon-bot listening on port {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Err(e) = probe.await {
        tracing::warn!("health probe task ended abnormally: {e}");
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        tracing::error!("crcon-bot failed: {e}");
        std::process::exit(1);
    }
}

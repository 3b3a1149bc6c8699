//! cargohold server daemon entry point.

mod config;

use std::sync::Arc;

use cargohold_registry::SessionRegistry;
use cargohold_server::{AppState, create_router};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting cargohold server"
    );

    // Load configuration.
    let config = config::Config::load()?;
    tracing::info!(
        listen_addr = %config.listen_addr,
        storage_root = %config.storage_root.display(),
        "configuration loaded"
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))?;

    tracing::info!("server shut down cleanly");
    Ok(())
}

async fn run(config: config::Config) -> anyhow::Result<()> {
    let registry = Arc::new(SessionRegistry::new(config.registry_config())?);

    // Reconcile persisted sessions against the chunk store before the
    // listener binds; nothing mutates the registry concurrently with this.
    let report = registry.recover().await?;
    tracing::info!(
        restored = report.restored,
        repaired = report.repaired,
        failed = report.failed,
        assembled = report.assembled,
        "startup recovery complete"
    );

    let cancel = CancellationToken::new();
    let cleanup = registry.spawn_cleanup(config.cleanup_interval(), cancel.clone());

    let router = create_router(AppState::new(Arc::clone(&registry)));
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    cleanup.await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown signal received");
    }
}

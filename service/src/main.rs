//! mindcraft-service: HTTP server for the content pipelines and tutor chat.

use anyhow::Context;
use mindcraft_core::config::ConfigLoader;
use mindcraft_service::{AppState, router};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("mindcraft-service v{} starting", env!("CARGO_PKG_VERSION"));

    let config = ConfigLoader::load_default().context("failed to load configuration")?;
    tracing::debug!(?config, "configuration loaded");

    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let state = AppState::from_config(&config)?;
    tracing::info!(path = %config.database.path.display(), "database ready");

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!(addr = %config.server.bind, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {e}");
            }
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

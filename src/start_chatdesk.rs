//! Startup helpers for the chatdesk server.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use crate::core::config::ChatConfig;
use crate::server::{self, AppState};

/// Run the server (used by the `chatdesk-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting chatdesk v{}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve()) {
        tracing::error!("Server error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

async fn serve() -> anyhow::Result<()> {
    let config = ChatConfig::from_env();
    let state = initialize(&config).await?;

    if !state.ollama.is_ready().await.unwrap_or(false) {
        tracing::warn!("Ollama is not reachable at {}", state.ollama.base_url());
    }

    server::run_server_with_shutdown(
        state,
        config.server.port,
        &config.server.static_dir,
        shutdown_signal(),
    )
    .await
    .map_err(|e| anyhow::anyhow!(e))
}

/// Validate configuration and build application state without serving.
///
/// # Errors
/// Returns an error if the configuration is invalid or state creation fails.
pub async fn initialize(config: &ChatConfig) -> anyhow::Result<Arc<AppState>> {
    config.validate().context("invalid configuration")?;
    tracing::info!("Ollama endpoint: {}", config.ollama.base_url);

    AppState::new(config)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to create state")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

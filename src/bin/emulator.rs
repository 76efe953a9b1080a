//! Local DocDB emulator: serves an in-memory store over HTTP.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docdb_provisioner::emulator::{create_router, AppState};
use docdb_provisioner::{EmulatorConfig, MemoryBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = EmulatorConfig::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting DocDB emulator");
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if no key is configured
    if config.auth_key.is_none() {
        tracing::warn!("No key configured (DOCDB_KEY). Authentication is disabled!");
    }

    let state = AppState::new(Arc::new(MemoryBackend::new()));
    let app = create_router(state, config.auth_key.clone());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Emulator listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

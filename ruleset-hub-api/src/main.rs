//! Ruleset Hub - Main Application Entry Point
//!
//! Deploys guest-script rulesets per scope and keeps mobile console
//! geofences in sync with the location predicates rules produce.

use ruleset_hub_api::{AppState, ServerConfig};
use ruleset_hub_storage::InMemoryStorage;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,ruleset_hub=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!("Starting Ruleset Hub server on {}:{}", config.host, config.port);

    let storage = Arc::new(InMemoryStorage::new());
    let app_state = Arc::new(AppState::with_storage(storage, &config).await?);

    let app = ruleset_hub_api::create_router(app_state.clone());

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    app_state.shutdown();
    tracing::info!("Ruleset Hub server stopped");
    Ok(())
}

mod bot;
mod config;
mod error;
mod media;
mod platform;
mod relay;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tgrelay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Webhook: {}", config.telegram.webhook_url);
    info!("  Listen: {}", config.listen_addr());
    info!("  Discord channel: {}", config.discord.channel_id);
    info!("  Allowed link domains: {:?}", config.relay.allowed_link_domains);

    let state = AppState::init(config).await?;

    info!("Relay is starting...");
    state.run().await?;

    info!("Relay stopped");
    Ok(())
}

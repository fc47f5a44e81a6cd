use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use discord_bridge::config::Config;
use discord_bridge::platform::gateway::SerenityClient;
use discord_bridge::{Channel, ChannelOpts, ChatMetadata, DiscordChannel, InboundEvent};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,discord_bridge=debug".into()),
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

    let groups = config.registered_groups();
    info!("  Registered groups: {}", groups.len());
    info!("  Typing refresh: {:?}", config.discord.typing_interval());

    let opts = ChannelOpts::new(
        Arc::new(|jid: &str, event: InboundEvent| {
            info!("[{}] {}: {}", jid, event.sender_name, event.content);
        }),
        Arc::new(|meta: ChatMetadata| {
            info!(
                "Chat seen: {} ({})",
                meta.chat_jid,
                meta.name.as_deref().unwrap_or("direct message")
            );
        }),
        Arc::new(move || groups.clone()),
    )
    .with_typing_interval(config.discord.typing_interval());

    let client = Arc::new(SerenityClient::new(&config.discord.bot_token));
    let channel = DiscordChannel::new(client, opts);

    info!("Bridge is starting...");
    channel.connect().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down...");
    channel.disconnect().await;

    Ok(())
}

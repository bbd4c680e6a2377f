//! `parley serve`: Telegram long-polling bot.

use parley_agent::ChatDispatcher;
use parley_channels::{TelegramChannel, TelegramConfig};
use parley_config::AppConfig;
use parley_core::channel::Channel;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let token = config.require_telegram_token()?.to_string();

    let bot = super::build_bot(&config).await?;

    let telegram = TelegramChannel::new(TelegramConfig::from_settings(token, &config.telegram));
    match telegram.get_me().await {
        Ok(username) => info!(bot = %username, "Connected to Telegram"),
        Err(e) => return Err(format!("Telegram rejected the bot token: {e}").into()),
    }

    let channel: Arc<dyn Channel> = Arc::new(telegram);
    let inbound = channel
        .start()
        .await
        .map_err(|e| format!("Failed to start Telegram polling: {e}"))?;

    println!("🤖 Parley is running. Press Ctrl+C to stop.");

    let dispatcher = ChatDispatcher::new(bot, Arc::clone(&channel));
    tokio::select! {
        _ = dispatcher.run(inbound) => {
            warn!("Telegram update stream ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    channel.stop().await?;
    Ok(())
}

//! `parley chat`: Interactive or single-message chat from the terminal.
//!
//! The terminal session is one chat, so history, commands, and long-term
//! memory behave exactly as they would for a Telegram user.

use parley_agent::ChatDispatcher;
use parley_channels::CliChannel;
use parley_config::AppConfig;
use parley_core::channel::Channel;
use std::path::Path;
use std::sync::Arc;

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let bot = super::build_bot(&config).await?;

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let reply = bot.respond(&CliChannel::chat_id(), &msg).await;
        eprint!("\r              \r");
        println!("{reply}");
        return Ok(());
    }

    let provider = bot.orchestrator().invoker().provider();
    println!();
    println!("  Parley - Interactive Mode");
    println!();
    println!("  Provider:  {}", provider.name());
    println!("  Model:     {}", provider.model());
    println!("  Memory:    last {} messages", config.memory.size);
    println!();
    println!("  Type your message and press Enter. /help lists commands.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let channel: Arc<dyn Channel> = Arc::new(CliChannel::new());
    let inbound = channel
        .start()
        .await
        .map_err(|e| format!("Channel error: {e}"))?;

    ChatDispatcher::new(bot, channel).run(inbound).await;

    println!("  Goodbye! 👋");
    Ok(())
}

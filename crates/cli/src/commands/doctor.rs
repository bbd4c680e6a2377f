//! `parley doctor`: Diagnose configuration and connectivity.

use parley_channels::{TelegramChannel, TelegramConfig};
use parley_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Parley Doctor - System Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::default_path);
    if path.exists() {
        println!("  ✅ Config file found at {}", path.display());
    } else {
        println!("  ℹ️  No config file at {} (using defaults + environment)", path.display());
    }

    let config = match AppConfig::load_unvalidated(Some(&path)) {
        Ok(config) => config,
        Err(e) => {
            println!("  ❌ Config could not be loaded: {e}");
            println!("\n  ⚠️  1 issue(s) found. See above for details.");
            return Ok(());
        }
    };

    match config.validate() {
        Ok(()) => println!("  ✅ Configuration valid"),
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    // Provider
    let active = config.active_provider();
    println!("  ℹ️  Provider: {} ({})", config.provider, active.model);
    match parley_providers::build_from_config(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ {} API reachable and key accepted", provider.name()),
            Ok(false) => {
                println!("  ❌ {} API did not accept the request", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ {} health check failed: {e}", provider.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Provider not usable: {e}");
            issues += 1;
        }
    }

    // Telegram
    match config.require_telegram_token() {
        Ok(token) => {
            let telegram =
                TelegramChannel::new(TelegramConfig::from_settings(token, &config.telegram));
            match telegram.get_me().await {
                Ok(username) => println!("  ✅ Telegram bot @{username} reachable"),
                Err(e) => {
                    println!("  ❌ Telegram getMe failed: {e}");
                    issues += 1;
                }
            }
            if config.telegram.allowed_users.iter().any(|u| u == "*") {
                println!("  ⚠️  Bot answers everyone (allowed_users = [\"*\"])");
            }
        }
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    // Long-term memory
    let db_path = config.memory.db_path.trim();
    if db_path.is_empty() {
        println!("  ℹ️  Long-term memory disabled (memory.db_path is empty)");
    } else {
        match parley_memory::SqliteFactStore::new(db_path).await {
            Ok(_) => println!("  ✅ Fact database opened at {db_path}"),
            Err(e) => {
                println!("  ❌ Fact database unavailable: {e}");
                issues += 1;
            }
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

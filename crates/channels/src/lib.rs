//! Chat channel implementations for Parley.
//!
//! Each channel connects to a chat platform and relays messages to/from
//! the bot. Channels are trait-based and platform-agnostic.
//!
//! Available channels:
//! - **CLI**: interactive terminal chat (stdin/stdout)
//! - **Telegram**: Telegram Bot API over long polling

pub mod cli;
pub mod telegram;

pub use cli::CliChannel;
pub use telegram::{TelegramChannel, TelegramConfig};

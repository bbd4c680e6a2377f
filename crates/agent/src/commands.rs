//! Slash-command routing and the chat-facing [`Bot`].
//!
//! Commands are answered locally and never enter conversation history.
//! Anything that is not a command goes to the [`Orchestrator`].

use parley_core::memory::MAX_FACTS_PER_CHAT;
use parley_core::message::ChatId;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::orchestrator::Orchestrator;

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Ping,
    Provider,
    Reset,
    /// `/remember <fact>`; the argument may be empty
    Remember(String),
    Memories,
    Forget,
    Unknown(String),
}

impl Command {
    /// Parse `text` as a command. Returns `None` for ordinary messages.
    ///
    /// Accepts the `/cmd@BotName` form Telegram uses in group chats.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_start();
        let body = text.strip_prefix('/')?;

        let (head, args) = match body.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (body, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();

        Some(match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "ping" => Self::Ping,
            "provider" => Self::Provider,
            "reset" => Self::Reset,
            "remember" => Self::Remember(args.to_string()),
            "memories" => Self::Memories,
            "forget" => Self::Forget,
            _ => Self::Unknown(name),
        })
    }
}

const GREETING: &str = "👋 Hi! I'm an AI chat assistant.\n\n\
Just talk to me naturally. I remember the last few messages of our conversation.\n\n\
Use /help to see all commands.";

const HELP: &str = "🤖 Available commands\n\n\
/start    - greeting\n\
/help     - this message\n\
/ping     - check the bot is alive + uptime\n\
/provider - show the active AI provider and model\n\
/reset    - clear your conversation history\n\n\
Long-term memory 🧠\n\
/memories         - list everything I remember about you\n\
/remember <fact>  - manually store a fact\n\
/forget           - wipe all my long-term memories";

/// Answers one incoming chat message, either a command or a turn.
pub struct Bot {
    orchestrator: Arc<Orchestrator>,
    started: Instant,
}

impl Bot {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            started: Instant::now(),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Produce the one reply owed for `text`. Failed turns, blank input
    /// included, answer with an apology.
    pub async fn respond(&self, chat_id: &ChatId, text: &str) -> String {
        if let Some(command) = Command::parse(text) {
            debug!(chat_id = %chat_id, command = ?command, "Handling command");
            return self.run_command(chat_id, command).await;
        }

        match self.orchestrator.handle_user_message(chat_id, text).await {
            Ok(reply) => reply,
            Err(e) => e.user_message().to_string(),
        }
    }

    async fn run_command(&self, chat_id: &ChatId, command: Command) -> String {
        match command {
            Command::Start => GREETING.to_string(),
            Command::Help => HELP.to_string(),
            Command::Ping => format!("pong 🏓  (uptime: {})", format_uptime(self.started.elapsed())),
            Command::Provider => {
                let provider = self.orchestrator.invoker().provider();
                format!("Provider: {}\nModel: {}", provider.name(), provider.model())
            }
            Command::Reset => {
                self.orchestrator.reset(chat_id).await;
                "✅ Conversation history cleared.".to_string()
            }
            Command::Remember(fact) => self.remember(chat_id, &fact).await,
            Command::Memories => self.memories(chat_id).await,
            Command::Forget => self.forget(chat_id).await,
            Command::Unknown(name) => {
                format!("Unknown command /{name}. Use /help to see what I can do.")
            }
        }
    }

    async fn remember(&self, chat_id: &ChatId, fact: &str) -> String {
        if fact.trim().is_empty() {
            return "Usage: /remember <fact>\nExample: /remember My dog is called Rex".into();
        }
        let Some(facts) = self.orchestrator.facts() else {
            return "Long-term memory is disabled.".into();
        };
        match facts.add(chat_id, fact).await {
            Ok(true) => "✅ Got it, I'll remember that!".into(),
            Ok(false) => format!(
                "⚠️ Memory is full ({MAX_FACTS_PER_CHAT} facts). Use /forget to clear it first."
            ),
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "Failed to store fact");
                "⚠️ I couldn't save that right now. Please try again later.".into()
            }
        }
    }

    async fn memories(&self, chat_id: &ChatId) -> String {
        let Some(facts) = self.orchestrator.facts() else {
            return "Long-term memory is disabled.".into();
        };
        match facts.list(chat_id).await {
            Ok(list) if list.is_empty() => "🧠 I don't have any long-term memories yet.\n\
                 Just tell me things like your name or what to call me!"
                .into(),
            Ok(list) => {
                let lines: Vec<String> = list
                    .iter()
                    .enumerate()
                    .map(|(i, fact)| format!("{}. {fact}", i + 1))
                    .collect();
                format!("🧠 What I remember about you:\n\n{}", lines.join("\n"))
            }
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "Failed to list facts");
                "⚠️ I couldn't read my memories right now.".into()
            }
        }
    }

    async fn forget(&self, chat_id: &ChatId) -> String {
        if self.orchestrator.facts().is_none() {
            return "Long-term memory is disabled.".into();
        }
        match self.orchestrator.forget_facts(chat_id).await {
            Ok(()) => "🗑️ Long-term memories cleared.".into(),
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "Failed to clear facts");
                "⚠️ I couldn't clear my memories right now.".into()
            }
        }
    }
}

/// `H:MM:SS`, with days prefixed once uptime passes 24 hours.
fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (h, m, s) = (rem / 3600, (rem % 3600) / 60, rem % 60);
    if days > 0 {
        format!("{days} day{}, {h}:{m:02}:{s:02}", if days == 1 { "" } else { "s" })
    } else {
        format!("{h}:{m:02}:{s:02}")
    }
}

//! CLI channel: interactive terminal-based chat.
//!
//! Reads lines from stdin, writes replies to stdout. Used by `parley chat`.
//! The whole session is a single chat.

use async_trait::async_trait;
use parley_core::channel::{Channel, ChannelId, ChannelMessage};
use parley_core::error::ChannelError;
use parley_core::message::ChatId;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub const CLI_CHAT_ID: &str = "cli_session";

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    id: ChannelId,
}

impl CliChannel {
    pub fn new() -> Self {
        Self {
            id: ChannelId("cli".into()),
        }
    }

    pub fn chat_id() -> ChatId {
        ChatId::from(CLI_CHAT_ID)
    }

    /// Forward lines from `reader` until EOF or an exit word.
    fn spawn_reader<R>(&self, reader: R) -> mpsc::Receiver<Result<ChannelMessage, ChannelError>>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(32);
        let channel_id = self.id.clone();

        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        if is_exit(&line) {
                            break;
                        }

                        let msg = ChannelMessage {
                            channel_id: channel_id.clone(),
                            sender_id: "local_user".into(),
                            sender_name: Some("User".into()),
                            content: line,
                            chat_id: CliChannel::chat_id(),
                            message_id: None,
                        };
                        if tx.send(Ok(msg)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        rx
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn is_exit(line: &str) -> bool {
    matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q")
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    fn id(&self) -> &ChannelId {
        &self.id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        Ok(self.spawn_reader(BufReader::new(io::stdin())))
    }

    async fn send(
        &self,
        _chat_id: &ChatId,
        content: &str,
        _reply_to: Option<&str>,
    ) -> Result<(), ChannelError> {
        println!("\n🤖 {content}\n");
        Ok(())
    }

    fn is_allowed(&self, _sender_id: &str) -> bool {
        true // local user
    }
}

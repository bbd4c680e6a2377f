//! Telegram channel adapter.
//!
//! Talks to the Telegram Bot API directly over HTTPS:
//! - `getUpdates` long polling with offset tracking
//! - `sendMessage`, splitting replies at Telegram's 4096-character limit
//! - `sendChatAction` for the typing indicator
//!
//! Only text messages are forwarded; stickers, photos and service messages
//! are skipped.

use async_trait::async_trait;
use parley_config::TelegramSettings;
use parley_core::channel::{Channel, ChannelId, ChannelMessage};
use parley_core::error::ChannelError;
use parley_core::message::ChatId;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
/// Telegram rejects longer messages.
pub const MAX_MESSAGE_UNITS: usize = 4096;
const API_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Telegram channel configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub bot_token: String,
    /// Allowed user IDs or usernames. Empty = deny all, ["*"] = allow all.
    pub allowed_users: Vec<String>,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,
}

impl TelegramConfig {
    pub fn from_settings(token: impl Into<String>, settings: &TelegramSettings) -> Self {
        Self {
            bot_token: token.into(),
            allowed_users: settings.allowed_users.clone(),
            poll_timeout_secs: settings.poll_timeout_secs,
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("allowed_users", &self.allowed_users)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

/// Telegram channel adapter.
pub struct TelegramChannel {
    config: TelegramConfig,
    channel_id: ChannelId,
    client: reqwest::Client,
    api_base: String,
    polling: Arc<AtomicBool>,
    last_update_id: Arc<AtomicI64>,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            channel_id: ChannelId("telegram".into()),
            client: reqwest::Client::new(),
            api_base: TELEGRAM_API_BASE.into(),
            polling: Arc::new(AtomicBool::new(false)),
            last_update_id: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Use a different Bot API server (self-hosted `telegram-bot-api`, tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        method_url(&self.api_base, &self.config.bot_token, method)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, ChannelError> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&params)
            .timeout(API_TIMEOUT)
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;

        let body: TelegramResponse<T> = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;
        body.into_result()
    }

    /// Call `getMe` and return the bot's username.
    pub async fn get_me(&self) -> Result<String, ChannelError> {
        let me: TelegramUser = self.call("getMe", serde_json::json!({})).await?;
        Ok(me.username.unwrap_or_else(|| me.id.to_string()))
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn id(&self) -> &ChannelId {
        &self.channel_id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        if self.config.bot_token.trim().is_empty() {
            return Err(ChannelError::NotConfigured("TELEGRAM_BOT_TOKEN is empty".into()));
        }
        if self.polling.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::NotConfigured("Telegram polling already running".into()));
        }

        let (tx, rx) = mpsc::channel(64);
        let poller = Poller {
            client: self.client.clone(),
            url: self.api_url("getUpdates"),
            timeout_secs: self.config.poll_timeout_secs,
            polling: Arc::clone(&self.polling),
            last_update_id: Arc::clone(&self.last_update_id),
            channel_id: self.channel_id.clone(),
        };
        tokio::spawn(poller.run(tx));

        info!("Telegram channel started (long polling)");
        Ok(rx)
    }

    async fn send(
        &self,
        chat_id: &ChatId,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<(), ChannelError> {
        let reply_to: Option<i64> = reply_to.and_then(|id| id.parse().ok());

        for (i, chunk) in split_message(content, MAX_MESSAGE_UNITS).iter().enumerate() {
            let mut params = serde_json::json!({
                "chat_id": chat_id.as_str(),
                "text": chunk,
            });
            // Only the first chunk threads onto the user's message.
            if let (0, Some(id)) = (i, reply_to) {
                params["reply_to_message_id"] = serde_json::json!(id);
            }
            self.call::<serde_json::Value>("sendMessage", params)
                .await
                .map_err(|e| ChannelError::DeliveryFailed {
                    channel: "telegram".into(),
                    reason: e.to_string(),
                })?;
        }

        debug!(chat_id = %chat_id, content_len = content.len(), "Telegram reply sent");
        Ok(())
    }

    async fn send_typing(&self, chat_id: &ChatId) -> Result<(), ChannelError> {
        self.call::<bool>(
            "sendChatAction",
            serde_json::json!({ "chat_id": chat_id.as_str(), "action": "typing" }),
        )
        .await
        .map(|_| ())
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        is_allowed(&self.config.allowed_users, sender_id)
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        info!("Telegram channel stopping");
        self.polling.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Background long-poll loop.
struct Poller {
    client: reqwest::Client,
    url: String,
    timeout_secs: u64,
    polling: Arc<AtomicBool>,
    last_update_id: Arc<AtomicI64>,
    channel_id: ChannelId,
}

impl Poller {
    async fn run(self, tx: mpsc::Sender<Result<ChannelMessage, ChannelError>>) {
        while self.polling.load(Ordering::SeqCst) {
            let updates = match self.poll().await {
                Ok(updates) => updates,
                Err(e) => {
                    error!(error = %e, "Telegram polling error");
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    continue;
                }
            };

            for update in updates {
                self.last_update_id.fetch_max(update.update_id, Ordering::SeqCst);
                let Some(msg) = update.into_channel_message(&self.channel_id) else {
                    continue;
                };
                if tx.send(Ok(msg)).await.is_err() {
                    warn!("Message receiver dropped, stopping polling");
                    self.polling.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
        info!("Telegram polling stopped");
    }

    async fn poll(&self) -> Result<Vec<TelegramUpdate>, ChannelError> {
        let offset = self.last_update_id.load(Ordering::SeqCst);
        let params = serde_json::json!({
            "offset": if offset > 0 { offset + 1 } else { 0 },
            "timeout": self.timeout_secs,
            "allowed_updates": ["message"],
        });

        let response = self
            .client
            .post(&self.url)
            .json(&params)
            .timeout(Duration::from_secs(self.timeout_secs + 10))
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;

        let body: TelegramResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;
        body.into_result()
    }
}

fn method_url(base: &str, token: &str, method: &str) -> String {
    format!("{base}/bot{token}/{method}")
}

fn is_allowed(allowed: &[String], sender_id: &str) -> bool {
    if allowed.is_empty() {
        return false;
    }
    if allowed.iter().any(|u| u == "*") {
        return true;
    }
    let (id, username) = sender_id.split_once(':').unwrap_or((sender_id, ""));
    allowed.iter().any(|u| {
        let u = u.trim_start_matches('@');
        u == id || u == sender_id || (!username.is_empty() && u.eq_ignore_ascii_case(username))
    })
}

/// Split `text` into chunks of at most `max_units` UTF-16 code units (the
/// unit Telegram counts message length in), preferring to break on
/// newlines, then spaces.
pub fn split_message(text: &str, max_units: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while utf16_len(rest) > max_units {
        let hard_end = utf16_boundary(rest, max_units);
        let window = &rest[..hard_end];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(hard_end);

        chunks.push(rest[..cut].to_string());
        rest = rest[cut..].trim_start_matches(['\n', ' ']);
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Largest byte offset whose prefix fits in `max_units`. Always advances
/// past at least one char.
fn utf16_boundary(text: &str, max_units: usize) -> usize {
    let mut units = 0;
    for (i, c) in text.char_indices() {
        units += c.len_utf16();
        if units > max_units {
            return if i == 0 { c.len_utf8() } else { i };
        }
    }
    text.len()
}

// --- Bot API types (internal) ---

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> TelegramResponse<T> {
    fn into_result(self) -> Result<T, ChannelError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(ChannelError::InvalidPayload(
                "Telegram returned ok but no result".into(),
            )),
            (false, _) => Err(ChannelError::InvalidPayload(format!(
                "Telegram API error: {}",
                self.description.unwrap_or_default()
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

impl TelegramUpdate {
    fn into_channel_message(self, channel_id: &ChannelId) -> Option<ChannelMessage> {
        let message = self.message?;
        let text = message.text?;
        let from = message.from?;

        let sender_id = match &from.username {
            Some(username) => format!("{}:{username}", from.id),
            None => from.id.to_string(),
        };
        let sender_name = from
            .first_name
            .clone()
            .or_else(|| from.username.clone());

        Some(ChannelMessage {
            channel_id: channel_id.clone(),
            sender_id,
            sender_name,
            content: text,
            chat_id: ChatId::from(message.chat.id),
            message_id: Some(message.message_id.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    from: Option<TelegramUser>,
    chat: TelegramChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
    first_name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

//! Memory traits: short-term chat history and long-term user facts.
//!
//! The `ConversationStore` holds the bounded rolling window sent to the model
//! on every turn. The `FactStore` keeps short free-text facts about a chat
//! (names, preferences) that outlive the window and are injected into the
//! system prompt.

use async_trait::async_trait;
use crate::error::MemoryError;
use crate::message::{ChatId, Message};

/// Per-chat bounded history.
///
/// Implementations must keep every chat's history at or below their
/// configured bound after each mutation, evicting oldest-first.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The store name (e.g., "sliding_window").
    fn name(&self) -> &str;

    /// Append a message to a chat's history, evicting the oldest entries
    /// once the bound is exceeded. Creates the history if absent.
    async fn append(&self, chat_id: &ChatId, message: Message);

    /// Snapshot of a chat's history, oldest first. Empty for unknown chats.
    async fn get(&self, chat_id: &ChatId) -> Vec<Message>;

    /// Clear a chat's history. Idempotent.
    async fn reset(&self, chat_id: &ChatId);
}

/// Persistent per-chat fact store.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Store a fact. Returns `false` when the fact is blank or the chat
    /// already holds the maximum number of facts.
    async fn add(&self, chat_id: &ChatId, fact: &str) -> std::result::Result<bool, MemoryError>;

    /// All facts for a chat, oldest first.
    async fn list(&self, chat_id: &ChatId) -> std::result::Result<Vec<String>, MemoryError>;

    /// Number of facts stored for a chat.
    async fn count(&self, chat_id: &ChatId) -> std::result::Result<usize, MemoryError>;

    /// Delete every fact for a chat.
    async fn clear(&self, chat_id: &ChatId) -> std::result::Result<(), MemoryError>;
}

/// Hard cap on facts kept per chat, so the system prompt stays small.
pub const MAX_FACTS_PER_CHAT: usize = 50;

//! Per-chat sliding-window history.
//!
//! Each chat owns a `VecDeque` capped at `capacity` messages. Appending past
//! the cap evicts from the front, regardless of role.

use async_trait::async_trait;
use parley_core::memory::ConversationStore;
use parley_core::message::{ChatId, Message};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Default number of messages kept per chat.
pub const DEFAULT_CAPACITY: usize = 10;

pub struct SlidingWindowStore {
    capacity: usize,
    chats: RwLock<HashMap<ChatId, VecDeque<Message>>>,
}

impl SlidingWindowStore {
    /// Create a store keeping at most `capacity` messages per chat.
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            chats: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of chats with a history entry.
    pub async fn chat_count(&self) -> usize {
        self.chats.read().await.len()
    }
}

impl Default for SlidingWindowStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl ConversationStore for SlidingWindowStore {
    fn name(&self) -> &str {
        "sliding_window"
    }

    async fn append(&self, chat_id: &ChatId, message: Message) {
        let mut chats = self.chats.write().await;
        let history = chats
            .entry(chat_id.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        history.push_back(message);
        while history.len() > self.capacity {
            history.pop_front();
        }
    }

    async fn get(&self, chat_id: &ChatId) -> Vec<Message> {
        self.chats
            .read()
            .await
            .get(chat_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn reset(&self, chat_id: &ChatId) {
        if let Some(history) = self.chats.write().await.get_mut(chat_id) {
            history.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::message::Role;

    fn contents(history: &[Message]) -> Vec<&str> {
        history.iter().map(|m| m.content.as_str()).collect()
    }

    #[tokio::test]
    async fn unknown_chat_is_empty() {
        let store = SlidingWindowStore::default();
        assert!(store.get(&ChatId::from(1_i64)).await.is_empty());
        assert_eq!(store.chat_count().await, 0);
    }

    #[tokio::test]
    async fn evicts_oldest_first() {
        let store = SlidingWindowStore::new(3);
        let chat = ChatId::from(42_i64);
        for i in 0..7 {
            store.append(&chat, Message::user(format!("m{i}"))).await;
            assert!(store.get(&chat).await.len() <= 3);
        }
        assert_eq!(contents(&store.get(&chat).await), vec!["m4", "m5", "m6"]);
    }

    #[tokio::test]
    async fn eviction_ignores_role() {
        let store = SlidingWindowStore::new(2);
        let chat = ChatId::from("c");
        store.append(&chat, Message::user("q1")).await;
        store.append(&chat, Message::assistant("a1")).await;
        store.append(&chat, Message::user("q2")).await;

        let history = store.get(&chat).await;
        assert_eq!(history[0].role, Role::Assistant);
        assert_eq!(contents(&history), vec!["a1", "q2"]);
    }

    #[tokio::test]
    async fn chats_are_isolated() {
        let store = SlidingWindowStore::new(2);
        let a = ChatId::from(1_i64);
        let b = ChatId::from(2_i64);
        store.append(&a, Message::user("for a")).await;
        store.append(&b, Message::user("for b")).await;
        store.append(&b, Message::user("again b")).await;
        store.append(&b, Message::user("more b")).await;

        assert_eq!(contents(&store.get(&a).await), vec!["for a"]);
        assert_eq!(contents(&store.get(&b).await), vec!["again b", "more b"]);
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let store = SlidingWindowStore::default();
        let chat = ChatId::from(7_i64);
        store.reset(&chat).await;
        store.append(&chat, Message::user("hello")).await;
        store.reset(&chat).await;
        assert!(store.get(&chat).await.is_empty());
        store.reset(&chat).await;
        assert!(store.get(&chat).await.is_empty());
    }

    #[tokio::test]
    async fn zero_capacity_keeps_latest() {
        let store = SlidingWindowStore::new(0);
        assert_eq!(store.capacity(), 1);
        let chat = ChatId::from(1_i64);
        store.append(&chat, Message::user("a")).await;
        store.append(&chat, Message::user("b")).await;
        assert_eq!(contents(&store.get(&chat).await), vec!["b"]);
    }
}

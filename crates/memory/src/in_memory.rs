//! In-memory fact store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use parley_core::error::MemoryError;
use parley_core::memory::{FactStore, MAX_FACTS_PER_CHAT};
use parley_core::message::ChatId;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Facts kept in a map; lost when the process exits.
pub struct InMemoryFactStore {
    facts: RwLock<HashMap<ChatId, Vec<String>>>,
}

impl InMemoryFactStore {
    pub fn new() -> Self {
        Self {
            facts: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryFactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FactStore for InMemoryFactStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn add(&self, chat_id: &ChatId, fact: &str) -> Result<bool, MemoryError> {
        let fact = fact.trim();
        if fact.is_empty() {
            return Ok(false);
        }
        let mut facts = self.facts.write().await;
        let entry = facts.entry(chat_id.clone()).or_default();
        if entry.len() >= MAX_FACTS_PER_CHAT {
            return Ok(false);
        }
        entry.push(fact.to_string());
        Ok(true)
    }

    async fn list(&self, chat_id: &ChatId) -> Result<Vec<String>, MemoryError> {
        Ok(self
            .facts
            .read()
            .await
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn count(&self, chat_id: &ChatId) -> Result<usize, MemoryError> {
        Ok(self.facts.read().await.get(chat_id).map_or(0, Vec::len))
    }

    async fn clear(&self, chat_id: &ChatId) -> Result<(), MemoryError> {
        self.facts.write().await.remove(chat_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_and_list_in_order() {
        let store = InMemoryFactStore::new();
        let chat = ChatId::from(1_i64);
        assert!(store.add(&chat, "  Name is David ").await.unwrap());
        assert!(store.add(&chat, "Likes tea").await.unwrap());
        assert_eq!(
            store.list(&chat).await.unwrap(),
            vec!["Name is David".to_string(), "Likes tea".to_string()]
        );
    }

    #[tokio::test]
    async fn blank_fact_rejected() {
        let store = InMemoryFactStore::new();
        let chat = ChatId::from(1_i64);
        assert!(!store.add(&chat, "   ").await.unwrap());
        assert_eq!(store.count(&chat).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cap_enforced() {
        let store = InMemoryFactStore::new();
        let chat = ChatId::from(1_i64);
        for i in 0..MAX_FACTS_PER_CHAT {
            assert!(store.add(&chat, &format!("fact {i}")).await.unwrap());
        }
        assert!(!store.add(&chat, "one too many").await.unwrap());
        assert_eq!(store.count(&chat).await.unwrap(), MAX_FACTS_PER_CHAT);
    }

    #[tokio::test]
    async fn clear_only_affects_one_chat() {
        let store = InMemoryFactStore::new();
        let a = ChatId::from(1_i64);
        let b = ChatId::from(2_i64);
        store.add(&a, "a fact").await.unwrap();
        store.add(&b, "b fact").await.unwrap();
        store.clear(&a).await.unwrap();
        assert_eq!(store.count(&a).await.unwrap(), 0);
        assert_eq!(store.count(&b).await.unwrap(), 1);
    }
}

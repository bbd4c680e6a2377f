//! The conversation orchestrator: one chat turn from user text to reply.
//!
//! A turn is:
//!
//! 1. **Validate** the text (empty input is rejected before any side effect)
//! 2. **Record** the user message in the chat's sliding window
//! 3. **Build context** (system prompt + long-term facts + bounded history)
//! 4. **Invoke** the provider through the [`ResilientInvoker`]
//! 5. **Record** the assistant reply, but only if the invocation succeeded
//!
//! Turns for the same chat are serialized by a per-chat lock; turns for
//! different chats proceed concurrently. Background fact extraction stores
//! its results under the same lock, and discards them if the chat's facts
//! were forgotten while the extraction call was in flight.

use parley_config::AppConfig;
use parley_core::error::MemoryError;
use parley_core::memory::{ConversationStore, FactStore};
use parley_core::message::{ChatId, Message};
use parley_core::provider::ProviderRequest;
use parley_providers::{InvocationOutcome, ResilientInvoker};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::TurnError;
use crate::facts;

pub struct Orchestrator {
    /// Short-term history
    store: Arc<dyn ConversationStore>,

    /// Provider plus retry policy
    invoker: Arc<ResilientInvoker>,

    /// Optional long-term facts injected into the system prompt
    facts: Option<Arc<dyn FactStore>>,

    /// Base system instruction
    system_prompt: String,

    temperature: f32,
    max_tokens: Option<u32>,

    /// Run background fact extraction after successful turns
    extract_facts: bool,

    chat_locks: Arc<ChatLocks>,

    /// Bumped on every `forget_facts`, per chat
    fact_epochs: Arc<Mutex<HashMap<ChatId, u64>>>,
}

/// One lock per chat with work queued or in flight.
#[derive(Default)]
struct ChatLocks {
    locks: Mutex<HashMap<ChatId, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    /// Run `work` while holding the chat's lock. Waiters are served FIFO.
    async fn run<T>(&self, chat_id: &ChatId, work: impl Future<Output = T>) -> T {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(chat_id.clone()).or_default())
        };
        let output = {
            let _held = lock.lock().await;
            work.await
        };
        drop(lock);

        // Drop the entry once nobody else holds or waits on it.
        let mut locks = self.locks.lock().await;
        if locks
            .get(chat_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(chat_id);
        }
        output
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

impl Orchestrator {
    pub fn new(store: Arc<dyn ConversationStore>, invoker: Arc<ResilientInvoker>) -> Self {
        Self {
            store,
            invoker,
            facts: None,
            system_prompt: String::new(),
            temperature: 0.7,
            max_tokens: None,
            extract_facts: false,
            chat_locks: Arc::default(),
            fact_epochs: Arc::default(),
        }
    }

    /// Apply the prompt and sampling settings from config.
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.system_prompt = config.system_prompt.clone();
        self.temperature = config.temperature;
        self.max_tokens = Some(config.max_tokens);
        self.extract_facts = config.memory.extract_facts;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Attach a long-term fact store.
    pub fn with_facts(mut self, facts: Arc<dyn FactStore>) -> Self {
        self.facts = Some(facts);
        self
    }

    /// Enable or disable background fact extraction.
    pub fn with_fact_extraction(mut self, enabled: bool) -> Self {
        self.extract_facts = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn facts(&self) -> Option<&Arc<dyn FactStore>> {
        self.facts.as_ref()
    }

    pub fn invoker(&self) -> &Arc<ResilientInvoker> {
        &self.invoker
    }

    /// Run one turn for `chat_id`.
    ///
    /// On failure the user message stays in history and no assistant entry
    /// is added.
    pub async fn handle_user_message(
        &self,
        chat_id: &ChatId,
        text: &str,
    ) -> Result<String, TurnError> {
        let text = text.trim();
        if text.is_empty() {
            debug!(chat_id = %chat_id, "Rejected empty message");
            return Err(TurnError::Validation);
        }

        self.chat_locks.run(chat_id, self.run_turn(chat_id, text)).await
    }

    /// Clear the chat's short-term history. Waits for any turn in flight.
    pub async fn reset(&self, chat_id: &ChatId) {
        self.chat_locks.run(chat_id, self.store.reset(chat_id)).await;
        info!(chat_id = %chat_id, "Conversation history cleared");
    }

    /// Delete the chat's long-term facts. Extractions still in flight for
    /// this chat are discarded instead of stored.
    pub async fn forget_facts(&self, chat_id: &ChatId) -> Result<(), MemoryError> {
        let Some(store) = &self.facts else {
            return Ok(());
        };
        self.chat_locks
            .run(chat_id, async {
                *self.fact_epochs.lock().await.entry(chat_id.clone()).or_default() += 1;
                store.clear(chat_id).await
            })
            .await?;
        info!(chat_id = %chat_id, "Long-term facts cleared");
        Ok(())
    }

    async fn run_turn(&self, chat_id: &ChatId, text: &str) -> Result<String, TurnError> {
        self.store.append(chat_id, Message::user(text)).await;
        let history = self.store.get(chat_id).await;

        let system = self.system_prompt_for(chat_id).await;
        let mut request = ProviderRequest::new(history).with_temperature(self.temperature);
        if !system.trim().is_empty() {
            request = request.with_system(system);
        }
        if let Some(max) = self.max_tokens {
            request = request.with_max_tokens(max);
        }

        debug!(
            chat_id = %chat_id,
            history = request.messages.len(),
            "Invoking provider for turn"
        );

        match self.invoker.invoke(request).await {
            InvocationOutcome::Success(response) => {
                self.store
                    .append(chat_id, Message::assistant(response.text.clone()))
                    .await;
                if let Some(usage) = &response.usage {
                    debug!(
                        chat_id = %chat_id,
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "Turn complete"
                    );
                }
                self.spawn_fact_extraction(chat_id, text).await;
                Ok(response.text)
            }
            InvocationOutcome::Failure(failure) => {
                warn!(
                    chat_id = %chat_id,
                    kind = %failure.kind,
                    attempts = failure.attempts,
                    error = %failure.error,
                    "Turn failed"
                );
                Err(TurnError::Provider(failure))
            }
        }
    }

    async fn system_prompt_for(&self, chat_id: &ChatId) -> String {
        let Some(store) = &self.facts else {
            return self.system_prompt.clone();
        };
        match store.list(chat_id).await {
            Ok(list) => facts::render_system_prompt(&self.system_prompt, &list),
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "Fact lookup failed, using base prompt");
                self.system_prompt.clone()
            }
        }
    }

    /// Called with the chat lock held, so the epoch read here is current.
    async fn spawn_fact_extraction(&self, chat_id: &ChatId, text: &str) {
        if !self.extract_facts {
            return;
        }
        let Some(store) = self.facts.clone() else {
            return;
        };
        let epoch = fact_epoch(&self.fact_epochs, chat_id).await;
        let invoker = Arc::clone(&self.invoker);
        let locks = Arc::clone(&self.chat_locks);
        let epochs = Arc::clone(&self.fact_epochs);
        let chat_id = chat_id.clone();
        let text = text.to_string();

        tokio::spawn(async move {
            let found = facts::extract_facts(&invoker, &chat_id, &text).await;
            if found.is_empty() {
                return;
            }
            locks
                .run(&chat_id, async {
                    if fact_epoch(&epochs, &chat_id).await != epoch {
                        debug!(chat_id = %chat_id, "Facts forgotten during extraction, discarding");
                        return;
                    }
                    facts::store_facts(store.as_ref(), &chat_id, &found).await;
                })
                .await;
        });
    }

    #[cfg(test)]
    async fn tracked_chats(&self) -> usize {
        self.chat_locks.len().await
    }
}

async fn fact_epoch(epochs: &Mutex<HashMap<ChatId, u64>>, chat_id: &ChatId) -> u64 {
    epochs.lock().await.get(chat_id).copied().unwrap_or(0)
}

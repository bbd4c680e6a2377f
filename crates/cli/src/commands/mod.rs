//! CLI subcommand implementations.

pub mod chat;
pub mod config_cmd;
pub mod doctor;
pub mod serve;

use parley_agent::{Bot, Orchestrator};
use parley_config::AppConfig;
use parley_core::memory::{ConversationStore, FactStore};
use parley_memory::{SlidingWindowStore, SqliteFactStore};
use std::sync::Arc;
use tracing::info;

/// Wire provider, memory, and orchestrator into a [`Bot`].
///
/// An empty `memory.db_path` runs without long-term facts.
pub(crate) async fn build_bot(config: &AppConfig) -> Result<Arc<Bot>, Box<dyn std::error::Error>> {
    let invoker = parley_providers::build_invoker(config)
        .map_err(|e| format!("Failed to build provider: {e}"))?;
    info!(
        provider = invoker.provider().name(),
        model = invoker.provider().model(),
        "Provider ready"
    );

    let store = Arc::new(SlidingWindowStore::new(config.memory.size));
    info!(store = store.name(), window = store.capacity(), "Short-term memory ready");
    let mut orchestrator = Orchestrator::new(store, Arc::new(invoker)).with_config(config);

    let db_path = config.memory.db_path.trim();
    if !db_path.is_empty() {
        let facts = SqliteFactStore::new(db_path)
            .await
            .map_err(|e| format!("Failed to open fact database {db_path}: {e}"))?;
        info!(backend = facts.name(), path = db_path, "Long-term memory enabled");
        orchestrator = orchestrator.with_facts(Arc::new(facts));
    }

    Ok(Arc::new(Bot::new(Arc::new(orchestrator))))
}

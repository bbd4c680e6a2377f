//! Long-term fact handling: prompt rendering and background extraction.
//!
//! After a successful turn the user's message is sent back to the provider
//! with an extraction instruction. Whatever JSON array of strings comes back
//! is stored in the chat's [`FactStore`]. Extraction never affects the turn
//! that triggered it; every failure here is logged and dropped.

use parley_core::memory::FactStore;
use parley_core::message::{ChatId, Message};
use parley_core::provider::ProviderRequest;
use parley_providers::{InvocationOutcome, ResilientInvoker};
use tracing::{debug, warn};

pub const EXTRACTION_PROMPT: &str = "Extract personal facts worth remembering long-term from the user's message.\n\
Examples: user's name or nickname, bot name, location, language preference, relationships, likes/dislikes.\n\
Return ONLY a JSON array of short fact strings, e.g.:\n\
[\"User's name is David\", \"User wants the bot to be called Jarvis\"]\n\
Return an empty array [] if there is nothing worth remembering.\n\
Be concise. One fact per item. No explanation outside the JSON array.";

const FACTS_HEADING: &str = "## What you know about this user (long-term memory)";

/// Append stored facts to the base instruction.
pub fn render_system_prompt(base: &str, facts: &[String]) -> String {
    if facts.is_empty() {
        return base.to_string();
    }
    let mut prompt = String::with_capacity(base.len() + 64 + facts.len() * 32);
    prompt.push_str(base);
    prompt.push_str("\n\n");
    prompt.push_str(FACTS_HEADING);
    for fact in facts {
        prompt.push_str("\n- ");
        prompt.push_str(fact);
    }
    prompt
}

/// Pull the first JSON array of strings out of a model reply.
///
/// Models often wrap the array in prose or code fences, so every `]` after
/// the first `[` is tried as a closing bracket until one parses.
pub fn parse_facts(reply: &str) -> Vec<String> {
    let Some(start) = reply.find('[') else {
        return Vec::new();
    };

    for (offset, _) in reply[start..].match_indices(']') {
        let candidate = &reply[start..=start + offset];
        if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(candidate) {
            return values
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) if !s.trim().is_empty() => {
                        Some(s.trim().to_string())
                    }
                    _ => None,
                })
                .collect();
        }
    }
    Vec::new()
}

/// Ask the provider which facts in `text` are worth keeping. Failures are
/// logged and yield nothing.
pub async fn extract_facts(invoker: &ResilientInvoker, chat_id: &ChatId, text: &str) -> Vec<String> {
    let request = ProviderRequest::new(vec![Message::user(text)])
        .with_system(EXTRACTION_PROMPT)
        .with_temperature(0.0);

    match invoker.invoke(request).await {
        InvocationOutcome::Success(response) => parse_facts(&response.text),
        InvocationOutcome::Failure(failure) => {
            warn!(chat_id = %chat_id, error = %failure, "Fact extraction failed");
            Vec::new()
        }
    }
}

/// Store `found` until the chat's store is full. Returns how many were stored.
pub async fn store_facts(facts: &dyn FactStore, chat_id: &ChatId, found: &[String]) -> usize {
    let mut stored = 0;
    for fact in found {
        match facts.add(chat_id, fact).await {
            Ok(true) => stored += 1,
            Ok(false) => {
                debug!(chat_id = %chat_id, "Fact store full, skipping remaining facts");
                break;
            }
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "Failed to store fact");
                break;
            }
        }
    }

    if stored > 0 {
        debug!(chat_id = %chat_id, stored, "Stored extracted facts");
    }
    stored
}

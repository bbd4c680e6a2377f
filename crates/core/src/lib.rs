//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley chat relay.
//! This crate has no framework dependencies; it defines the domain model
//! that all other crates implement against.
//!
//! Every subsystem is a trait here and its implementations live in their own
//! crates, so backends can be swapped through configuration and replaced by
//! stubs in tests.

pub mod error;
pub mod message;
pub mod provider;
pub mod channel;
pub mod memory;

// Re-export key types at crate root for ergonomics
pub use error::FailureKind;
pub use message::{ChatId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use channel::{Channel, ChannelId, ChannelMessage};
pub use memory::{ConversationStore, FactStore, MAX_FACTS_PER_CHAT};

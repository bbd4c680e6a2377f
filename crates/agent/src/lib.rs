//! Conversation handling for Parley.
//!
//! Incoming chat text flows through three layers:
//!
//! 1. [`ChatDispatcher`] queues messages per chat and delivers replies
//! 2. [`Bot`] answers slash commands locally and forwards everything else
//! 3. [`Orchestrator`] runs one turn: memory read, provider call, memory write
//!
//! Turns for one chat never overlap; turns for different chats do.

pub mod commands;
pub mod dispatcher;
pub mod error;
pub mod facts;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use commands::{Bot, Command};
pub use dispatcher::ChatDispatcher;
pub use error::TurnError;
pub use orchestrator::Orchestrator;

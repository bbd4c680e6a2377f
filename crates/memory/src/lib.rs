//! Memory implementations for Parley.
//!
//! - [`SlidingWindowStore`]: the bounded per-chat history sent to the model.
//! - [`SqliteFactStore`]: persistent long-term facts (behind the `sqlite` feature).
//! - [`InMemoryFactStore`]: ephemeral facts for tests and `parley chat`.

pub mod in_memory;
pub mod sliding_window;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryFactStore;
pub use sliding_window::SlidingWindowStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteFactStore;

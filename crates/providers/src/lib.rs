//! LLM provider backends for Parley.
//!
//! Both backends implement the `parley_core::Provider` trait and make exactly
//! one network attempt per call. [`ResilientInvoker`] layers timeouts and
//! retries on top; [`build_invoker`] wires the configured backend into it.

mod http;
pub mod anthropic;
pub mod openai;
pub mod retry;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use retry::{InvocationFailure, InvocationOutcome, ResilientInvoker, RetryPolicy};
pub use router::{build_from_config, build_invoker};

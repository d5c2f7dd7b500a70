//! LLM backend abstraction.
//!
//! The host treats the language model as an opaque text-in/text-out
//! completion service. Providers implement [`LlmBackend`].

mod anthropic;

pub use anthropic::{AnthropicBackend, AnthropicBackendBuilder};

use crate::Result;
use std::future::Future;

/// Trait for LLM backends.
pub trait LlmBackend: Send + Sync {
    /// Complete a single prompt, returning the model's trimmed text.
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

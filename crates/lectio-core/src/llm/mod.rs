//! Text-generation collaborator.
//!
//! The pipeline only needs `complete(prompt, max_tokens, temperature)`.
//! Callers apply their own per-call timeouts.

pub mod anthropic;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use anthropic::AnthropicGenerator;

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// Network failure, non-success status, or an unreadable body.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("completion timed out after {0:?}")]
    Timeout(Duration),

    /// Missing key, model, or other setup problem.
    #[error("misconfiguration: {0}")]
    Misconfiguration(String),
}

/// An unreliable text generator.
///
/// Responses may be malformed, omit fields, or never arrive; the interpreter
/// and generator absorb all of that.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

// Compile-time check: TextGenerator must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn TextGenerator) {}
};

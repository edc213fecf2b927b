//! LlmProvider trait definition.
//!
//! The core abstraction every model backend implements. Uses RPITIT for
//! `complete`, and `Pin<Box<dyn Stream>>` for `stream` (streams need to be
//! object-safe for the BoxLlmProvider wrapper).

use std::pin::Pin;

use futures_util::Stream;

use flowchat_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};

/// Trait for LLM provider backends.
///
/// Implementations live in flowchat-infra (e.g. `OpenAiCompatProvider`);
/// tests use scripted fakes.
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "openai_compat").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Send a streaming completion request. Returns a stream of events.
    ///
    /// Returns a boxed stream (not RPITIT) because streams need to be
    /// object-safe for the `BoxLlmProvider` wrapper.
    fn stream(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;
}

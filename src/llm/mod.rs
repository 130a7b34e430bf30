//! Model endpoint boundary.
//!
//! The agent loop only sees the [`LlmClient`] trait. [`OpenRouterClient`]
//! speaks the OpenAI-compatible chat completions API, and [`RetryingClient`]
//! wraps any client with exponential backoff for transient failures.

mod error;
mod openrouter;
mod retry;
mod scripted;
mod types;

use async_trait::async_trait;

pub use error::LlmError;
pub use openrouter::OpenRouterClient;
pub use retry::{BackoffConfig, RetryPolicy, RetryingClient};
pub use scripted::{RecordedRequest, ScriptedClient};
pub use types::{
    ChatMessage, ChatResponse, FunctionCall, FunctionDefinition, Role, TokenUsage, ToolCall,
    ToolDefinition,
};

/// A chat completion endpoint.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the conversation (and tool schemas, if any) and return one model turn.
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatResponse, LlmError>;
}

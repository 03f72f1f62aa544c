//! Provider-agnostic LLM gateway with tool-calling support.
//!
//! This module provides a unified interface over the completion providers
//! (Anthropic, OpenAI): single-shot text completions, a bounded tool-calling
//! loop, and structured-output extraction.
//!
//! ## Example
//!
//! ```rust,ignore
//! use veracity_core::llm::{
//!     AnthropicClient, CallConfig, ChatMessage, ClientConfig, Gateway, Provider,
//!     extract_json,
//! };
//!
//! let gateway = Gateway::new()
//!     .with_client(std::sync::Arc::new(AnthropicClient::new(ClientConfig::new("api-key"))));
//!
//! let config = CallConfig::new(Provider::Anthropic, "claude-3-5-sonnet-20241022")
//!     .with_system("Answer with a JSON object.");
//!
//! let completion = gateway
//!     .complete_prompt(&config, "Classify this claim", &cancel)
//!     .await?;
//! let parsed = extract_json(&completion.text)?;
//! ```

mod client;
mod extract;
mod gateway;
mod types;

pub use client::{AnthropicClient, ClientConfig, LlmClient, OpenAIClient};
pub use extract::extract_json;
pub use gateway::{Gateway, ToolHandler, MAX_TOOL_ROUNDS};
pub use types::{
    CallConfig, ChatMessage, ChatRole, CompletionRequest, CompletionResponse, ContentBlock,
    Provider, StopReason, TextCompletion, TokenUsage, ToolCall, ToolInvocation, ToolSpec,
    ToolTranscript,
};

#[cfg(test)]
pub(crate) use gateway::test_support;

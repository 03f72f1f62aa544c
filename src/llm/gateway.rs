//! Provider-agnostic gateway over the LLM clients.
//!
//! The gateway owns a registry of provider clients and exposes the two
//! operations the rest of the system uses: single-shot text completion and
//! the bounded tool-calling loop. All agent and router traffic goes through
//! here so cancellation and failure tagging live in one place.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::client::LlmClient;
use super::types::{
    CallConfig, ChatMessage, CompletionRequest, Provider, TextCompletion, TokenUsage, ToolCall,
    ToolInvocation, ToolSpec, ToolTranscript,
};

/// Hard cap on tool-loop rounds. The loop also terminates when the model
/// emits a final message with no tool calls, or when a tool raises.
pub const MAX_TOOL_ROUNDS: u32 = 6;

/// Resolves tool invocations emitted by the model during a tool loop.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// Resolve one tool call, returning the JSON result fed back to the
    /// model. An `Err` aborts the loop and surfaces as a tool fault.
    async fn handle(&self, call: &ToolCall) -> Result<Value>;
}

/// Provider-agnostic LLM gateway.
pub struct Gateway {
    clients: HashMap<Provider, Arc<dyn LlmClient>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Register a client for its provider.
    pub fn with_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.clients.insert(client.provider(), client);
        self
    }

    fn client_for(&self, provider: Provider) -> Result<&Arc<dyn LlmClient>> {
        self.clients
            .get(&provider)
            .ok_or_else(|| Error::provider(provider.to_string(), "no client registered"))
    }

    /// Single-shot completion returning text and usage.
    pub async fn complete_text(
        &self,
        config: &CallConfig,
        messages: Vec<ChatMessage>,
        cancel: &CancellationToken,
    ) -> Result<TextCompletion> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let client = self.client_for(config.provider)?;
        let request = CompletionRequest::from_config(config, messages);

        let response = tokio::select! {
            r = client.complete(request) => r?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        Ok(TextCompletion {
            text: response.text(),
            usage: response.usage,
        })
    }

    /// Convenience wrapper: one user prompt, text back.
    pub async fn complete_prompt(
        &self,
        config: &CallConfig,
        user_prompt: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<TextCompletion> {
        self.complete_text(config, vec![ChatMessage::user(user_prompt)], cancel)
            .await
    }

    /// Tool-augmented completion loop.
    ///
    /// The model emits zero or more tool invocations per round; each is
    /// resolved through `handler` and the enriched transcript re-submitted.
    /// Terminates on a final message with no tool calls, at
    /// `MAX_TOOL_ROUNDS`, or when a tool raises. Cancellation is checked
    /// before every round.
    pub async fn complete_with_tools(
        &self,
        config: &CallConfig,
        initial_messages: Vec<ChatMessage>,
        tools: Vec<ToolSpec>,
        handler: &dyn ToolHandler,
        cancel: &CancellationToken,
    ) -> Result<ToolTranscript> {
        let client = self.client_for(config.provider)?;

        let mut messages = initial_messages;
        let mut invocations: Vec<ToolInvocation> = Vec::new();
        let mut usage = TokenUsage::default();
        let mut rounds = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let request =
                CompletionRequest::from_config(config, messages.clone()).with_tools(tools.clone());

            let response = tokio::select! {
                r = client.complete(request) => r?,
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            };
            usage.add(&response.usage);
            rounds += 1;

            let tool_calls = response.tool_calls();
            messages.push(ChatMessage {
                role: super::types::ChatRole::Assistant,
                content: response.content.clone(),
            });

            if tool_calls.is_empty() {
                return Ok(ToolTranscript {
                    final_text: response.text(),
                    messages,
                    invocations,
                    rounds,
                    usage,
                });
            }

            if rounds >= MAX_TOOL_ROUNDS {
                warn!(rounds, "tool loop hit round cap before a final message");
                return Ok(ToolTranscript {
                    final_text: response.text(),
                    messages,
                    invocations,
                    rounds,
                    usage,
                });
            }

            let mut results = Vec::with_capacity(tool_calls.len());
            for call in &tool_calls {
                debug!(tool = %call.name, "resolving tool call");
                let output = handler.handle(call).await?;
                invocations.push(ToolInvocation {
                    name: call.name.clone(),
                    input: call.input.clone(),
                    output: output.clone(),
                });
                results.push((call.id.clone(), output.to_string()));
            }
            messages.push(ChatMessage::tool_results(results));
        }
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted fake client shared by gateway, agent, and router tests.

    use std::sync::Mutex;

    use super::*;
    use crate::llm::types::{CompletionResponse, ContentBlock, StopReason};

    /// Client that replays a fixed sequence of responses.
    pub struct ScriptedClient {
        provider: Provider,
        responses: Mutex<Vec<CompletionResponse>>,
        pub requests_seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        pub fn new(provider: Provider, responses: Vec<CompletionResponse>) -> Self {
            Self {
                provider,
                responses: Mutex::new(responses),
                requests_seen: Mutex::new(Vec::new()),
            }
        }

        /// A response consisting of a single text block.
        pub fn text_response(text: &str) -> CompletionResponse {
            CompletionResponse {
                id: "scripted".into(),
                model: "scripted-model".into(),
                content: vec![ContentBlock::Text { text: text.into() }],
                stop_reason: Some(StopReason::EndTurn),
                usage: TokenUsage::new(10, 5),
            }
        }

        /// A response that invokes one tool.
        pub fn tool_response(id: &str, name: &str, input: Value) -> CompletionResponse {
            CompletionResponse {
                id: "scripted".into(),
                model: "scripted-model".into(),
                content: vec![ContentBlock::ToolUse {
                    id: id.into(),
                    name: name.into(),
                    input,
                }],
                stop_reason: Some(StopReason::ToolUse),
                usage: TokenUsage::new(10, 5),
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            self.requests_seen.lock().unwrap().push(request);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(Error::provider(
                    self.provider.to_string(),
                    "scripted client exhausted",
                ));
            }
            Ok(responses.remove(0))
        }

        fn provider(&self) -> Provider {
            self.provider
        }
    }

    /// Handler that records calls and returns a fixed value per tool name.
    pub struct MapHandler {
        pub outputs: HashMap<String, Value>,
        pub calls: Mutex<Vec<ToolCall>>,
    }

    impl MapHandler {
        pub fn new(outputs: Vec<(&str, Value)>) -> Self {
            Self {
                outputs: outputs
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ToolHandler for MapHandler {
        async fn handle(&self, call: &ToolCall) -> Result<Value> {
            self.calls.lock().unwrap().push(call.clone());
            self.outputs
                .get(&call.name)
                .cloned()
                .ok_or_else(|| Error::tool(&call.name, "unknown tool"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{MapHandler, ScriptedClient};
    use super::*;
    use serde_json::json;

    fn gateway_with(responses: Vec<crate::llm::types::CompletionResponse>) -> Gateway {
        Gateway::new().with_client(Arc::new(ScriptedClient::new(Provider::Anthropic, responses)))
    }

    fn config() -> CallConfig {
        CallConfig::new(Provider::Anthropic, "scripted-model").with_system("system prompt")
    }

    #[tokio::test]
    async fn test_complete_text() {
        let gateway = gateway_with(vec![ScriptedClient::text_response("hello")]);
        let result = gateway
            .complete_prompt(&config(), "hi", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.text, "hello");
        assert_eq!(result.usage.total(), 15);
    }

    #[tokio::test]
    async fn test_missing_provider_is_provider_error() {
        let gateway = Gateway::new();
        let err = gateway
            .complete_prompt(&config(), "hi", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
    }

    #[tokio::test]
    async fn test_tool_loop_resolves_and_finishes() {
        let gateway = gateway_with(vec![
            ScriptedClient::tool_response("t1", "search_existing_claims", json!({"query": "q"})),
            ScriptedClient::text_response("final answer"),
        ]);
        let handler = MapHandler::new(vec![("search_existing_claims", json!([{"id": "c1"}]))]);

        let transcript = gateway
            .complete_with_tools(
                &config(),
                vec![ChatMessage::user("route this")],
                vec![ToolSpec::new("search_existing_claims", "search", json!({}))],
                &handler,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(transcript.final_text, "final answer");
        assert_eq!(transcript.rounds, 2);
        assert_eq!(transcript.invocations.len(), 1);
        assert!(transcript.invoked("search_existing_claims"));
        // Transcript: user, assistant(tool_use), user(tool_result), assistant(final)
        assert_eq!(transcript.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_tool_loop_round_cap() {
        // Model that never stops calling tools
        let responses: Vec<_> = (0..10)
            .map(|i| {
                ScriptedClient::tool_response(
                    &format!("t{}", i),
                    "search_existing_claims",
                    json!({"query": "again"}),
                )
            })
            .collect();
        let gateway = gateway_with(responses);
        let handler = MapHandler::new(vec![("search_existing_claims", json!([]))]);

        let transcript = gateway
            .complete_with_tools(
                &config(),
                vec![ChatMessage::user("route")],
                vec![ToolSpec::new("search_existing_claims", "search", json!({}))],
                &handler,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(transcript.rounds, MAX_TOOL_ROUNDS);
        // The capped round's calls are not resolved
        assert_eq!(transcript.invocations.len(), (MAX_TOOL_ROUNDS - 1) as usize);
    }

    #[tokio::test]
    async fn test_tool_error_aborts_loop() {
        let gateway = gateway_with(vec![ScriptedClient::tool_response(
            "t1",
            "unknown_tool",
            json!({}),
        )]);
        let handler = MapHandler::new(vec![]);

        let err = gateway
            .complete_with_tools(
                &config(),
                vec![ChatMessage::user("route")],
                vec![],
                &handler,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Tool { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let gateway = gateway_with(vec![ScriptedClient::text_response("unreachable")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = gateway
            .complete_prompt(&config(), "hi", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}

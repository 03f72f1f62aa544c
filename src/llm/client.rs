//! LLM client trait and provider implementations.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{Error, Result};

use super::types::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, ContentBlock, Provider,
    StopReason, TokenUsage,
};

/// One completion round against a provider.
///
/// Tool-loop iteration lives in the gateway; a client only ever performs a
/// single request/response exchange.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a request, which may include tool declarations.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the provider for this client.
    fn provider(&self) -> Provider;
}

/// Configuration for LLM clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API key
    pub api_key: String,
    /// Base URL override
    pub base_url: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            timeout_secs: 120,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

fn build_http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

/// Anthropic Claude client.
pub struct AnthropicClient {
    config: ClientConfig,
    http: Client,
}

impl AnthropicClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(config: ClientConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContent {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

fn to_anthropic_message(message: &ChatMessage) -> AnthropicMessage {
    AnthropicMessage {
        role: match message.role {
            ChatRole::User => "user".to_string(),
            ChatRole::Assistant => "assistant".to_string(),
        },
        content: message
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => AnthropicContent::Text { text: text.clone() },
                ContentBlock::ToolUse { id, name, input } => AnthropicContent::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                },
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                } => AnthropicContent::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: content.clone(),
                },
            })
            .collect(),
    }
}

fn from_anthropic_content(content: Vec<AnthropicContent>) -> Vec<ContentBlock> {
    content
        .into_iter()
        .map(|block| match block {
            AnthropicContent::Text { text } => ContentBlock::Text { text },
            AnthropicContent::ToolUse { id, name, input } => {
                ContentBlock::ToolUse { id, name, input }
            }
            AnthropicContent::ToolResult {
                tool_use_id,
                content,
            } => ContentBlock::ToolResult {
                tool_use_id,
                content,
            },
        })
        .collect()
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_request = AnthropicRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(to_anthropic_message).collect(),
            max_tokens: request.max_tokens,
            system: request.system,
            temperature: request.temperature,
            tools: request
                .tools
                .into_iter()
                .map(|t| AnthropicTool {
                    name: t.name,
                    description: t.description,
                    input_schema: t.input_schema,
                })
                .collect(),
        };

        let url = format!("{}/v1/messages", self.base_url());

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::provider("anthropic", format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::provider("anthropic", format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<AnthropicError>(&body) {
                return Err(Error::provider(
                    "anthropic",
                    format!("{}: {}", error.error.error_type, error.error.message),
                ));
            }
            return Err(Error::provider("anthropic", format!("{}: {}", status, body)));
        }

        let api_response: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|e| Error::provider("anthropic", format!("Failed to parse response: {}", e)))?;

        let stop_reason = api_response.stop_reason.as_deref().map(|r| match r {
            "end_turn" => StopReason::EndTurn,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            "tool_use" => StopReason::ToolUse,
            _ => StopReason::EndTurn,
        });

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content: from_anthropic_content(api_response.content),
            stop_reason,
            usage: TokenUsage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
            },
        })
    }

    fn provider(&self) -> Provider {
        Provider::Anthropic
    }
}

/// OpenAI client.
pub struct OpenAIClient {
    config: ClientConfig,
    http: Client,
}

impl OpenAIClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.openai.com";

    pub fn new(config: ClientConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAITool>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAIToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    /// JSON-encoded arguments, per the OpenAI wire format
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    id: String,
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: OpenAIUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

/// Flatten our content-block messages into the OpenAI message list.
///
/// Tool results become individual `tool`-role messages; assistant tool-use
/// blocks become `tool_calls` on the assistant message.
fn to_openai_messages(system: Option<&str>, messages: &[ChatMessage]) -> Vec<OpenAIMessage> {
    let mut out = Vec::new();

    if let Some(system) = system {
        out.push(OpenAIMessage {
            role: "system".to_string(),
            content: Some(system.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        });
    }

    for message in messages {
        let role = match message.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };

        let mut text_parts: Vec<&str> = Vec::new();
        let mut tool_calls: Vec<OpenAIToolCall> = Vec::new();
        let mut tool_results: Vec<(String, String)> = Vec::new();

        for block in &message.content {
            match block {
                ContentBlock::Text { text } => text_parts.push(text),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(OpenAIToolCall {
                    id: id.clone(),
                    call_type: "function".to_string(),
                    function: OpenAIFunctionCall {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                }),
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                } => tool_results.push((tool_use_id.clone(), content.clone())),
            }
        }

        for (tool_call_id, content) in tool_results {
            out.push(OpenAIMessage {
                role: "tool".to_string(),
                content: Some(content),
                tool_calls: Vec::new(),
                tool_call_id: Some(tool_call_id),
            });
        }

        if !text_parts.is_empty() || !tool_calls.is_empty() {
            out.push(OpenAIMessage {
                role: role.to_string(),
                content: if text_parts.is_empty() {
                    None
                } else {
                    Some(text_parts.join(""))
                },
                tool_calls,
                tool_call_id: None,
            });
        }
    }

    out
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_request = OpenAIRequest {
            model: request.model.clone(),
            messages: to_openai_messages(request.system.as_deref(), &request.messages),
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            tools: request
                .tools
                .into_iter()
                .map(|t| OpenAITool {
                    tool_type: "function".to_string(),
                    function: OpenAIFunction {
                        name: t.name,
                        description: t.description,
                        parameters: t.input_schema,
                    },
                })
                .collect(),
        };

        let url = format!("{}/v1/chat/completions", self.base_url());

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::provider("openai", format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::provider("openai", format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<OpenAIError>(&body) {
                return Err(Error::provider("openai", error.error.message));
            }
            return Err(Error::provider("openai", format!("{}: {}", status, body)));
        }

        let api_response: OpenAIResponse = serde_json::from_str(&body)
            .map_err(|e| Error::provider("openai", format!("Failed to parse response: {}", e)))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::provider("openai", "No choices in response"))?;

        let mut content = Vec::new();
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(ContentBlock::Text { text });
            }
        }
        for call in choice.message.tool_calls {
            let input: Value = serde_json::from_str(&call.function.arguments)
                .unwrap_or(Value::Object(Default::default()));
            content.push(ContentBlock::ToolUse {
                id: call.id,
                name: call.function.name,
                input,
            });
        }

        let stop_reason = choice.finish_reason.as_deref().map(|r| match r {
            "stop" => StopReason::EndTurn,
            "length" => StopReason::MaxTokens,
            "tool_calls" => StopReason::ToolUse,
            _ => StopReason::EndTurn,
        });

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content,
            stop_reason,
            usage: TokenUsage {
                input_tokens: api_response.usage.prompt_tokens,
                output_tokens: api_response.usage.completion_tokens,
            },
        })
    }

    fn provider(&self) -> Provider {
        Provider::OpenAI
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new("test-key")
            .with_base_url("https://custom.api.com")
            .with_timeout(60);

        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.base_url, Some("https://custom.api.com".to_string()));
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn test_anthropic_message_mapping() {
        let message = ChatMessage {
            role: ChatRole::Assistant,
            content: vec![
                ContentBlock::Text {
                    text: "Searching".into(),
                },
                ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "search_existing_claims".into(),
                    input: json!({"query": "flood"}),
                },
            ],
        };

        let mapped = to_anthropic_message(&message);
        assert_eq!(mapped.role, "assistant");
        assert_eq!(mapped.content.len(), 2);
        let json = serde_json::to_value(&mapped).unwrap();
        assert_eq!(json["content"][1]["type"], "tool_use");
        assert_eq!(json["content"][1]["input"]["query"], "flood");
    }

    #[test]
    fn test_openai_tool_result_becomes_tool_role() {
        let messages = vec![ChatMessage::tool_results(vec![(
            "t1".to_string(),
            "[]".to_string(),
        )])];

        let mapped = to_openai_messages(Some("sys"), &messages);
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].role, "system");
        assert_eq!(mapped[1].role, "tool");
        assert_eq!(mapped[1].tool_call_id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_openai_assistant_tool_calls_serialization() {
        let messages = vec![ChatMessage {
            role: ChatRole::Assistant,
            content: vec![ContentBlock::ToolUse {
                id: "call_1".into(),
                name: "get_claim_details".into(),
                input: json!({"claim_id": "abc"}),
            }],
        }];

        let mapped = to_openai_messages(None, &messages);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].tool_calls.len(), 1);
        assert_eq!(mapped[0].tool_calls[0].function.name, "get_claim_details");
        // Arguments travel as a JSON-encoded string
        let args: Value = serde_json::from_str(&mapped[0].tool_calls[0].function.arguments).unwrap();
        assert_eq!(args["claim_id"], "abc");
    }
}

//! LLM types for requests, responses, and tool calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// LLM provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAI => write!(f, "openai"),
        }
    }
}

impl Provider {
    /// Parse a provider name as stored in an agent prompt row.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" => Some(Self::Anthropic),
            "openai" => Some(Self::OpenAI),
            _ => None,
        }
    }
}

/// Per-call configuration: provider, model, sampling, and system prompt.
///
/// Mirrors an agent prompt row; the gateway takes one of these on every call
/// so prompt edits take effect without a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    pub provider: Provider,
    pub model: String,
    pub system_prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CallConfig {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: String::new(),
            temperature: 0.2,
            max_tokens: 4096,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = system.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Chat role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One block of message content.
///
/// Plain completions only ever carry `Text`; the tool loop adds `ToolUse`
/// (model side) and `ToolResult` (caller side) blocks to the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String },
}

/// A message in a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    /// Create a user message with plain text content.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: vec![ContentBlock::Text {
                text: content.into(),
            }],
        }
    }

    /// Create an assistant message with plain text content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: vec![ContentBlock::Text {
                text: content.into(),
            }],
        }
    }

    /// Create a user message carrying tool results back to the model.
    pub fn tool_results(results: Vec<(String, String)>) -> Self {
        Self {
            role: ChatRole::User,
            content: results
                .into_iter()
                .map(|(tool_use_id, content)| ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                })
                .collect(),
        }
    }

    /// Concatenated text blocks of this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Declaration of a tool the model may invoke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool input
    pub input_schema: Value,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A tool invocation emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Why the model stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
}

/// Token usage for a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Accumulate usage from another call.
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Provider-level completion request (one round).
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub tools: Vec<ToolSpec>,
}

impl CompletionRequest {
    pub fn from_config(config: &CallConfig, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: config.model.clone(),
            system: if config.system_prompt.is_empty() {
                None
            } else {
                Some(config.system_prompt.clone())
            },
            messages,
            max_tokens: config.max_tokens,
            temperature: Some(config.temperature),
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }
}

/// Provider-level completion response (one round).
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<StopReason>,
    pub usage: TokenUsage,
}

impl CompletionResponse {
    /// Concatenated text blocks of the response.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Tool invocations emitted in this round.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

/// Result of a plain text completion through the gateway.
#[derive(Debug, Clone)]
pub struct TextCompletion {
    pub text: String,
    pub usage: TokenUsage,
}

/// One resolved tool invocation in a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub input: Value,
    pub output: Value,
}

/// Result of a tool-augmented completion loop.
#[derive(Debug, Clone)]
pub struct ToolTranscript {
    /// Full message transcript including tool use and results
    pub messages: Vec<ChatMessage>,
    /// Every tool invocation in resolution order
    pub invocations: Vec<ToolInvocation>,
    /// Text of the model's final message
    pub final_text: String,
    /// Completed rounds (model turns)
    pub rounds: u32,
    /// Accumulated token usage across rounds
    pub usage: TokenUsage,
}

impl ToolTranscript {
    /// Invocations of a specific tool, in order.
    pub fn invocations_of(&self, name: &str) -> Vec<&ToolInvocation> {
        self.invocations.iter().filter(|i| i.name == name).collect()
    }

    /// Whether the named tool was invoked at least once.
    pub fn invoked(&self, name: &str) -> bool {
        self.invocations.iter().any(|i| i.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_text_concatenation() {
        let msg = ChatMessage {
            role: ChatRole::Assistant,
            content: vec![
                ContentBlock::Text {
                    text: "part one ".into(),
                },
                ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "search".into(),
                    input: json!({}),
                },
                ContentBlock::Text {
                    text: "part two".into(),
                },
            ],
        };
        assert_eq!(msg.text(), "part one part two");
    }

    #[test]
    fn test_tool_calls_extraction() {
        let response = CompletionResponse {
            id: "r1".into(),
            model: "m".into(),
            content: vec![
                ContentBlock::Text {
                    text: "thinking".into(),
                },
                ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "search_existing_claims".into(),
                    input: json!({"query": "flood"}),
                },
            ],
            stop_reason: Some(StopReason::ToolUse),
            usage: TokenUsage::default(),
        };

        let calls = response.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search_existing_claims");
        assert_eq!(calls[0].input["query"], "flood");
    }

    #[test]
    fn test_call_config_builder() {
        let config = CallConfig::new(Provider::Anthropic, "claude-3-5-haiku-20241022")
            .with_system("You are a router.")
            .with_temperature(0.0)
            .with_max_tokens(1024);

        assert_eq!(config.provider, Provider::Anthropic);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_tokens, 1024);

        let request = CompletionRequest::from_config(&config, vec![ChatMessage::user("hi")]);
        assert_eq!(request.system.as_deref(), Some("You are a router."));
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(Provider::parse("Anthropic"), Some(Provider::Anthropic));
        assert_eq!(Provider::parse("openai"), Some(Provider::OpenAI));
        assert_eq!(Provider::parse("mistral"), None);
    }

    #[test]
    fn test_transcript_invocation_lookup() {
        let transcript = ToolTranscript {
            messages: Vec::new(),
            invocations: vec![
                ToolInvocation {
                    name: "search_existing_claims".into(),
                    input: json!({"query": "q"}),
                    output: json!([]),
                },
                ToolInvocation {
                    name: "get_claim_details".into(),
                    input: json!({"claim_id": "abc"}),
                    output: json!({"id": "abc"}),
                },
            ],
            final_text: "done".into(),
            rounds: 2,
            usage: TokenUsage::default(),
        };

        assert!(transcript.invoked("search_existing_claims"));
        assert!(!transcript.invoked("generate_new_claim"));
        assert_eq!(transcript.invocations_of("get_claim_details").len(), 1);
    }
}

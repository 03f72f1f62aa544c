//! Context analyzer: rewrites follow-up questions using recent dialogue.
//!
//! A follow-up like "what happened during that movement?" is useless to the
//! router until it names its referent. The analyzer sees the last six
//! messages (assistant contributions truncated for economy) and produces a
//! standalone reformulation. Its prompt distinguishes a clarification of an
//! already-discussed claim from an alternative explanation, which is a new
//! claim in its own right.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};
use crate::llm::{extract_json, Gateway};
use crate::progress::{ProgressEvent, SessionEmitter};
use crate::store::Store;

/// How many trailing dialogue messages the analyzer sees.
pub const CONTEXT_WINDOW_MESSAGES: usize = 6;

/// Assistant contributions are capped at this many characters.
pub const ASSISTANT_SNIPPET_MAX_CHARS: usize = 500;

/// Speaker of a dialogue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogueRole {
    User,
    Assistant,
}

/// One message of the chat surface's conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueMessage {
    pub role: DialogueRole,
    pub content: String,
}

impl DialogueMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: DialogueRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: DialogueRole::Assistant,
            content: content.into(),
        }
    }
}

/// Result of context analysis.
#[derive(Debug, Clone)]
pub struct Reformulation {
    pub original_question: String,
    pub reformulated_question: String,
    /// The truncated window the analyzer actually saw (logged with the
    /// routing decision)
    pub window: Vec<DialogueMessage>,
}

/// Reformulates follow-up questions against recent dialogue.
pub struct ContextAnalyzer {
    store: Store,
    gateway: Arc<Gateway>,
}

impl ContextAnalyzer {
    pub fn new(store: Store, gateway: Arc<Gateway>) -> Self {
        Self { store, gateway }
    }

    /// Produce a standalone question. Standalone inputs pass through; an
    /// analyzer-level LLM failure also passes the question through rather
    /// than failing the ask path.
    pub async fn reformulate(
        &self,
        question: &str,
        history: &[DialogueMessage],
        emitter: &SessionEmitter,
        cancel: &CancellationToken,
    ) -> Result<Reformulation> {
        if question.trim().is_empty() {
            return Err(Error::bad_input("question must not be empty"));
        }

        let window = truncate_window(history);
        let passthrough = |window: Vec<DialogueMessage>| Reformulation {
            original_question: question.to_string(),
            reformulated_question: question.to_string(),
            window,
        };

        // An initial question has nothing to resolve against
        if window.is_empty() {
            return Ok(passthrough(window));
        }

        emitter.emit(ProgressEvent::context_analysis_started(question));

        match self.ask_llm(question, &window, cancel).await {
            Ok(reformulated) => Ok(Reformulation {
                original_question: question.to_string(),
                reformulated_question: reformulated,
                window,
            }),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                warn!(error = %e, "context analysis failed; using the question as asked");
                Ok(passthrough(window))
            }
        }
    }

    async fn ask_llm(
        &self,
        question: &str,
        window: &[DialogueMessage],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let prompt = self.store.agent_prompt("context_analyzer")?;
        let config = prompt.call_config()?;

        let dialogue = window
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    DialogueRole::User => "user",
                    DialogueRole::Assistant => "assistant",
                };
                format!("{}: {}", speaker, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let user_prompt = format!(
            "Recent dialogue:\n{}\n\nFollow-up question:\n{}",
            dialogue, question
        );
        let completion = self
            .gateway
            .complete_prompt(&config, user_prompt, cancel)
            .await?;
        let parsed = extract_json(&completion.text)?;

        parsed["reformulated_question"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::invalid_output("analyzer produced no reformulated_question"))
    }
}

/// The last six messages, assistant content capped at 500 chars.
fn truncate_window(history: &[DialogueMessage]) -> Vec<DialogueMessage> {
    history
        .iter()
        .rev()
        .take(CONTEXT_WINDOW_MESSAGES)
        .rev()
        .map(|m| match m.role {
            DialogueRole::Assistant if m.content.chars().count() > ASSISTANT_SNIPPET_MAX_CHARS => {
                DialogueMessage {
                    role: m.role,
                    content: m.content.chars().take(ASSISTANT_SNIPPET_MAX_CHARS).collect(),
                }
            }
            _ => m.clone(),
        })
        .collect()
}

/// Serialize a window for the routing decision log.
pub fn window_to_json(window: &[DialogueMessage]) -> Value {
    serde_json::to_value(window).unwrap_or(Value::Array(Vec::new()))
}

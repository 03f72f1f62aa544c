//! Agent framework: shared base behavior for the five pipeline agents.
//!
//! Every agent follows the same shape on each invocation: load its prompt
//! row from the store (configuration is hot-editable), validate the
//! required input keys, render the user prompt, call the LLM gateway, parse
//! structured output, and return a JSON object that the orchestrator merges
//! into the pipeline state. All error classes (missing config, bad input,
//! provider faults, unparseable output) are fatal to the run; there are no
//! retries.

mod adversarial_checker;
mod publisher;
mod source_checker;
mod topic_finder;
mod writer;

pub use adversarial_checker::AdversarialChecker;
pub use publisher::Publisher;
pub use source_checker::SourceChecker;
pub use topic_finder::TopicFinder;
pub use writer::Writer;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::llm::{extract_json, CallConfig, Gateway};
use crate::progress::SessionEmitter;
use crate::store::{AgentPrompt, Store};
use crate::verify::SourceVerifier;

/// Aggregated pipeline state passed between stages.
pub type StageInputs = Map<String, Value>;

/// Shared services every agent executes against.
#[derive(Clone)]
pub struct AgentContext {
    pub store: Store,
    pub gateway: Arc<Gateway>,
    pub verifier: Arc<SourceVerifier>,
    pub embedder: Arc<dyn Embedder>,
    pub emitter: SessionEmitter,
    pub cancel: CancellationToken,
}

impl AgentContext {
    /// Load an agent's prompt row. Read on every invocation by contract;
    /// never cache the result across calls.
    pub fn load_prompt(&self, agent_name: &str) -> Result<AgentPrompt> {
        self.store.agent_prompt(agent_name)
    }

    /// One gateway call returning parsed structured output.
    pub async fn complete_json(&self, config: &CallConfig, user_prompt: String) -> Result<Value> {
        let completion = self
            .gateway
            .complete_prompt(config, user_prompt, &self.cancel)
            .await?;
        extract_json(&completion.text)
    }
}

/// One stage of the audit pipeline.
#[async_trait]
pub trait PipelineAgent: Send + Sync {
    /// Stable agent name; also the prompt-table key.
    fn name(&self) -> &'static str;

    /// Input keys this agent requires in the aggregated state.
    fn required_inputs(&self) -> &'static [&'static str];

    /// Run the stage. The returned object is merged into the pipeline
    /// state before the next stage starts.
    async fn execute(&self, ctx: &AgentContext, inputs: &StageInputs) -> Result<Value>;
}

/// Validate that every required key is present and non-null.
pub fn require_inputs(agent: &str, inputs: &StageInputs, keys: &[&str]) -> Result<()> {
    for key in keys {
        match inputs.get(*key) {
            Some(value) if !value.is_null() => {}
            _ => {
                return Err(Error::bad_input(format!(
                    "agent '{}' is missing required input '{}'",
                    agent, key
                )))
            }
        }
    }
    Ok(())
}

/// Fetch a required string input.
pub fn input_str<'a>(agent: &str, inputs: &'a StageInputs, key: &str) -> Result<&'a str> {
    inputs
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            Error::bad_input(format!(
                "agent '{}' requires string input '{}'",
                agent, key
            ))
        })
}

/// Count whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for agent and pipeline tests.

    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::llm::test_support::ScriptedClient;
    use crate::llm::{CompletionResponse, Provider};
    use crate::progress::ProgressBus;

    /// An agent context backed by in-memory services and a scripted LLM.
    pub fn scripted_context(responses: Vec<CompletionResponse>) -> AgentContext {
        let store = Store::in_memory().unwrap();
        store.install_default_prompts().unwrap();
        scripted_context_with_store(store, responses)
    }

    pub fn scripted_context_with_store(
        store: Store,
        responses: Vec<CompletionResponse>,
    ) -> AgentContext {
        let gateway = Arc::new(
            Gateway::new().with_client(Arc::new(ScriptedClient::new(Provider::Anthropic, responses))),
        );
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new());
        let verifier = Arc::new(SourceVerifier::new(
            store.clone(),
            gateway.clone(),
            embedder.clone(),
        ));
        let bus = Arc::new(ProgressBus::new());
        AgentContext {
            store,
            gateway,
            verifier,
            embedder,
            emitter: SessionEmitter::new(bus, "test-session"),
            cancel: CancellationToken::new(),
        }
    }

    /// Shorthand for a scripted text response carrying JSON.
    pub fn json(text: &str) -> CompletionResponse {
        ScriptedClient::text_response(text)
    }
}

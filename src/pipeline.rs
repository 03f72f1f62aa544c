//! Sequential audit pipeline orchestration.
//!
//! Runs the five agents in order. Each stage consumes the aggregated output
//! dictionary of the prior stages; its own output object is merged into
//! that dictionary before the next stage starts. Stage and pipeline events
//! stream over the progress bus in pipeline order. Cancellation is
//! cooperative and checked at stage boundaries; timeouts surface as a
//! failed pipeline, never a retry.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::{
    AdversarialChecker, AgentContext, PipelineAgent, Publisher, SourceChecker, StageInputs,
    TopicFinder, Writer,
};
use crate::error::{Error, Result};
use crate::progress::ProgressEvent;

/// Timeouts for pipeline execution.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Budget for one agent stage
    pub agent_timeout: Duration,
    /// Budget for the whole run
    pub pipeline_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            agent_timeout: Duration::from_secs(60),
            pipeline_timeout: Duration::from_secs(180),
        }
    }
}

/// Result of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The persisted claim card's id
    pub claim_card_id: Uuid,
    /// Serialized claim card, as published
    pub claim_card: Value,
    /// Final aggregated stage state
    pub state: StageInputs,
}

/// The sequential five-stage audit pipeline.
pub struct Pipeline {
    agents: Vec<Arc<dyn PipelineAgent>>,
    config: PipelineConfig,
}

impl Pipeline {
    /// The standard five stages in audit order.
    pub fn standard() -> Self {
        Self {
            agents: vec![
                Arc::new(TopicFinder),
                Arc::new(SourceChecker),
                Arc::new(AdversarialChecker),
                Arc::new(Writer),
                Arc::new(Publisher),
            ],
            config: PipelineConfig::default(),
        }
    }

    /// Custom stage list (used by tests and partial re-runs).
    pub fn with_agents(agents: Vec<Arc<dyn PipelineAgent>>) -> Self {
        Self {
            agents,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the pipeline for a question, streaming progress to the session.
    pub async fn run(&self, ctx: &AgentContext, question: &str) -> Result<PipelineOutcome> {
        let started = Instant::now();
        ctx.emitter.emit(ProgressEvent::pipeline_started(question));

        let outcome = match tokio::time::timeout(
            self.config.pipeline_timeout,
            self.run_stages(ctx, question, started),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(self.config.pipeline_timeout.as_millis() as u64)),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(outcome) => {
                info!(elapsed_ms, claim_card_id = %outcome.claim_card_id, "pipeline completed");
                ctx.emitter.emit(ProgressEvent::pipeline_completed(elapsed_ms));
                Ok(outcome)
            }
            Err(e) => {
                warn!(elapsed_ms, error = %e, "pipeline failed");
                ctx.emitter
                    .emit(ProgressEvent::pipeline_failed(e.to_string(), elapsed_ms));
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        ctx: &AgentContext,
        question: &str,
        _started: Instant,
    ) -> Result<PipelineOutcome> {
        let mut state = StageInputs::new();
        state.insert("question".to_string(), json!(question));

        for agent in &self.agents {
            // Cooperative abort at the stage boundary
            if ctx.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let name = agent.name();
            ctx.emitter.emit(ProgressEvent::agent_started(name));
            let stage_started = Instant::now();

            let result = match tokio::time::timeout(
                self.config.agent_timeout,
                agent.execute(ctx, &state),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(self.config.agent_timeout.as_millis() as u64)),
            };

            let stage_ms = stage_started.elapsed().as_millis() as u64;
            match result {
                Ok(output) => {
                    ctx.emitter
                        .emit(ProgressEvent::agent_completed(name, stage_ms, true));
                    merge_stage_output(&mut state, name, output)?;
                }
                Err(e) => {
                    ctx.emitter
                        .emit(ProgressEvent::agent_completed(name, stage_ms, false));
                    return Err(e);
                }
            }
        }

        let claim_card_id = state
            .get("claim_card_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| Error::Internal("pipeline finished without a claim card".to_string()))?;
        let claim_card = state.get("claim_card").cloned().unwrap_or(Value::Null);

        Ok(PipelineOutcome {
            claim_card_id,
            claim_card,
            state,
        })
    }
}

/// Merge one stage's output object into the aggregated state.
fn merge_stage_output(state: &mut StageInputs, agent: &str, output: Value) -> Result<()> {
    let Value::Object(fields) = output else {
        return Err(Error::invalid_output(format!(
            "agent '{}' returned a non-object output",
            agent
        )));
    };
    for (key, value) in fields {
        state.insert(key, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::{json as scripted_json, scripted_context};
    use crate::llm::CompletionResponse;
    use crate::progress::{ProgressBus, ProgressEventType, SessionEmitter};
    use crate::store::Verdict;
    use async_trait::async_trait;

    /// Scripted responses for a full happy-path run.
    fn happy_path_responses() -> Vec<CompletionResponse> {
        vec![
            // topic_finder
            scripted_json(
                r#"{"claim_text": "Luke used Mark as a source", "claimant": null,
                    "claim_type": "literary dependence", "claim_type_category": "TEXTUAL",
                    "category_tags": ["synoptic problem"]}"#,
            ),
            // source_checker candidates
            scripted_json(
                r#"{"sources": [
                    {"title": "The Four Gospels", "author": "B. H. Streeter", "domain": "book",
                     "source_type": "SCHOLARLY_PEER_REVIEWED",
                     "usage_context": "establishes Markan priority"},
                    {"title": "Marcan Usage", "author": "C. H. Turner", "domain": "book",
                     "source_type": "SCHOLARLY_PEER_REVIEWED",
                     "usage_context": "documents verbal agreement"},
                    {"title": "The Synoptic Problem", "author": "M. Goodacre", "domain": "book",
                     "source_type": "SCHOLARLY_PEER_REVIEWED",
                     "usage_context": "surveys the debate"}
                ]}"#,
            ),
            // three fallback generations (no catalogs configured in tests)
            scripted_json(r#"{"citation": "Streeter, The Four Gospels", "quote_text": "", "usage_context": "establishes Markan priority"}"#),
            scripted_json(r#"{"citation": "Turner, Marcan Usage", "quote_text": "", "usage_context": "documents verbal agreement"}"#),
            scripted_json(r#"{"citation": "Goodacre, The Synoptic Problem", "quote_text": "", "usage_context": "surveys the debate"}"#),
            // adversarial_checker
            scripted_json(
                r#"{"verdict": "TRUE", "reasoning": "Dependency is the consensus reading.",
                    "evidence_concerns": []}"#,
            ),
            // writer
            scripted_json(
                r#"{"short_answer": "This claim is true. Luke reproduces most of Mark.",
                    "deep_answer": "Extended discussion.",
                    "why_persists": ["Harmonization instincts"],
                    "confidence_level": "HIGH",
                    "confidence_explanation": "Broad consensus."}"#,
            ),
            // publisher audit
            scripted_json(
                r#"{"topic_finder": {"summary": "normalized", "limitations": "", "change_verdict_if": ""},
                    "source_checker": {"summary": "sourced", "limitations": "", "change_verdict_if": ""},
                    "adversarial_checker": {"summary": "re-verified", "limitations": "", "change_verdict_if": ""},
                    "writer": {"summary": "wrote", "limitations": "", "change_verdict_if": ""}}"#,
            ),
        ]
    }

    #[tokio::test]
    async fn test_full_run_persists_card_and_streams_events() {
        let ctx = scripted_context(happy_path_responses());
        let bus = Arc::new(ProgressBus::new());
        let mut rx = bus.subscribe("pipe");
        let ctx = AgentContext {
            emitter: SessionEmitter::new(bus, "pipe"),
            ..ctx
        };

        let outcome = Pipeline::standard()
            .run(&ctx, "Did Luke copy Mark?")
            .await
            .unwrap();

        let card = ctx.store.claim_card_by_id(&outcome.claim_card_id).unwrap();
        assert_eq!(card.claim_text, "Luke used Mark as a source");
        assert_eq!(card.verdict, Verdict::True);
        assert_eq!(card.sources.len(), 3);

        // Drain events and assert pipeline ordering
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(types[0], ProgressEventType::PipelineStarted);
        assert_eq!(*types.last().unwrap(), ProgressEventType::PipelineCompleted);

        let agent_starts: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == ProgressEventType::AgentStarted)
            .map(|e| e.content.clone())
            .collect();
        assert_eq!(
            agent_starts,
            vec![
                "topic_finder",
                "source_checker",
                "adversarial_checker",
                "writer",
                "publisher"
            ]
        );
        assert!(types.contains(&ProgressEventType::ClaimCardReady));
    }

    #[tokio::test]
    async fn test_stage_failure_emits_pipeline_failed_and_inserts_nothing() {
        // Topic finder returns prose instead of JSON
        let ctx = scripted_context(vec![scripted_json("I cannot help with that.")]);
        let bus = Arc::new(ProgressBus::new());
        let mut rx = bus.subscribe("pipe");
        let ctx = AgentContext {
            emitter: SessionEmitter::new(bus, "pipe"),
            ..ctx
        };

        let err = Pipeline::standard().run(&ctx, "q").await.unwrap_err();
        assert!(matches!(err, Error::InvalidOutput(_)));
        assert_eq!(ctx.store.count_claim_cards().unwrap(), 0);

        let mut saw_failed = false;
        let mut saw_unsuccessful_stage = false;
        while let Ok(event) = rx.try_recv() {
            if event.event_type == ProgressEventType::PipelineFailed {
                saw_failed = true;
            }
            if event.event_type == ProgressEventType::AgentCompleted
                && event.get_metadata("success") == Some(&serde_json::Value::Bool(false))
            {
                saw_unsuccessful_stage = true;
            }
        }
        assert!(saw_failed);
        assert!(saw_unsuccessful_stage);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_at_stage_boundary() {
        let ctx = scripted_context(happy_path_responses());
        ctx.cancel.cancel();

        let err = Pipeline::standard().run(&ctx, "q").await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(ctx.store.count_claim_cards().unwrap(), 0);
    }

    struct SlowAgent;

    #[async_trait]
    impl PipelineAgent for SlowAgent {
        fn name(&self) -> &'static str {
            "slow"
        }
        fn required_inputs(&self) -> &'static [&'static str] {
            &[]
        }
        async fn execute(&self, _: &AgentContext, _: &StageInputs) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!({}))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_timeout_fails_pipeline() {
        let ctx = scripted_context(vec![]);
        let pipeline = Pipeline::with_agents(vec![Arc::new(SlowAgent)]).with_config(PipelineConfig {
            agent_timeout: Duration::from_millis(50),
            pipeline_timeout: Duration::from_secs(10),
        });

        let err = pipeline.run(&ctx, "q").await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_stage_outputs_merge_forward() {
        struct Emit(&'static str, &'static str);

        #[async_trait]
        impl PipelineAgent for Emit {
            fn name(&self) -> &'static str {
                "emit"
            }
            fn required_inputs(&self) -> &'static [&'static str] {
                &[]
            }
            async fn execute(&self, _: &AgentContext, inputs: &StageInputs) -> Result<Value> {
                // Later stages see earlier outputs
                if self.0 == "second" {
                    assert_eq!(inputs["first"], "set");
                }
                let mut output = serde_json::Map::new();
                output.insert(self.0.to_string(), json!(self.1));
                if self.0 == "second" {
                    output.insert("claim_card_id".to_string(), json!(Uuid::new_v4().to_string()));
                }
                Ok(Value::Object(output))
            }
        }

        let ctx = scripted_context(vec![]);
        let pipeline =
            Pipeline::with_agents(vec![Arc::new(Emit("first", "set")), Arc::new(Emit("second", "x"))]);
        let outcome = pipeline.run(&ctx, "q").await.unwrap();
        assert_eq!(outcome.state["first"], "set");
    }
}

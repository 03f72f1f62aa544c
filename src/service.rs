//! Ask-path façade: the operation behind `POST /chat/ask`.
//!
//! Wires the context analyzer, router, and pipeline together for one
//! question. Transport plumbing (HTTP framing, websockets, auth) lives
//! outside this crate; this module owns the semantics: validate, analyze,
//! route, and either answer from cache or start a streaming pipeline run.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::agent::AgentContext;
use crate::context::{ContextAnalyzer, DialogueMessage};
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::llm::Gateway;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::progress::{ProgressBus, ProgressEvent, SessionEmitter};
use crate::router::{RouteOutcome, Router, RouterConfig};
use crate::store::{ClaimCard, RoutingMode, Store};
use crate::verify::SourceVerifier;

/// Questions longer than this are rejected before any model sees them.
pub const MAX_QUESTION_CHARS: usize = 2_000;

/// History longer than this is malformed input, not context.
pub const MAX_HISTORY_MESSAGES: usize = 100;

/// A chat-surface ask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub conversation_history: Vec<DialogueMessage>,
}

/// Mode-specific response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AskPayload {
    ExactMatch {
        claim_card: Box<ClaimCard>,
    },
    Contextual {
        synthesized_response: String,
        source_cards: Vec<ClaimCard>,
    },
    Generating {
        pipeline_status: String,
        websocket_session_id: String,
        contextualized_question: String,
    },
}

/// Response to an ask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub mode: RoutingMode,
    #[serde(flatten)]
    pub payload: AskPayload,
    pub routing_decision_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub websocket_session_id: Option<String>,
}

/// The chat surface's application service.
pub struct ChatService {
    store: Store,
    gateway: Arc<Gateway>,
    embedder: Arc<dyn Embedder>,
    verifier: Arc<SourceVerifier>,
    bus: Arc<ProgressBus>,
    router_config: RouterConfig,
    pipeline_config: PipelineConfig,
}

impl ChatService {
    pub fn new(
        store: Store,
        gateway: Arc<Gateway>,
        embedder: Arc<dyn Embedder>,
        verifier: Arc<SourceVerifier>,
        bus: Arc<ProgressBus>,
    ) -> Self {
        Self {
            store,
            gateway,
            embedder,
            verifier,
            bus,
            router_config: RouterConfig::default(),
            pipeline_config: PipelineConfig::default(),
        }
    }

    pub fn with_router_config(mut self, config: RouterConfig) -> Self {
        self.router_config = config;
        self
    }

    pub fn with_pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline_config = config;
        self
    }

    /// The progress bus serving this service's sessions.
    pub fn bus(&self) -> &Arc<ProgressBus> {
        &self.bus
    }

    /// Handle one ask with a generated session id.
    pub async fn ask(&self, request: AskRequest, cancel: &CancellationToken) -> Result<AskResponse> {
        let session_id = Uuid::new_v4().to_string();
        self.ask_with_session(request, &session_id, cancel).await
    }

    /// Handle one ask on a known session id (lets the streaming side
    /// subscribe before routing starts).
    pub async fn ask_with_session(
        &self,
        request: AskRequest,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AskResponse> {
        validate_request(&request)?;
        let emitter = SessionEmitter::new(self.bus.clone(), session_id);

        let analyzer = ContextAnalyzer::new(self.store.clone(), self.gateway.clone());
        let reformulation = analyzer
            .reformulate(
                &request.question,
                &request.conversation_history,
                &emitter,
                cancel,
            )
            .await?;

        let router = Router::new(
            self.store.clone(),
            self.gateway.clone(),
            self.embedder.clone(),
        )
        .with_config(self.router_config.clone());
        let routed = router.route(&reformulation, &emitter, cancel).await?;

        let response = match routed.outcome {
            RouteOutcome::ExactMatch { claim_card } => AskResponse {
                mode: RoutingMode::ExactMatch,
                payload: AskPayload::ExactMatch { claim_card },
                routing_decision_id: routed.decision_id,
                websocket_session_id: None,
            },
            RouteOutcome::Contextual {
                synthesized_response,
                source_cards,
            } => AskResponse {
                mode: RoutingMode::Contextual,
                payload: AskPayload::Contextual {
                    synthesized_response,
                    source_cards,
                },
                routing_decision_id: routed.decision_id,
                websocket_session_id: None,
            },
            RouteOutcome::NovelClaim { .. } => {
                let contextualized = reformulation.reformulated_question.clone();
                self.spawn_pipeline(session_id, &contextualized, cancel);
                AskResponse {
                    mode: RoutingMode::NovelClaim,
                    payload: AskPayload::Generating {
                        pipeline_status: "started".to_string(),
                        websocket_session_id: session_id.to_string(),
                        contextualized_question: contextualized,
                    },
                    routing_decision_id: routed.decision_id,
                    websocket_session_id: Some(session_id.to_string()),
                }
            }
        };

        info!(mode = %response.mode, session_id, "ask handled");
        Ok(response)
    }

    /// Start the audit pipeline as a detached task streaming over the bus.
    fn spawn_pipeline(&self, session_id: &str, question: &str, cancel: &CancellationToken) {
        let ctx = AgentContext {
            store: self.store.clone(),
            gateway: self.gateway.clone(),
            verifier: self.verifier.clone(),
            embedder: self.embedder.clone(),
            emitter: SessionEmitter::new(self.bus.clone(), session_id),
            cancel: cancel.child_token(),
        };
        let config = self.pipeline_config.clone();
        let question = question.to_string();

        tokio::spawn(async move {
            // Failures surface on the bus as PIPELINE_FAILED; nothing to
            // do with the error here beyond that.
            let _ = Pipeline::standard()
                .with_config(config)
                .run(&ctx, &question)
                .await;
        });
    }

    /// Emit keepalive heartbeats for a session until cancelled.
    pub fn start_keepalive(
        &self,
        session_id: &str,
        period: Duration,
        cancel: &CancellationToken,
    ) {
        let emitter = SessionEmitter::new(self.bus.clone(), session_id);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        emitter.emit(ProgressEvent::keepalive());
                    }
                    _ = cancel.cancelled() => return,
                }
            }
        });
    }
}

fn validate_request(request: &AskRequest) -> Result<()> {
    if request.question.trim().is_empty() {
        return Err(Error::bad_input("question must not be empty"));
    }
    if request.question.chars().count() > MAX_QUESTION_CHARS {
        return Err(Error::bad_input(format!(
            "question exceeds {} characters",
            MAX_QUESTION_CHARS
        )));
    }
    if request.conversation_history.len() > MAX_HISTORY_MESSAGES {
        return Err(Error::bad_input("conversation history too long"));
    }
    Ok(())
}

//! Intelligent router: decides among the three response modes for a
//! reformulated question.
//!
//! The router drives a tool-augmented LLM call over the claim store. Its
//! system prompt is loaded from the store on every invocation, and the
//! search tool is guaranteed to run: if the model concludes without
//! searching, the router performs the search itself before deciding, so
//! every decision carries a candidate summary.
//!
//! Mode selection after the tool loop terminates:
//! - `EXACT_MATCH`: best candidate similarity >= 0.92 and the model judged
//!   it the same claim; the cached card is returned.
//! - `CONTEXTUAL`: best similarity in [0.80, 0.92), or the model fetched
//!   card details and composed a synthesis; the synthesized answer plus
//!   source cards is returned (top three candidates attached when the
//!   model cites none).
//! - `NOVEL_CLAIM`: best similarity < 0.80, no candidates, or the model
//!   reserved a new claim; the audit pipeline is started by the caller.
//!
//! Any LLM-layer failure degrades to `NOVEL_CLAIM` with a
//! `router_fallback` event rather than surfacing an error.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::{window_to_json, Reformulation};
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::llm::{extract_json, ChatMessage, Gateway, ToolCall, ToolHandler, ToolSpec};
use crate::progress::{ProgressEvent, SessionEmitter};
use crate::store::{
    CandidateSummary, ClaimCard, RouterDecision, RoutingMode, Store,
};

/// Router thresholds and limits.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Similarity at or above which a candidate can be an exact match
    pub exact_match_threshold: f32,
    /// Similarity at or above which candidates support a synthesis
    pub contextual_threshold: f32,
    /// Floor below which search hits are not even shown to the model
    pub search_floor: f32,
    /// Candidates returned per search tool call
    pub search_limit: usize,
    /// Source cards attached to a synthesis when the model cites none
    pub default_source_cards: usize,
    /// Whole-routing budget
    pub timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            exact_match_threshold: 0.92,
            contextual_threshold: 0.80,
            search_floor: 0.30,
            search_limit: 5,
            default_source_cards: 3,
            timeout: Duration::from_secs(15),
        }
    }
}

/// The mode-specific payload of a routing decision.
#[derive(Debug, Clone)]
pub enum RouteOutcome {
    /// A cached card answers the question as-is
    ExactMatch { claim_card: Box<ClaimCard> },
    /// A synthesis over cached cards answers the question
    Contextual {
        synthesized_response: String,
        source_cards: Vec<ClaimCard>,
    },
    /// The full audit pipeline must run
    NovelClaim { claim_text: String },
}

impl RouteOutcome {
    pub fn mode(&self) -> RoutingMode {
        match self {
            Self::ExactMatch { .. } => RoutingMode::ExactMatch,
            Self::Contextual { .. } => RoutingMode::Contextual,
            Self::NovelClaim { .. } => RoutingMode::NovelClaim,
        }
    }
}

/// A routing decision plus its persisted log entry id.
#[derive(Debug, Clone)]
pub struct RouteResult {
    pub outcome: RouteOutcome,
    pub decision_id: Uuid,
    /// True when the router degraded to NOVEL_CLAIM after a failure
    pub fallback: bool,
}

/// Mutable state accumulated across tool resolutions.
#[derive(Default)]
struct ToolState {
    candidates: Vec<CandidateSummary>,
    searched: bool,
    detail_fetches: Vec<Uuid>,
    reservation: Option<String>,
}

impl ToolState {
    fn record_candidates(&mut self, fresh: &[CandidateSummary]) {
        self.searched = true;
        for candidate in fresh {
            match self
                .candidates
                .iter_mut()
                .find(|c| c.claim_id == candidate.claim_id)
            {
                Some(existing) => {
                    existing.similarity = existing.similarity.max(candidate.similarity)
                }
                None => self.candidates.push(candidate.clone()),
            }
        }
    }

    fn best(&self) -> Option<&CandidateSummary> {
        self.candidates.iter().max_by(|a, b| {
            a.similarity
                .partial_cmp(&b.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

struct RouterTools {
    store: Store,
    embedder: Arc<dyn Embedder>,
    config: RouterConfig,
    state: Arc<Mutex<ToolState>>,
}

impl RouterTools {
    async fn search(&self, query: &str, limit: usize) -> Result<Value> {
        let embedding = self.embedder.embed(query).await?;
        let hits =
            self.store
                .search_by_embedding(&embedding, self.config.search_floor, limit)?;

        let summaries: Vec<CandidateSummary> = hits
            .iter()
            .map(|(card, similarity)| CandidateSummary {
                claim_id: card.id,
                claim_text: card.claim_text.clone(),
                similarity: *similarity,
                verdict: card.verdict,
                claim_type_category: card.claim_type_category,
            })
            .collect();
        self.state
            .lock()
            .expect("router state lock poisoned")
            .record_candidates(&summaries);

        let payload: Vec<Value> = hits
            .iter()
            .map(|(card, similarity)| {
                json!({
                    "id": card.id.to_string(),
                    "claim_text": card.claim_text,
                    "short_answer": card.short_answer,
                    "similarity": similarity,
                    "verdict": card.verdict.as_str(),
                    "claim_type_category": card.claim_type_category.map(|c| c.as_str()),
                })
            })
            .collect();
        Ok(Value::Array(payload))
    }

    fn claim_details(&self, claim_id: &str) -> Value {
        let Ok(id) = Uuid::parse_str(claim_id) else {
            return json!({"error": "not_found"});
        };
        match self.store.claim_card_by_id(&id) {
            Ok(card) => {
                self.state
                    .lock()
                    .expect("router state lock poisoned")
                    .detail_fetches
                    .push(id);
                json!({
                    "id": card.id.to_string(),
                    "claim_text": card.claim_text,
                    "claim_type": card.claim_type,
                    "claim_type_category": card.claim_type_category.map(|c| c.as_str()),
                    "verdict": card.verdict.as_str(),
                    "short_answer": card.short_answer,
                    "deep_answer": card.deep_answer,
                    "confidence": card.confidence.as_str(),
                    "sources": card
                        .sources
                        .iter()
                        .map(|s| s.citation.clone())
                        .collect::<Vec<_>>(),
                })
            }
            Err(_) => json!({"error": "not_found"}),
        }
    }

    fn reserve(&self, claim_text: &str) -> Value {
        let token = Uuid::new_v4().to_string();
        self.state
            .lock()
            .expect("router state lock poisoned")
            .reservation = Some(claim_text.to_string());
        json!({"reservation_token": token})
    }
}

#[async_trait::async_trait]
impl ToolHandler for RouterTools {
    async fn handle(&self, call: &ToolCall) -> Result<Value> {
        match call.name.as_str() {
            "search_existing_claims" => {
                let query = call.input["query"].as_str().unwrap_or_default();
                let limit = call.input["limit"]
                    .as_u64()
                    .map(|l| l as usize)
                    .unwrap_or(self.config.search_limit);
                self.search(query, limit.min(self.config.search_limit)).await
            }
            "get_claim_details" => {
                Ok(self.claim_details(call.input["claim_id"].as_str().unwrap_or_default()))
            }
            "generate_new_claim" => {
                Ok(self.reserve(call.input["claim_text"].as_str().unwrap_or_default()))
            }
            other => Err(Error::tool(other, "unknown tool")),
        }
    }
}

fn router_tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "search_existing_claims",
            "Semantic search over audited claims. Returns candidates with id, claim_text, \
             short_answer, similarity, verdict, and claim_type_category.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "default": 5}
                },
                "required": ["query"]
            }),
        ),
        ToolSpec::new(
            "get_claim_details",
            "Fetch the full audited card for one claim id.",
            json!({
                "type": "object",
                "properties": {"claim_id": {"type": "string"}},
                "required": ["claim_id"]
            }),
        ),
        ToolSpec::new(
            "generate_new_claim",
            "Reserve a full audit for a claim not covered by the store. Pass the affirmative \
             claim text.",
            json!({
                "type": "object",
                "properties": {"claim_text": {"type": "string"}},
                "required": ["claim_text"]
            }),
        ),
    ]
}

/// Tool-using router over the claim store.
pub struct Router {
    store: Store,
    gateway: Arc<Gateway>,
    embedder: Arc<dyn Embedder>,
    config: RouterConfig,
}

impl Router {
    pub fn new(store: Store, gateway: Arc<Gateway>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            gateway,
            embedder,
            config: RouterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Route a reformulated question, persisting the decision either way.
    pub async fn route(
        &self,
        reformulation: &Reformulation,
        emitter: &SessionEmitter,
        cancel: &CancellationToken,
    ) -> Result<RouteResult> {
        let started = Instant::now();
        emitter.emit(ProgressEvent::routing_started(
            &reformulation.reformulated_question,
        ));

        let state = Arc::new(Mutex::new(ToolState::default()));
        let tools = RouterTools {
            store: self.store.clone(),
            embedder: self.embedder.clone(),
            config: self.config.clone(),
            state: state.clone(),
        };

        let loop_result = self
            .drive_tool_loop(reformulation, &tools, cancel)
            .await;

        // The search is mandatory: if the model concluded (or failed)
        // without it, run it directly so the decision carries candidates.
        if !state.lock().expect("router state lock poisoned").searched {
            if let Err(e) = tools
                .search(
                    &reformulation.reformulated_question,
                    self.config.search_limit,
                )
                .await
            {
                warn!(error = %e, "mandatory candidate search failed");
            }
        }

        let (outcome, reasoning, fallback) = match loop_result {
            Ok(final_text) => {
                let parsed = extract_json(&final_text).unwrap_or(Value::Null);
                let reasoning = parsed["reasoning"]
                    .as_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| final_text.clone());
                match self.decide(reformulation, &state, &parsed) {
                    Decision::Resolved(outcome) => (outcome, reasoning, false),
                    Decision::FallForward(reason) => {
                        emitter.emit(ProgressEvent::router_fallback(&reason));
                        let outcome = self.novel_outcome(reformulation, &state);
                        (outcome, format!("{} ({})", reasoning, reason), true)
                    }
                }
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) if e.is_llm_fault() || matches!(e, Error::ConfigMissing { .. }) => {
                warn!(error = %e, "router degraded to NOVEL_CLAIM");
                emitter.emit(ProgressEvent::router_fallback(e.to_string()));
                let outcome = self.novel_outcome(reformulation, &state);
                (outcome, format!("router fallback: {}", e), true)
            }
            Err(e) => return Err(e),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let decision_id = self.persist_decision(
            reformulation,
            &state,
            &outcome,
            reasoning,
            elapsed_ms,
        )?;

        info!(mode = %outcome.mode(), elapsed_ms, "routing completed");
        emitter.emit(ProgressEvent::routing_completed(
            outcome.mode().as_str(),
            elapsed_ms,
        ));

        Ok(RouteResult {
            outcome,
            decision_id,
            fallback,
        })
    }

    async fn drive_tool_loop(
        &self,
        reformulation: &Reformulation,
        tools: &RouterTools,
        cancel: &CancellationToken,
    ) -> Result<String> {
        // Loaded on every invocation: a stale or skipped config load is the
        // classic way this router silently loses its tools.
        let prompt = self.store.agent_prompt("router")?;
        let config = prompt.call_config()?;

        let user_prompt = format!(
            "Question to route:\n{}",
            reformulation.reformulated_question
        );

        let transcript = tokio::time::timeout(
            self.config.timeout,
            self.gateway.complete_with_tools(
                &config,
                vec![ChatMessage::user(user_prompt)],
                router_tool_specs(),
                tools,
                cancel,
            ),
        )
        .await
        .map_err(|_| Error::timeout(self.config.timeout.as_millis() as u64))??;

        debug!(
            rounds = transcript.rounds,
            invocations = transcript.invocations.len(),
            "router tool loop finished"
        );
        Ok(transcript.final_text)
    }

    fn decide(
        &self,
        reformulation: &Reformulation,
        state: &Arc<Mutex<ToolState>>,
        parsed: &Value,
    ) -> Decision {
        let state = state.lock().expect("router state lock poisoned");
        let llm_mode = parsed["mode"].as_str().and_then(RoutingMode::parse);
        let best_similarity = state.best().map(|c| c.similarity).unwrap_or(0.0);

        // An explicit reservation always wins
        if state.reservation.is_some() {
            return Decision::Resolved(RouteOutcome::NovelClaim {
                claim_text: state
                    .reservation
                    .clone()
                    .unwrap_or_else(|| reformulation.reformulated_question.clone()),
            });
        }

        // Exact match needs the threshold AND the model's same-claim
        // judgment (an unparseable final message defers to the threshold)
        let same_claim_judged = matches!(llm_mode, Some(RoutingMode::ExactMatch) | None);
        if best_similarity >= self.config.exact_match_threshold && same_claim_judged {
            let claim_id = parsed["claim_id"]
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .or_else(|| state.best().map(|c| c.claim_id));
            let Some(claim_id) = claim_id else {
                return Decision::FallForward("exact match without a candidate".to_string());
            };
            return match self.store.claim_card_by_id(&claim_id) {
                Ok(card) => Decision::Resolved(RouteOutcome::ExactMatch {
                    claim_card: Box::new(card),
                }),
                // The cited card vanished (e.g. a racing reset): fall
                // forward to a fresh pipeline run
                Err(_) => Decision::FallForward(format!("cached card {} not found", claim_id)),
            };
        }

        let synthesized = parsed["synthesized_response"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let contextual_band = best_similarity >= self.config.contextual_threshold
            && best_similarity < self.config.exact_match_threshold;
        let composed = !state.detail_fetches.is_empty() && synthesized.is_some();

        if contextual_band || composed {
            let mut referenced: Vec<Uuid> = parsed["referenced_claim_ids"]
                .as_array()
                .map(|ids| {
                    ids.iter()
                        .filter_map(|v| v.as_str())
                        .filter_map(|s| Uuid::parse_str(s).ok())
                        .collect()
                })
                .unwrap_or_default();
            // The model composed a synthesis without citing cards: attach
            // the top candidates as source cards
            if referenced.is_empty() {
                referenced = state
                    .candidates
                    .iter()
                    .map(|c| c.claim_id)
                    .take(self.config.default_source_cards)
                    .collect();
            }

            let mut source_cards = Vec::new();
            for id in &referenced {
                if let Ok(card) = self.store.claim_card_by_id(id) {
                    source_cards.push(card);
                }
            }
            if source_cards.is_empty() {
                return Decision::FallForward("no resolvable source cards".to_string());
            }

            let synthesized_response = synthesized
                .map(|s| s.to_string())
                .unwrap_or_else(|| default_synthesis(&source_cards));
            return Decision::Resolved(RouteOutcome::Contextual {
                synthesized_response,
                source_cards,
            });
        }

        Decision::Resolved(RouteOutcome::NovelClaim {
            claim_text: parsed["claim_text"]
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| reformulation.reformulated_question.clone()),
        })
    }

    fn novel_outcome(
        &self,
        reformulation: &Reformulation,
        state: &Arc<Mutex<ToolState>>,
    ) -> RouteOutcome {
        let state = state.lock().expect("router state lock poisoned");
        RouteOutcome::NovelClaim {
            claim_text: state
                .reservation
                .clone()
                .unwrap_or_else(|| reformulation.reformulated_question.clone()),
        }
    }

    fn persist_decision(
        &self,
        reformulation: &Reformulation,
        state: &Arc<Mutex<ToolState>>,
        outcome: &RouteOutcome,
        reasoning: String,
        elapsed_ms: u64,
    ) -> Result<Uuid> {
        let state = state.lock().expect("router state lock poisoned");

        let referenced_claim_ids = match outcome {
            RouteOutcome::ExactMatch { claim_card } => vec![claim_card.id],
            RouteOutcome::Contextual { source_cards, .. } => {
                source_cards.iter().map(|c| c.id).collect()
            }
            RouteOutcome::NovelClaim { .. } => Vec::new(),
        };

        let mut decision = RouterDecision::new(
            &reformulation.original_question,
            &reformulation.reformulated_question,
            outcome.mode(),
        );
        decision.recent_history = window_to_json(&reformulation.window);
        decision.referenced_claim_ids = referenced_claim_ids;
        decision.search_candidates = state.candidates.clone();
        decision.reasoning_excerpt = reasoning;
        decision.elapsed_ms = elapsed_ms;

        self.store.insert_router_decision(&decision)?;
        Ok(decision.id)
    }
}

enum Decision {
    Resolved(RouteOutcome),
    /// Mode 1/2 resolution failed; degrade to a fresh pipeline run
    FallForward(String),
}

/// Plain synthesis used when the model composed none but candidates exist.
fn default_synthesis(cards: &[ClaimCard]) -> String {
    cards
        .iter()
        .map(|c| format!("{} - {}", c.claim_text, c.short_answer))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::json as scripted_json;
    use crate::embedding::HashEmbedder;
    use crate::llm::test_support::ScriptedClient;
    use crate::llm::{CompletionResponse, Provider};
    use crate::progress::{ProgressBus, ProgressEventType};
    use crate::store::{ClaimCategory, ConfidenceLevel, ContentType, Source, Verdict};
    use serde_json::json;

    fn insert_card(store: &Store, claim_text: &str, category: ClaimCategory) -> ClaimCard {
        let embedding =
            futures::executor::block_on(HashEmbedder::new().embed(claim_text)).unwrap();
        let card = ClaimCard::new(claim_text, Verdict::True, ConfidenceLevel::High)
            .with_short_answer("This claim is true.")
            .with_category(category)
            .with_embedding(embedding)
            .with_source(
                Source::new("A citation", "establishes the claim")
                    .with_quote("quote", ContentType::ExactQuote),
            );
        store.insert_claim_card(&card).unwrap();
        card
    }

    struct Fixture {
        store: Store,
        router: Router,
        emitter: SessionEmitter,
        bus: Arc<ProgressBus>,
    }

    fn fixture(responses: Vec<CompletionResponse>) -> Fixture {
        let store = Store::in_memory().unwrap();
        store.install_default_prompts().unwrap();
        let gateway = Arc::new(
            Gateway::new().with_client(Arc::new(ScriptedClient::new(Provider::Anthropic, responses))),
        );
        let bus = Arc::new(ProgressBus::new());
        let emitter = SessionEmitter::new(bus.clone(), "router-test");
        let router = Router::new(store.clone(), gateway, Arc::new(HashEmbedder::new()));
        Fixture {
            store,
            router,
            emitter,
            bus,
        }
    }

    fn standalone(question: &str) -> Reformulation {
        Reformulation {
            original_question: question.to_string(),
            reformulated_question: question.to_string(),
            window: Vec::new(),
        }
    }

    /// Scripted transcript: one search call, then a final JSON message.
    fn search_then_final(query: &str, final_json: &str) -> Vec<CompletionResponse> {
        vec![
            ScriptedClient::tool_response("t1", "search_existing_claims", json!({"query": query})),
            scripted_json(final_json),
        ]
    }

    #[tokio::test]
    async fn test_exact_match_returns_cached_card() {
        let fx = fixture(search_then_final(
            "Luke used Mark as a source",
            r#"{"mode": "EXACT_MATCH", "reasoning": "same claim"}"#,
        ));
        let card = insert_card(&fx.store, "Luke used Mark as a source", ClaimCategory::Textual);

        let result = fx
            .router
            .route(
                &standalone("Luke used Mark as a source"),
                &fx.emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        match &result.outcome {
            RouteOutcome::ExactMatch { claim_card } => assert_eq!(claim_card.id, card.id),
            other => panic!("expected exact match, got {:?}", other.mode()),
        }
        assert!(!result.fallback);

        let decisions = fx.store.list_router_decisions(1).unwrap();
        assert_eq!(decisions[0].mode, RoutingMode::ExactMatch);
        assert_eq!(decisions[0].referenced_claim_ids, vec![card.id]);
        assert!(!decisions[0].search_candidates.is_empty());
        assert!(decisions[0].search_candidates[0].similarity >= 0.92);
    }

    #[tokio::test]
    async fn test_details_plus_synthesis_is_contextual() {
        // The store must exist before the transcript can cite card ids
        let store = Store::in_memory().unwrap();
        store.install_default_prompts().unwrap();
        let flood = insert_card(
            &store,
            "the geological record contradicts a recent global flood covering the earth",
            ClaimCategory::Historical,
        );
        let ark = insert_card(
            &store,
            "the ark could not hold representatives of all animal kinds",
            ClaimCategory::Historical,
        );

        let responses = vec![
            ScriptedClient::tool_response(
                "t1",
                "search_existing_claims",
                json!({"query": "flood geology ark"}),
            ),
            ScriptedClient::tool_response(
                "t2",
                "get_claim_details",
                json!({"claim_id": flood.id.to_string()}),
            ),
            scripted_json(&format!(
                r#"{{"mode": "CONTEXTUAL",
                    "synthesized_response": "Geology is the stronger line of evidence.",
                    "referenced_claim_ids": ["{}", "{}"],
                    "reasoning": "two related cards"}}"#,
                flood.id, ark.id
            )),
        ];
        let gateway = Arc::new(
            Gateway::new().with_client(Arc::new(ScriptedClient::new(Provider::Anthropic, responses))),
        );
        let bus = Arc::new(ProgressBus::new());
        let emitter = SessionEmitter::new(bus, "router-test");
        let router = Router::new(store.clone(), gateway, Arc::new(HashEmbedder::new()));

        let result = router
            .route(
                &standalone(
                    "Which is stronger evidence against the flood account - geology or ark size?",
                ),
                &emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        match &result.outcome {
            RouteOutcome::Contextual {
                synthesized_response,
                source_cards,
            } => {
                assert_eq!(synthesized_response, "Geology is the stronger line of evidence.");
                let ids: Vec<Uuid> = source_cards.iter().map(|c| c.id).collect();
                assert!(ids.contains(&flood.id));
                assert!(ids.contains(&ark.id));
            }
            other => panic!("expected contextual, got {:?}", other.mode()),
        }

        let decision = &store.list_router_decisions(1).unwrap()[0];
        assert_eq!(decision.mode, RoutingMode::Contextual);
        assert_eq!(decision.referenced_claim_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_store_routes_novel() {
        let fx = fixture(search_then_final(
            "could god have hidden the evidence",
            r#"{"mode": "NOVEL_CLAIM", "claim_text": "God hid the evidence of the flood",
                "reasoning": "nothing cached"}"#,
        ));

        let result = fx
            .router
            .route(
                &standalone("Could God have hidden the evidence?"),
                &fx.emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        match &result.outcome {
            RouteOutcome::NovelClaim { claim_text } => {
                assert_eq!(claim_text, "God hid the evidence of the flood")
            }
            other => panic!("expected novel, got {:?}", other.mode()),
        }

        // Candidates are logged even when the search returned nothing
        let decision = &fx.store.list_router_decisions(1).unwrap()[0];
        assert_eq!(decision.mode, RoutingMode::NovelClaim);
        assert!(decision.search_candidates.is_empty());
    }

    #[tokio::test]
    async fn test_reservation_forces_novel() {
        let fx = fixture(vec![
            ScriptedClient::tool_response(
                "t1",
                "search_existing_claims",
                json!({"query": "hidden evidence"}),
            ),
            ScriptedClient::tool_response(
                "t2",
                "generate_new_claim",
                json!({"claim_text": "God hid the evidence of the flood"}),
            ),
            scripted_json(r#"{"mode": "NOVEL_CLAIM", "reasoning": "reserved"}"#),
        ]);
        insert_card(&fx.store, "unrelated cached claim", ClaimCategory::Theological);

        let result = fx
            .router
            .route(
                &standalone("Could God have hidden the evidence?"),
                &fx.emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(
            result.outcome,
            RouteOutcome::NovelClaim { ref claim_text } if claim_text == "God hid the evidence of the flood"
        ));
    }

    #[tokio::test]
    async fn test_llm_failure_degrades_with_fallback_event() {
        // No scripted responses: the router LLM call fails outright
        let fx = fixture(vec![]);
        let mut rx = fx.bus.subscribe("router-test");

        let result = fx
            .router
            .route(
                &standalone("Did Luke copy Mark?"),
                &fx.emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(result.fallback);
        assert!(matches!(result.outcome, RouteOutcome::NovelClaim { .. }));

        let mut saw_fallback = false;
        while let Ok(event) = rx.try_recv() {
            if event.event_type == ProgressEventType::RouterFallback {
                saw_fallback = true;
            }
        }
        assert!(saw_fallback);

        // The decision is persisted with candidates even on fallback
        let decision = &fx.store.list_router_decisions(1).unwrap()[0];
        assert_eq!(decision.mode, RoutingMode::NovelClaim);
    }

    #[tokio::test]
    async fn test_model_that_skips_search_still_logs_candidates() {
        // The model concludes immediately without any tool call
        let fx = fixture(vec![scripted_json(
            r#"{"mode": "NOVEL_CLAIM", "claim_text": "a brand new claim", "reasoning": "skipping tools"}"#,
        )]);
        insert_card(&fx.store, "some cached claim text", ClaimCategory::Historical);

        fx.router
            .route(&standalone("some cached claim text"), &fx.emitter, &CancellationToken::new())
            .await
            .unwrap();

        // The mandatory search ran anyway: candidates present in the log
        let decision = &fx.store.list_router_decisions(1).unwrap()[0];
        assert!(!decision.search_candidates.is_empty());
    }

    #[tokio::test]
    async fn test_vanished_exact_card_falls_forward() {
        let fx = fixture(search_then_final(
            "Luke used Mark as a source",
            // Cites a card id that does not exist
            &format!(
                r#"{{"mode": "EXACT_MATCH", "claim_id": "{}", "reasoning": "cached"}}"#,
                Uuid::new_v4()
            ),
        ));

        let result = fx
            .router
            .route(
                &standalone("Luke used Mark as a source"),
                &fx.emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        // No candidate reached 0.92 (store empty), cited card missing:
        // the router falls forward to a fresh pipeline run
        assert!(matches!(result.outcome, RouteOutcome::NovelClaim { .. }));
    }

    #[tokio::test]
    async fn test_decision_mode_threshold_determinism() {
        // P4: with no details fetch and a compliant model, the similarity
        // thresholds alone determine the mode.
        let fx = fixture(search_then_final(
            "the gospels were written anonymously",
            r#"{"mode": "EXACT_MATCH", "reasoning": "same claim"}"#,
        ));
        insert_card(
            &fx.store,
            "the gospels were written anonymously",
            ClaimCategory::Textual,
        );

        let result = fx
            .router
            .route(
                &standalone("the gospels were written anonymously"),
                &fx.emitter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.outcome.mode(), RoutingMode::ExactMatch);
    }
}

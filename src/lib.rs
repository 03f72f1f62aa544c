//! # veracity-core
//!
//! A claim-audit orchestration library: factual claims run through a
//! sequential five-agent verification pipeline, audited results are cached
//! in a semantic-search-indexed store, and an intelligent router reuses
//! them - novel questions trigger the full audit, near-duplicates return
//! the cached card, and topically-related questions get a synthesized
//! answer grounded in multiple cached audits.
//!
//! ## Core Components
//!
//! - **Store**: claim cards, sources, tags, and the verified-source library
//!   over SQLite with vector similarity search
//! - **Llm**: provider-agnostic gateway with a bounded tool-calling loop
//! - **Verify**: six-tier external source verification
//! - **Agent / Pipeline**: the five audit agents and their orchestrator
//! - **Router**: three-mode decision over cached claims
//! - **Scheduler**: cron-like topic → article generation with review gating
//! - **Progress**: per-session event bus for streaming execution
//!
//! ## Example
//!
//! ```rust,ignore
//! use veracity_core::{AskRequest, ChatService};
//!
//! let response = service
//!     .ask(AskRequest {
//!         question: "Did Luke copy Mark?".to_string(),
//!         conversation_history: Vec::new(),
//!     }, &cancel)
//!     .await?;
//!
//! match response.mode {
//!     RoutingMode::ExactMatch => println!("served from cache"),
//!     RoutingMode::Contextual => println!("synthesized from cached audits"),
//!     RoutingMode::NovelClaim => println!("pipeline started, stream the session"),
//! }
//! ```

pub mod agent;
pub mod context;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod progress;
pub mod router;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod verify;

// Re-exports for convenience
pub use agent::{
    AdversarialChecker, AgentContext, PipelineAgent, Publisher, SourceChecker, StageInputs,
    TopicFinder, Writer,
};
pub use context::{
    ContextAnalyzer, DialogueMessage, DialogueRole, Reformulation, ASSISTANT_SNIPPET_MAX_CHARS,
    CONTEXT_WINDOW_MESSAGES,
};
pub use embedding::{
    cosine_similarity, l2_normalize, Embedder, EmbedderConfig, HashEmbedder, OpenAIEmbedder,
    EMBEDDING_DIM,
};
pub use error::{Error, Result};
pub use llm::{
    extract_json, AnthropicClient, CallConfig, ChatMessage, ChatRole, ClientConfig,
    CompletionRequest, CompletionResponse, ContentBlock, Gateway, LlmClient, OpenAIClient,
    Provider, StopReason, TextCompletion, TokenUsage, ToolCall, ToolHandler, ToolInvocation,
    ToolSpec, ToolTranscript, MAX_TOOL_ROUNDS,
};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutcome};
pub use progress::{ProgressBus, ProgressEvent, ProgressEventType, SessionEmitter};
pub use router::{RouteOutcome, RouteResult, Router, RouterConfig};
pub use scheduler::{
    AutoSuggest, AutoSuggestConfig, ComposedArticle, Composer, Decomposer, Scheduler,
    SchedulerConfig, TopicRunReport, AUTOSUGGEST_DEDUP_THRESHOLD, MAX_ARTICLE_WORDS,
    MAX_COMPONENT_CLAIMS, MIN_ARTICLE_WORDS, MIN_COMPONENT_CLAIMS, SCHEDULER_DEDUP_THRESHOLD,
};
pub use service::{
    AskPayload, AskRequest, AskResponse, ChatService, MAX_HISTORY_MESSAGES, MAX_QUESTION_CHARS,
};
pub use store::{
    normalized_source_key, AgentPrompt, AuditListFilter, BlogPost, CandidateSummary, ClaimCard,
    ClaimCategory, ConfidenceLevel, ContentType, ReviewStatus, RouterDecision, RoutingMode,
    Source, SourceType, Store, TopicQueueEntry, TopicStatus, Verdict, VerificationMethod,
    VerificationStatus, VerifiedSource,
};
pub use verify::{
    AncientCorpus, ArxivClient, BookCatalog, CcelClient, GoogleBooksClient, HttpUrlChecker,
    PerseusClient, PubMedClient, ReverificationOutcome, SemanticScholarClient, SourceDomain,
    SourceRequest, SourceVerifier, TavilyClient, UrlChecker, VerifiedRecord, VerifierConfig,
    WebSearch,
};

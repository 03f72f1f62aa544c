//! Domain types persisted by the claim store.
//!
//! Enums are stored as their uppercase canonical names (the same strings the
//! serde representations use), which keeps the database, the wire format,
//! and the programmatic constants identical.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Display impl body that defers to `as_str`.
macro_rules! fmt_as_str {
    () => {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.as_str())
        }
    };
}

/// Verdict on an audited claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    True,
    Misleading,
    False,
    Unfalsifiable,
    DependsOnDefinitions,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::True => "TRUE",
            Self::Misleading => "MISLEADING",
            Self::False => "FALSE",
            Self::Unfalsifiable => "UNFALSIFIABLE",
            Self::DependsOnDefinitions => "DEPENDS_ON_DEFINITIONS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "TRUE" => Some(Self::True),
            "MISLEADING" => Some(Self::Misleading),
            "FALSE" => Some(Self::False),
            "UNFALSIFIABLE" => Some(Self::Unfalsifiable),
            "DEPENDS_ON_DEFINITIONS" => Some(Self::DependsOnDefinitions),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verdict {
    fmt_as_str!();
}

/// Routing-oriented claim classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimCategory {
    Historical,
    Epistemology,
    Interpretation,
    Theological,
    Textual,
}

impl ClaimCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Historical => "HISTORICAL",
            Self::Epistemology => "EPISTEMOLOGY",
            Self::Interpretation => "INTERPRETATION",
            Self::Theological => "THEOLOGICAL",
            Self::Textual => "TEXTUAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "HISTORICAL" => Some(Self::Historical),
            "EPISTEMOLOGY" => Some(Self::Epistemology),
            "INTERPRETATION" => Some(Self::Interpretation),
            "THEOLOGICAL" => Some(Self::Theological),
            "TEXTUAL" => Some(Self::Textual),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClaimCategory {
    fmt_as_str!();
}

/// Confidence in the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "HIGH" => Some(Self::High),
            "MEDIUM" => Some(Self::Medium),
            "LOW" => Some(Self::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fmt_as_str!();
}

/// Kind of external source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    PrimaryHistorical,
    ScholarlyPeerReviewed,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryHistorical => "PRIMARY_HISTORICAL",
            Self::ScholarlyPeerReviewed => "SCHOLARLY_PEER_REVIEWED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PRIMARY_HISTORICAL" => Some(Self::PrimaryHistorical),
            "SCHOLARLY_PEER_REVIEWED" => Some(Self::ScholarlyPeerReviewed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fmt_as_str!();
}

/// How a source was verified (which tier produced it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationMethod {
    LibraryReuse,
    GoogleBooks,
    SemanticScholar,
    Arxiv,
    Pubmed,
    Ccel,
    Perseus,
    Tavily,
    LlmUnverified,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LibraryReuse => "LIBRARY_REUSE",
            Self::GoogleBooks => "GOOGLE_BOOKS",
            Self::SemanticScholar => "SEMANTIC_SCHOLAR",
            Self::Arxiv => "ARXIV",
            Self::Pubmed => "PUBMED",
            Self::Ccel => "CCEL",
            Self::Perseus => "PERSEUS",
            Self::Tavily => "TAVILY",
            Self::LlmUnverified => "LLM_UNVERIFIED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "LIBRARY_REUSE" => Some(Self::LibraryReuse),
            "GOOGLE_BOOKS" => Some(Self::GoogleBooks),
            "SEMANTIC_SCHOLAR" => Some(Self::SemanticScholar),
            "ARXIV" => Some(Self::Arxiv),
            "PUBMED" => Some(Self::Pubmed),
            "CCEL" => Some(Self::Ccel),
            "PERSEUS" => Some(Self::Perseus),
            "TAVILY" => Some(Self::Tavily),
            "LLM_UNVERIFIED" => Some(Self::LlmUnverified),
            _ => None,
        }
    }
}

impl std::fmt::Display for VerificationMethod {
    fmt_as_str!();
}

/// How confident the verification walk is in a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Verified,
    PartiallyVerified,
    Unverified,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "VERIFIED",
            Self::PartiallyVerified => "PARTIALLY_VERIFIED",
            Self::Unverified => "UNVERIFIED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "VERIFIED" => Some(Self::Verified),
            "PARTIALLY_VERIFIED" => Some(Self::PartiallyVerified),
            "UNVERIFIED" => Some(Self::Unverified),
            _ => None,
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fmt_as_str!();
}

/// Provenance of a source's quoted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    ExactQuote,
    VerifiedParaphrase,
    UnverifiedContent,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactQuote => "EXACT_QUOTE",
            Self::VerifiedParaphrase => "VERIFIED_PARAPHRASE",
            Self::UnverifiedContent => "UNVERIFIED_CONTENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "EXACT_QUOTE" => Some(Self::ExactQuote),
            "VERIFIED_PARAPHRASE" => Some(Self::VerifiedParaphrase),
            "UNVERIFIED_CONTENT" => Some(Self::UnverifiedContent),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fmt_as_str!();
}

/// Router response mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingMode {
    ExactMatch,
    Contextual,
    NovelClaim,
}

impl RoutingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactMatch => "EXACT_MATCH",
            Self::Contextual => "CONTEXTUAL",
            Self::NovelClaim => "NOVEL_CLAIM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "EXACT_MATCH" => Some(Self::ExactMatch),
            "CONTEXTUAL" => Some(Self::Contextual),
            "NOVEL_CLAIM" => Some(Self::NovelClaim),
            _ => None,
        }
    }
}

impl std::fmt::Display for RoutingMode {
    fmt_as_str!();
}

/// Topic queue lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopicStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TopicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "QUEUED" => Some(Self::Queued),
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TopicStatus {
    fmt_as_str!();
}

/// Reviewer decision state for a generated article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    PendingReview,
    Approved,
    Rejected,
    NeedsRevision,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingReview => "PENDING_REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::NeedsRevision => "NEEDS_REVISION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENDING_REVIEW" => Some(Self::PendingReview),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            "NEEDS_REVISION" => Some(Self::NeedsRevision),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fmt_as_str!();
}

/// A source backing one claim card. Owned by the card, deleted with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    /// Human-readable citation
    pub citation: String,
    /// Verified URL; empty when no URL could be verified, never fabricated
    pub url: String,
    /// Quote or paraphrase used in the audit; may be empty
    pub quote_text: String,
    /// Short "used to establish X" note
    pub usage_context: String,
    pub source_type: SourceType,
    pub verification_method: VerificationMethod,
    pub verification_status: VerificationStatus,
    pub content_type: ContentType,
    pub url_verified: bool,
}

impl Source {
    pub fn new(citation: impl Into<String>, usage_context: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            citation: citation.into(),
            url: String::new(),
            quote_text: String::new(),
            usage_context: usage_context.into(),
            source_type: SourceType::ScholarlyPeerReviewed,
            verification_method: VerificationMethod::LlmUnverified,
            verification_status: VerificationStatus::Unverified,
            content_type: ContentType::UnverifiedContent,
            url_verified: false,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>, verified: bool) -> Self {
        self.url = url.into();
        self.url_verified = verified;
        self
    }

    pub fn with_quote(mut self, quote: impl Into<String>, content_type: ContentType) -> Self {
        self.quote_text = quote.into();
        self.content_type = content_type;
        self
    }

    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    pub fn with_verification(
        mut self,
        method: VerificationMethod,
        status: VerificationStatus,
    ) -> Self {
        self.verification_method = method;
        self.verification_status = status;
        self
    }
}

/// The atomic audit record: one claim, one verdict, its evidence and trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimCard {
    pub id: Uuid,
    /// Normalized affirmative statement under audit
    pub claim_text: String,
    /// Who asserts the claim, if known
    pub claimant: Option<String>,
    /// Free-form technical tag
    pub claim_type: String,
    pub claim_type_category: Option<ClaimCategory>,
    pub verdict: Verdict,
    /// Self-contained summary, at most 150 words
    pub short_answer: String,
    pub deep_answer: String,
    pub why_persists: Vec<String>,
    pub confidence: ConfidenceLevel,
    pub confidence_explanation: String,
    /// Per-agent audit trail keyed by agent name
    pub agent_audit: Value,
    pub visible_in_audits: bool,
    /// L2-normalized embedding of `claim_text`; regenerated whenever the
    /// text is mutated
    pub embedding: Vec<f32>,
    pub sources: Vec<Source>,
    pub apologetics_tags: Vec<String>,
    pub category_tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClaimCard {
    pub fn new(
        claim_text: impl Into<String>,
        verdict: Verdict,
        confidence: ConfidenceLevel,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            claim_text: claim_text.into(),
            claimant: None,
            claim_type: String::new(),
            claim_type_category: None,
            verdict,
            short_answer: String::new(),
            deep_answer: String::new(),
            why_persists: Vec::new(),
            confidence,
            confidence_explanation: String::new(),
            agent_audit: Value::Object(Default::default()),
            visible_in_audits: true,
            embedding: Vec::new(),
            sources: Vec::new(),
            apologetics_tags: Vec::new(),
            category_tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_short_answer(mut self, short_answer: impl Into<String>) -> Self {
        self.short_answer = short_answer.into();
        self
    }

    pub fn with_deep_answer(mut self, deep_answer: impl Into<String>) -> Self {
        self.deep_answer = deep_answer.into();
        self
    }

    pub fn with_category(mut self, category: ClaimCategory) -> Self {
        self.claim_type_category = Some(category);
        self
    }

    pub fn with_claim_type(mut self, claim_type: impl Into<String>) -> Self {
        self.claim_type = claim_type.into();
        self
    }

    pub fn with_claimant(mut self, claimant: impl Into<String>) -> Self {
        self.claimant = Some(claimant.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_why_persists(mut self, why_persists: Vec<String>) -> Self {
        self.why_persists = why_persists;
        self
    }

    pub fn with_confidence_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.confidence_explanation = explanation.into();
        self
    }

    pub fn with_agent_audit(mut self, audit: Value) -> Self {
        self.agent_audit = audit;
        self
    }

    pub fn with_tags(mut self, apologetics: Vec<String>, category: Vec<String>) -> Self {
        self.apologetics_tags = apologetics;
        self.category_tags = category;
        self
    }
}

/// A library entry: a previously verified external source's metadata.
///
/// Independent lifetime from claim cards; never holds claim-specific quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedSource {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub publisher: Option<String>,
    pub published: Option<String>,
    /// External identifier (ISBN, DOI, corpus id) when the catalog had one
    pub identifier: Option<String>,
    /// Dedup key over normalized title+author
    pub normalized_key: String,
    pub url: String,
    pub source_type: SourceType,
    pub verification_method: VerificationMethod,
    /// Embedding of the source's topic description
    pub topic_embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl VerifiedSource {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        let title = title.into();
        let author = author.into();
        Self {
            normalized_key: normalized_source_key(&title, &author),
            id: Uuid::new_v4(),
            title,
            author,
            publisher: None,
            published: None,
            identifier: None,
            url: String::new(),
            source_type: SourceType::ScholarlyPeerReviewed,
            verification_method: VerificationMethod::GoogleBooks,
            topic_embedding: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn with_published(mut self, published: impl Into<String>) -> Self {
        self.published = Some(published.into());
        self
    }

    pub fn with_method(mut self, method: VerificationMethod) -> Self {
        self.verification_method = method;
        self
    }

    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    pub fn with_topic_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.topic_embedding = embedding;
        self
    }
}

/// Stable dedup key for a library entry.
pub fn normalized_source_key(title: &str, author: &str) -> String {
    let normalized = format!(
        "{}|{}",
        title.trim().to_lowercase(),
        author.trim().to_lowercase()
    );
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{:x}", digest)
}

/// One summarized candidate surfaced during routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub claim_id: Uuid,
    pub claim_text: String,
    pub similarity: f32,
    pub verdict: Verdict,
    pub claim_type_category: Option<ClaimCategory>,
}

/// Append-only record of a routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterDecision {
    pub id: Uuid,
    pub original_question: String,
    pub reformulated_question: String,
    /// Snapshot of the recent dialogue the analyzer saw
    pub recent_history: Value,
    pub mode: RoutingMode,
    pub referenced_claim_ids: Vec<Uuid>,
    /// Candidate summaries from the mandatory search; `[]` when none
    pub search_candidates: Vec<CandidateSummary>,
    /// At most 500 chars of the router's reasoning
    pub reasoning_excerpt: String,
    pub elapsed_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl RouterDecision {
    pub fn new(
        original_question: impl Into<String>,
        reformulated_question: impl Into<String>,
        mode: RoutingMode,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_question: original_question.into(),
            reformulated_question: reformulated_question.into(),
            recent_history: Value::Array(Vec::new()),
            mode,
            referenced_claim_ids: Vec::new(),
            search_candidates: Vec::new(),
            reasoning_excerpt: String::new(),
            elapsed_ms: 0,
            created_at: Utc::now(),
        }
    }
}

/// A topic waiting for (or produced by) the article scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicQueueEntry {
    pub id: Uuid,
    pub topic_text: String,
    /// 1 (lowest) to 10 (highest)
    pub priority: u8,
    pub status: TopicStatus,
    pub review_status: ReviewStatus,
    /// Where the topic came from (admin, auto_suggest, ...)
    pub source: String,
    pub claim_card_ids: Vec<Uuid>,
    pub blog_post_id: Option<Uuid>,
    pub error_message: Option<String>,
    /// Reviewer feedback attached on requeue
    pub admin_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A generated article, one-to-one with its topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: Uuid,
    pub topic_id: Option<Uuid>,
    pub title: String,
    pub article_body: String,
    /// Ordered component claims referenced in the body
    pub claim_card_ids: Vec<Uuid>,
    /// Null until a reviewer approves
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Hot-editable per-agent LLM configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPrompt {
    pub agent_name: String,
    pub provider: String,
    pub model: String,
    pub system_prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub updated_at: DateTime<Utc>,
}

impl AgentPrompt {
    pub fn new(agent_name: impl Into<String>, provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            provider: provider.into(),
            model: model.into(),
            system_prompt: String::new(),
            temperature: 0.2,
            max_tokens: 4096,
            updated_at: Utc::now(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
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

    /// Resolve this row into a gateway call configuration.
    pub fn call_config(&self) -> crate::error::Result<crate::llm::CallConfig> {
        let provider = crate::llm::Provider::parse(&self.provider).ok_or_else(|| {
            crate::error::Error::config_missing(format!(
                "{} (unknown provider '{}')",
                self.agent_name, self.provider
            ))
        })?;
        Ok(crate::llm::CallConfig::new(provider, self.model.clone())
            .with_system(self.system_prompt.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens))
    }
}

/// Filter for the public audits listing.
#[derive(Debug, Clone, Default)]
pub struct AuditListFilter {
    pub category: Option<ClaimCategory>,
    pub verdict: Option<Verdict>,
    /// Substring match over claim_text
    pub query: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl AuditListFilter {
    pub fn new() -> Self {
        Self {
            limit: 50,
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: ClaimCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = Some(verdict);
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

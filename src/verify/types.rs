//! Types for the tiered source verification walk.

use serde::{Deserialize, Serialize};

use crate::store::{
    ContentType, Source, SourceType, VerificationMethod, VerificationStatus,
};

/// Which catalog family a desired source belongs to. Selects the entry tier
/// of the verification walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDomain {
    Book,
    Paper,
    Ancient,
    Web,
}

impl SourceDomain {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "book" => Some(Self::Book),
            "paper" => Some(Self::Paper),
            "ancient" => Some(Self::Ancient),
            "web" => Some(Self::Web),
            _ => None,
        }
    }
}

/// A desired source, as enumerated by the source checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRequest {
    pub title: String,
    pub author: String,
    pub identifier: Option<String>,
    pub domain: SourceDomain,
    pub source_type: SourceType,
    /// The claim this source should support
    pub claim_text: String,
    /// What the source is used to establish
    pub usage_context: String,
}

impl SourceRequest {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        domain: SourceDomain,
        claim_text: impl Into<String>,
        usage_context: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            identifier: None,
            domain,
            source_type: SourceType::ScholarlyPeerReviewed,
            claim_text: claim_text.into(),
            usage_context: usage_context.into(),
        }
    }

    /// Keywords used for library search and snippet lookup.
    pub fn keywords(&self) -> String {
        format!("{} {} {}", self.title, self.author, self.claim_text)
    }
}

/// The outcome of one tier: a source record with verification metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedRecord {
    pub citation: String,
    pub title: String,
    pub author: String,
    /// Empty unless a URL was actually verified or catalog-provided; tiers
    /// never synthesize URLs
    pub url: String,
    pub quote_text: String,
    pub usage_context: String,
    pub source_type: SourceType,
    pub verification_method: VerificationMethod,
    pub verification_status: VerificationStatus,
    pub content_type: ContentType,
    pub url_verified: bool,
    pub identifier: Option<String>,
}

impl VerifiedRecord {
    /// Convert into a claim-card source.
    pub fn into_source(self) -> Source {
        Source::new(self.citation, self.usage_context)
            .with_url(self.url.clone(), self.url_verified)
            .with_quote(self.quote_text, self.content_type)
            .with_source_type(self.source_type)
            .with_verification(self.verification_method, self.verification_status)
    }
}

/// Outcome of re-verifying an already-attached source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReverificationOutcome {
    /// Whether the quote appears (or closely paraphrases) the re-fetched
    /// content; None when the tier returned no content to compare
    pub quote_ok: Option<bool>,
    /// Whether the URL was reachable and matched the citation; None when
    /// the source carries no URL
    pub url_ok: Option<bool>,
    /// Human-readable discrepancy notes for the audit trail
    pub notes: Vec<String>,
}

impl ReverificationOutcome {
    /// Whether any check flagged a discrepancy.
    pub fn has_discrepancy(&self) -> bool {
        self.quote_ok == Some(false) || self.url_ok == Some(false)
    }
}

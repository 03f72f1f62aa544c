//! Ancient text corpus providers (Tier 3), tried in a fixed sequence:
//! CCEL (patristic), then Perseus (classical).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::store::VerificationMethod;

/// A corpus hit for an ancient work lookup.
#[derive(Debug, Clone, Default)]
pub struct AncientHit {
    pub work: String,
    pub author: String,
    /// Corpus canonical URL; empty when the corpus returned none
    pub url: String,
    /// Passage text matching the lookup, when available
    pub passage: Option<String>,
}

/// One ancient-text corpus in the Tier-3 sequence.
#[async_trait]
pub trait AncientCorpus: Send + Sync {
    /// Which verification method a hit from this corpus carries.
    fn method(&self) -> VerificationMethod;

    async fn lookup(&self, work: &str, author: &str, keywords: &str) -> Result<Option<AncientHit>>;
}

fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(20))
        .build()
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct CorpusSearchResponse {
    #[serde(default)]
    results: Vec<CorpusSearchHit>,
}

#[derive(Debug, Deserialize)]
struct CorpusSearchHit {
    title: Option<String>,
    author: Option<String>,
    url: Option<String>,
    #[serde(alias = "excerpt", alias = "text")]
    snippet: Option<String>,
}

/// Christian Classics Ethereal Library client.
pub struct CcelClient {
    http: Client,
    base_url: String,
}

impl CcelClient {
    const DEFAULT_BASE_URL: &'static str = "https://ccel.org/api";

    pub fn new() -> Self {
        Self {
            http: http_client(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for CcelClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AncientCorpus for CcelClient {
    fn method(&self) -> VerificationMethod {
        VerificationMethod::Ccel
    }

    async fn lookup(&self, work: &str, author: &str, keywords: &str) -> Result<Option<AncientHit>> {
        let query = format!("{} {} {}", author, work, keywords);
        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query.as_str()), ("limit", "3")])
            .send()
            .await
            .map_err(|e| Error::provider("ccel", e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::provider("ccel", format!("status {}", response.status())));
        }

        let parsed: CorpusSearchResponse = response
            .json()
            .await
            .map_err(|e| Error::provider("ccel", e.to_string()))?;

        Ok(parsed.results.into_iter().next().map(|hit| AncientHit {
            work: hit.title.unwrap_or_else(|| work.to_string()),
            author: hit.author.unwrap_or_else(|| author.to_string()),
            url: hit.url.unwrap_or_default(),
            passage: hit.snippet,
        }))
    }
}

/// Perseus Digital Library client.
pub struct PerseusClient {
    http: Client,
    base_url: String,
}

impl PerseusClient {
    const DEFAULT_BASE_URL: &'static str = "https://scaife.perseus.org/api";

    pub fn new() -> Self {
        Self {
            http: http_client(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for PerseusClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AncientCorpus for PerseusClient {
    fn method(&self) -> VerificationMethod {
        VerificationMethod::Perseus
    }

    async fn lookup(&self, work: &str, author: &str, keywords: &str) -> Result<Option<AncientHit>> {
        let query = format!("{} {} {}", author, work, keywords);
        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query.as_str()), ("limit", "3")])
            .send()
            .await
            .map_err(|e| Error::provider("perseus", e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::provider(
                "perseus",
                format!("status {}", response.status()),
            ));
        }

        let parsed: CorpusSearchResponse = response
            .json()
            .await
            .map_err(|e| Error::provider("perseus", e.to_string()))?;

        Ok(parsed.results.into_iter().next().map(|hit| AncientHit {
            work: hit.title.unwrap_or_else(|| work.to_string()),
            author: hit.author.unwrap_or_else(|| author.to_string()),
            url: hit.url.unwrap_or_default(),
            passage: hit.snippet,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_response_parsing() {
        let body = r#"{
            "results": [{
                "title": "Annals",
                "author": "Tacitus",
                "url": "https://scaife.perseus.org/reader/urn:cts:latinLit:phi1351.phi005",
                "excerpt": "Christus, from whom the name had its origin, suffered the extreme penalty"
            }]
        }"#;
        let parsed: CorpusSearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert!(parsed.results[0].snippet.as_deref().unwrap().contains("Christus"));
    }

    #[test]
    fn test_method_tags() {
        assert_eq!(CcelClient::new().method(), VerificationMethod::Ccel);
        assert_eq!(PerseusClient::new().method(), VerificationMethod::Perseus);
    }
}

//! Academic paper catalog providers (Tier 2), tried in a fixed sequence:
//! Semantic Scholar, then arXiv, then PubMed.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::store::VerificationMethod;

/// A catalog hit for a paper search.
#[derive(Debug, Clone, Default)]
pub struct PaperHit {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<String>,
    /// Catalog canonical URL; empty when the catalog returned none
    pub url: String,
    /// Abstract or summary text when accessible
    pub abstract_text: Option<String>,
    /// DOI, arXiv id, or PMID
    pub identifier: Option<String>,
}

/// One academic catalog in the Tier-2 sequence.
#[async_trait]
pub trait PaperCatalog: Send + Sync {
    /// Which verification method a hit from this catalog carries.
    fn method(&self) -> VerificationMethod;

    async fn search(&self, query: &str) -> Result<Option<PaperHit>>;
}

fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(20))
        .build()
        .unwrap_or_default()
}

// ==================== Semantic Scholar ====================

pub struct SemanticScholarClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct S2Response {
    #[serde(default)]
    data: Vec<S2Paper>,
}

#[derive(Debug, Deserialize)]
struct S2Paper {
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    url: Option<String>,
    year: Option<i64>,
    #[serde(rename = "externalIds")]
    external_ids: Option<S2ExternalIds>,
    #[serde(default)]
    authors: Vec<S2Author>,
}

#[derive(Debug, Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    name: Option<String>,
}

impl SemanticScholarClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.semanticscholar.org/graph/v1";

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

impl Default for SemanticScholarClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaperCatalog for SemanticScholarClient {
    fn method(&self) -> VerificationMethod {
        VerificationMethod::SemanticScholar
    }

    async fn search(&self, query: &str) -> Result<Option<PaperHit>> {
        let response = self
            .http
            .get(format!("{}/paper/search", self.base_url))
            .query(&[
                ("query", query),
                ("limit", "3"),
                ("fields", "title,abstract,url,year,externalIds,authors"),
            ])
            .send()
            .await
            .map_err(|e| Error::provider("semantic_scholar", e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::provider(
                "semantic_scholar",
                format!("status {}", response.status()),
            ));
        }

        let parsed: S2Response = response
            .json()
            .await
            .map_err(|e| Error::provider("semantic_scholar", e.to_string()))?;

        Ok(parsed.data.into_iter().next().map(|paper| PaperHit {
            title: paper.title.unwrap_or_default(),
            authors: paper
                .authors
                .into_iter()
                .filter_map(|a| a.name)
                .collect(),
            year: paper.year.map(|y| y.to_string()),
            url: paper.url.unwrap_or_default(),
            abstract_text: paper.abstract_text,
            identifier: paper.external_ids.and_then(|ids| ids.doi),
        }))
    }
}

// ==================== arXiv ====================

pub struct ArxivClient {
    http: Client,
    base_url: String,
}

impl ArxivClient {
    const DEFAULT_BASE_URL: &'static str = "https://export.arxiv.org/api";

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

impl Default for ArxivClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal extraction of one tag's text from an Atom feed entry.
fn atom_tag(entry: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = entry.find(&open)? + open.len();
    let end = entry[start..].find(&close)? + start;
    let text = entry[start..end]
        .trim()
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    Some(text)
}

#[async_trait]
impl PaperCatalog for ArxivClient {
    fn method(&self) -> VerificationMethod {
        VerificationMethod::Arxiv
    }

    async fn search(&self, query: &str) -> Result<Option<PaperHit>> {
        let response = self
            .http
            .get(format!("{}/query", self.base_url))
            .query(&[
                ("search_query", format!("all:{}", query).as_str()),
                ("max_results", "3"),
            ])
            .send()
            .await
            .map_err(|e| Error::provider("arxiv", e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::provider("arxiv", format!("status {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::provider("arxiv", e.to_string()))?;

        // The feed is Atom XML; take the first <entry> block
        let Some(entry_start) = body.find("<entry>") else {
            return Ok(None);
        };
        let entry = match body[entry_start..].find("</entry>") {
            Some(end) => &body[entry_start..entry_start + end],
            None => &body[entry_start..],
        };

        let url = atom_tag(entry, "id").unwrap_or_default();
        Ok(Some(PaperHit {
            title: atom_tag(entry, "title").unwrap_or_default(),
            authors: Vec::new(),
            year: atom_tag(entry, "published").map(|p| p.chars().take(4).collect()),
            identifier: url.rsplit('/').next().map(|s| s.to_string()),
            abstract_text: atom_tag(entry, "summary"),
            url,
        }))
    }
}

// ==================== PubMed ====================

pub struct PubMedClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ESummaryResponse {
    result: serde_json::Value,
}

impl PubMedClient {
    const DEFAULT_BASE_URL: &'static str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

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

impl Default for PubMedClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaperCatalog for PubMedClient {
    fn method(&self) -> VerificationMethod {
        VerificationMethod::Pubmed
    }

    async fn search(&self, query: &str) -> Result<Option<PaperHit>> {
        let search: ESearchResponse = self
            .http
            .get(format!("{}/esearch.fcgi", self.base_url))
            .query(&[("db", "pubmed"), ("term", query), ("retmode", "json"), ("retmax", "1")])
            .send()
            .await
            .map_err(|e| Error::provider("pubmed", e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::provider("pubmed", e.to_string()))?;

        let Some(pmid) = search.esearchresult.idlist.into_iter().next() else {
            return Ok(None);
        };

        let summary: ESummaryResponse = self
            .http
            .get(format!("{}/esummary.fcgi", self.base_url))
            .query(&[("db", "pubmed"), ("id", pmid.as_str()), ("retmode", "json")])
            .send()
            .await
            .map_err(|e| Error::provider("pubmed", e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::provider("pubmed", e.to_string()))?;

        let doc = &summary.result[&pmid];
        let authors = doc["authors"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|v| v["name"].as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(PaperHit {
            title: doc["title"].as_str().unwrap_or_default().to_string(),
            authors,
            year: doc["pubdate"]
                .as_str()
                .map(|d| d.chars().take(4).collect()),
            url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid),
            abstract_text: None,
            identifier: Some(pmid),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s2_response_parsing() {
        let body = r#"{
            "data": [{
                "title": "Dating the Synoptic Gospels",
                "abstract": "We examine the dependency structure...",
                "url": "https://www.semanticscholar.org/paper/abc",
                "year": 2019,
                "externalIds": {"DOI": "10.1000/example"},
                "authors": [{"name": "A. Scholar"}]
            }]
        }"#;
        let parsed: S2Response = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(
            parsed.data[0].external_ids.as_ref().unwrap().doi.as_deref(),
            Some("10.1000/example")
        );
    }

    #[test]
    fn test_atom_tag_extraction() {
        let entry = "<entry><title>Bayesian dating of \n  manuscripts</title>\
                     <summary>We propose &amp; evaluate...</summary>\
                     <id>http://arxiv.org/abs/1234.5678</id></entry>";
        assert_eq!(
            atom_tag(entry, "title").as_deref(),
            Some("Bayesian dating of \n  manuscripts")
        );
        assert_eq!(
            atom_tag(entry, "summary").as_deref(),
            Some("We propose & evaluate...")
        );
        assert_eq!(atom_tag(entry, "missing"), None);
    }

    #[test]
    fn test_esearch_parsing() {
        let body = r#"{"esearchresult": {"idlist": ["12345"]}}"#;
        let parsed: ESearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.esearchresult.idlist, vec!["12345"]);
    }

    #[test]
    fn test_method_tags() {
        assert_eq!(
            SemanticScholarClient::new().method(),
            VerificationMethod::SemanticScholar
        );
        assert_eq!(ArxivClient::new().method(), VerificationMethod::Arxiv);
        assert_eq!(PubMedClient::new().method(), VerificationMethod::Pubmed);
    }
}

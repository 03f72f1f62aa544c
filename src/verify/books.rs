//! Book catalog provider (Tier 1).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};

/// A catalog hit for a book search.
#[derive(Debug, Clone, Default)]
pub struct BookHit {
    pub title: String,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub published: Option<String>,
    /// ISBN or catalog volume id
    pub identifier: Option<String>,
    /// Catalog canonical URL; empty when the catalog returned none
    pub url: String,
    /// Snippet matching the search keywords, when available
    pub snippet: Option<String>,
}

/// Title+author book search with keyword snippets.
#[async_trait]
pub trait BookCatalog: Send + Sync {
    async fn search(&self, title: &str, author: &str, keywords: &str) -> Result<Option<BookHit>>;
}

/// Google Books volumes API client.
pub struct GoogleBooksClient {
    http: Client,
    api_key: Option<String>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    id: String,
    #[serde(rename = "volumeInfo")]
    volume_info: VolumeInfo,
    #[serde(rename = "searchInfo")]
    search_info: Option<SearchInfo>,
}

#[derive(Debug, Deserialize)]
struct VolumeInfo {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    publisher: Option<String>,
    #[serde(rename = "publishedDate")]
    published_date: Option<String>,
    #[serde(rename = "canonicalVolumeLink")]
    canonical_volume_link: Option<String>,
    #[serde(rename = "industryIdentifiers", default)]
    industry_identifiers: Vec<IndustryIdentifier>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct SearchInfo {
    #[serde(rename = "textSnippet")]
    text_snippet: Option<String>,
}

impl GoogleBooksClient {
    const DEFAULT_BASE_URL: &'static str = "https://www.googleapis.com/books/v1";

    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl BookCatalog for GoogleBooksClient {
    async fn search(&self, title: &str, author: &str, keywords: &str) -> Result<Option<BookHit>> {
        let query = format!("intitle:{} inauthor:{} {}", title, author, keywords);
        let mut request = self
            .http
            .get(format!("{}/volumes", self.base_url))
            .query(&[("q", query.as_str()), ("maxResults", "3")]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::provider("google_books", e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::provider(
                "google_books",
                format!("status {}", response.status()),
            ));
        }

        let volumes: VolumesResponse = response
            .json()
            .await
            .map_err(|e| Error::provider("google_books", e.to_string()))?;

        let Some(volume) = volumes.items.into_iter().next() else {
            return Ok(None);
        };

        let info = volume.volume_info;
        Ok(Some(BookHit {
            title: info.title.unwrap_or_default(),
            authors: info.authors,
            publisher: info.publisher,
            published: info.published_date,
            identifier: info
                .industry_identifiers
                .into_iter()
                .next()
                .map(|i| i.identifier)
                .or(Some(volume.id)),
            url: info.canonical_volume_link.unwrap_or_default(),
            snippet: volume.search_info.and_then(|s| s.text_snippet),
        }))
    }
}

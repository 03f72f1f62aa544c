//! Generic web search (Tier 4) and URL reachability checks.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// One web search result.
#[derive(Debug, Clone, Default)]
pub struct WebHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Generic web search provider.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<WebHit>>;
}

/// Metadata fetched from a live page.
#[derive(Debug, Clone, Default)]
pub struct PageMetadata {
    pub title: String,
}

/// Checks that a URL is reachable and reports its page metadata.
#[async_trait]
pub trait UrlChecker: Send + Sync {
    /// `None` when the URL is unreachable or non-2xx.
    async fn check(&self, url: &str) -> Result<Option<PageMetadata>>;
}

/// Tavily search API client.
pub struct TavilyClient {
    http: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: Option<String>,
    url: Option<String>,
    content: Option<String>,
}

impl TavilyClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.tavily.com";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl WebSearch for TavilyClient {
    async fn search(&self, query: &str) -> Result<Vec<WebHit>> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results: 5,
        };

        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::provider("tavily", e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::provider(
                "tavily",
                format!("status {}", response.status()),
            ));
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| Error::provider("tavily", e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .filter_map(|r| {
                let url = r.url?;
                Some(WebHit {
                    title: r.title.unwrap_or_default(),
                    url,
                    snippet: r.content.unwrap_or_default(),
                })
            })
            .collect())
    }
}

/// Live HTTP URL checker.
pub struct HttpUrlChecker {
    http: Client,
}

impl HttpUrlChecker {
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpUrlChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlChecker for HttpUrlChecker {
    async fn check(&self, url: &str) -> Result<Option<PageMetadata>> {
        let response = match self.http.get(url).send().await {
            Ok(r) => r,
            // Unreachable is an answer, not a fault
            Err(_) => return Ok(None),
        };

        if !response.status().is_success() {
            return Ok(None);
        }

        let body = response.text().await.unwrap_or_default();
        Ok(Some(PageMetadata {
            title: extract_html_title(&body).unwrap_or_default(),
        }))
    }
}

/// Pull the `<title>` text out of an HTML document.
pub(crate) fn extract_html_title(html: &str) -> Option<String> {
    let lower = html.to_lowercase();
    let start = lower.find("<title")?;
    let start = html[start..].find('>')? + start + 1;
    let end = lower[start..].find("</title>")? + start;
    Some(html[start..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tavily_response_parsing() {
        let body = r#"{
            "results": [
                {"title": "Flood myths", "url": "https://example.org/flood", "content": "Many cultures record flood narratives"},
                {"url": "https://example.org/untitled"}
            ]
        }"#;
        let parsed: TavilyResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results.len(), 2);
    }

    #[test]
    fn test_extract_html_title() {
        let html = "<html><head><TITLE> The Epic of Gilgamesh </TITLE></head></html>";
        assert_eq!(
            extract_html_title(html).as_deref(),
            Some("The Epic of Gilgamesh")
        );
        assert_eq!(extract_html_title("<html><body>no title</body>"), None);
    }
}

//! Embedding service: fixed-dimension vectors for claim text.
//!
//! Every embedding in the system is produced at `EMBEDDING_DIM` and
//! L2-normalized before it is stored or compared, so cosine similarity
//! reduces to a dot product. The store and the verification library both
//! assume this normalization.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::error::{Error, Result};

/// Implementation-wide embedding dimension.
pub const EMBEDDING_DIM: usize = 1536;

/// Produces a fixed-dimension vector for an arbitrary UTF-8 string.
///
/// Pure function from the caller's perspective; implementations may cache.
/// Fails with a recoverable error on transport failure and never silently
/// returns a zero vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// L2-normalize a vector in place and return it.
///
/// Fails if the vector has zero magnitude; a zero embedding would make every
/// cosine comparison meaningless downstream.
pub fn l2_normalize(mut v: Vec<f32>) -> Result<Vec<f32>> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(Error::Embedding("zero-magnitude embedding".to_string()));
    }
    for x in &mut v {
        *x /= norm;
    }
    Ok(v)
}

/// Cosine similarity over two L2-normalized vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Configuration for the hosted embedding provider.
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// API key
    pub api_key: String,
    /// Base URL override
    pub base_url: Option<String>,
    /// Embedding model
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl EmbedderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            model: "text-embedding-3-small".to_string(),
            timeout_secs: 30,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// OpenAI embedding client.
pub struct OpenAIEmbedder {
    config: EmbedderConfig,
    http: Client,
}

// OpenAI embedding API types
#[derive(Debug, Serialize)]
struct EmbeddingApiRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingApiData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiError {
    error: EmbeddingApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiErrorDetail {
    message: String,
}

impl OpenAIEmbedder {
    const DEFAULT_BASE_URL: &'static str = "https://api.openai.com";

    pub fn new(config: EmbedderConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::Embedding("cannot embed empty text".to_string()));
        }

        let api_request = EmbeddingApiRequest {
            model: self.config.model.clone(),
            input: vec![text.to_string()],
        };

        let url = format!("{}/v1/embeddings", self.base_url());

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<EmbeddingApiError>(&body) {
                return Err(Error::Embedding(format!(
                    "Embedding API error: {}",
                    error.error.message
                )));
            }
            return Err(Error::Embedding(format!(
                "Embedding API error ({}): {}",
                status, body
            )));
        }

        let api_response: EmbeddingApiResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        let embedding = api_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Embedding("No embedding in response".to_string()))?;

        if embedding.len() != EMBEDDING_DIM {
            return Err(Error::Embedding(format!(
                "Unexpected embedding dimension: {} (wanted {})",
                embedding.len(),
                EMBEDDING_DIM
            )));
        }

        l2_normalize(embedding)
    }
}

/// Deterministic local embedder.
///
/// Hashes word tokens into a sparse `EMBEDDING_DIM` vector and normalizes.
/// Not semantic: identical texts map to identical vectors and word overlap
/// yields partial similarity, which is exactly what store and dedup tests
/// need without a network dependency.
#[derive(Debug, Clone, Default)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn embed_sync(text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::Embedding("cannot embed empty text".to_string()));
        }

        let mut v = vec![0.0f32; EMBEDDING_DIM];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            // First 8 bytes pick the dimension, next byte picks the sign.
            let idx = u64::from_le_bytes(digest[0..8].try_into().expect("digest slice"))
                as usize
                % EMBEDDING_DIM;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }

        l2_normalize(v)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Self::embed_sync(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedder_deterministic() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("Luke used Mark as a source").await.unwrap();
        let b = embedder.embed("Luke used Mark as a source").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn test_hash_embedder_normalized() {
        let embedder = HashEmbedder::new();
        let v = embedder.embed("the global flood narrative").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_identical_text_full_similarity() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("Noah's ark could hold all animals").await.unwrap();
        let b = embedder.embed("Noah's ark could hold all animals").await.unwrap();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_overlapping_text_partial_similarity() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("the gospel of luke depends on mark").await.unwrap();
        let b = embedder.embed("the gospel of john is independent").await.unwrap();
        let sim = cosine_similarity(&a, &b);
        assert!(sim > 0.0 && sim < 0.9, "similarity was {}", sim);
    }

    #[tokio::test]
    async fn test_empty_text_is_error() {
        let embedder = HashEmbedder::new();
        assert!(embedder.embed("   ").await.is_err());
    }

    #[test]
    fn test_zero_vector_rejected() {
        assert!(l2_normalize(vec![0.0; 4]).is_err());
    }

    #[test]
    fn test_cosine_of_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}

//! Verified-source library: long-lived catalog of external sources the
//! verification tiers have already confirmed. Metadata only; claim-specific
//! quotes never land here.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::embedding::{cosine_similarity, Embedder, EMBEDDING_DIM};
use crate::error::{Error, Result};

use super::types::{SourceType, VerificationMethod, VerifiedSource};
use super::{blob_to_embedding, embedding_to_blob, parse_datetime, parse_enum_col, Store};

impl Store {
    /// Add a verified source, deduplicating on the normalized key.
    ///
    /// Returns true when a new row was inserted, false when an entry with
    /// the same key already existed.
    pub fn add_verified_source(&self, source: &VerifiedSource) -> Result<bool> {
        if source.topic_embedding.len() != EMBEDDING_DIM {
            return Err(Error::bad_input(format!(
                "topic embedding has dimension {}, expected {}",
                source.topic_embedding.len(),
                EMBEDDING_DIM
            )));
        }

        let inserted = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO verified_sources (
                    id, title, author, publisher, published, identifier, normalized_key,
                    url, source_type, verification_method, topic_embedding, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(normalized_key) DO NOTHING",
                params![
                    source.id.to_string(),
                    source.title,
                    source.author,
                    source.publisher,
                    source.published,
                    source.identifier,
                    source.normalized_key,
                    source.url,
                    source.source_type.as_str(),
                    source.verification_method.as_str(),
                    embedding_to_blob(&source.topic_embedding),
                    source.created_at.to_rfc3339(),
                ],
            )
        })?;
        Ok(inserted > 0)
    }

    /// Get a library entry by its normalized key.
    pub fn verified_source_by_key(&self, normalized_key: &str) -> Result<Option<VerifiedSource>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, title, author, publisher, published, identifier, normalized_key,
                        url, source_type, verification_method, topic_embedding, created_at
                 FROM verified_sources WHERE normalized_key = ?1",
                params![normalized_key],
                row_to_verified_source,
            )
            .optional()
        })
    }

    /// Cosine search over library topic embeddings.
    pub fn search_library_by_embedding(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<(VerifiedSource, f32)>> {
        if query.len() != EMBEDDING_DIM {
            return Err(Error::bad_input(format!(
                "query embedding has dimension {}, expected {}",
                query.len(),
                EMBEDDING_DIM
            )));
        }

        let mut scored: Vec<(VerifiedSource, f32)> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, author, publisher, published, identifier, normalized_key,
                        url, source_type, verification_method, topic_embedding, created_at
                 FROM verified_sources",
            )?;
            let rows = stmt.query_map([], row_to_verified_source)?;

            let mut scored = Vec::new();
            for row in rows {
                let source = row?;
                if source.topic_embedding.len() != query.len() {
                    continue;
                }
                let similarity = cosine_similarity(query, &source.topic_embedding);
                if similarity >= threshold {
                    scored.push((source, similarity));
                }
            }
            Ok(scored)
        })?;

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Search the library by text, embedding the query first.
    pub async fn search_library(
        &self,
        query_text: &str,
        threshold: f32,
        limit: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<(VerifiedSource, f32)>> {
        let query = embedder.embed(query_text).await?;
        self.search_library_by_embedding(&query, threshold, limit)
    }
}

fn row_to_verified_source(row: &rusqlite::Row) -> rusqlite::Result<VerifiedSource> {
    let id: String = row.get(0)?;
    let source_type: String = row.get(8)?;
    let method: String = row.get(9)?;
    let embedding: Vec<u8> = row.get(10)?;

    Ok(VerifiedSource {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::new_v4()),
        title: row.get(1)?,
        author: row.get(2)?,
        publisher: row.get(3)?,
        published: row.get(4)?,
        identifier: row.get(5)?,
        normalized_key: row.get(6)?,
        url: row.get(7)?,
        source_type: parse_enum_col(8, &source_type, SourceType::parse, "source type")?,
        verification_method: parse_enum_col(
            9,
            &method,
            VerificationMethod::parse,
            "verification method",
        )?,
        topic_embedding: blob_to_embedding(&embedding),
        created_at: parse_datetime(row.get::<_, String>(11)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;

    fn embed(text: &str) -> Vec<f32> {
        futures::executor::block_on(HashEmbedder::new().embed(text)).unwrap()
    }

    fn sample(title: &str, author: &str, topic: &str) -> VerifiedSource {
        VerifiedSource::new(title, author)
            .with_url("https://books.example.org/entry")
            .with_method(VerificationMethod::GoogleBooks)
            .with_topic_embedding(embed(topic))
    }

    #[test]
    fn test_add_and_fetch_by_key() {
        let store = Store::in_memory().unwrap();
        let source = sample("The Four Gospels", "B. H. Streeter", "synoptic problem");
        assert!(store.add_verified_source(&source).unwrap());

        let fetched = store
            .verified_source_by_key(&source.normalized_key)
            .unwrap()
            .unwrap();
        assert_eq!(fetched.title, "The Four Gospels");
        assert_eq!(fetched.url, "https://books.example.org/entry");
    }

    #[test]
    fn test_duplicate_key_is_ignored() {
        let store = Store::in_memory().unwrap();
        let first = sample("The Four Gospels", "B. H. Streeter", "synoptic problem");
        // Same title/author from a different tier run
        let second = sample("The Four Gospels", "b. h. streeter", "gospel sources");

        assert!(store.add_verified_source(&first).unwrap());
        assert!(!store.add_verified_source(&second).unwrap());
        assert_eq!(store.count_verified_sources().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_semantic_search_ranks_matches() {
        let store = Store::in_memory().unwrap();
        store
            .add_verified_source(&sample(
                "Flood Geology Reconsidered",
                "A. Author",
                "global flood geology sediment evidence",
            ))
            .unwrap();
        store
            .add_verified_source(&sample(
                "Pauline Chronology",
                "B. Author",
                "paul epistles dating",
            ))
            .unwrap();

        let embedder = HashEmbedder::new();
        let hits = store
            .search_library("global flood geology sediment evidence", 0.5, 5, &embedder)
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.title, "Flood Geology Reconsidered");
    }
}

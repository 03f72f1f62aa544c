//! Claim card persistence: insert, lookup, semantic search, audits listing,
//! claim-text mutation with re-embed, and the generated-content reset.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use crate::embedding::{cosine_similarity, Embedder, EMBEDDING_DIM};
use crate::error::{Error, Result};

use super::types::{
    AuditListFilter, ClaimCard, ClaimCategory, ConfidenceLevel, ContentType, Source, SourceType,
    Verdict, VerificationMethod, VerificationStatus,
};
use super::{
    blob_to_embedding, embedding_to_blob, parse_datetime, parse_enum_col, Store,
};

const CLAIM_CARD_COLUMNS: &str = "id, claim_text, claimant, claim_type, claim_type_category, \
     verdict, short_answer, deep_answer, why_persists, confidence, confidence_explanation, \
     agent_audit, visible_in_audits, embedding, created_at, updated_at";

impl Store {
    /// Persist a card with its sources and tag links atomically.
    ///
    /// The embedding must already be computed over the exact `claim_text`.
    pub fn insert_claim_card(&self, card: &ClaimCard) -> Result<()> {
        validate_card(card)?;

        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO claim_cards (
                    id, claim_text, claimant, claim_type, claim_type_category, verdict,
                    short_answer, deep_answer, why_persists, confidence, confidence_explanation,
                    agent_audit, visible_in_audits, embedding, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    card.id.to_string(),
                    card.claim_text,
                    card.claimant,
                    card.claim_type,
                    card.claim_type_category.map(|c| c.as_str()),
                    card.verdict.as_str(),
                    card.short_answer,
                    card.deep_answer,
                    serde_json::to_string(&card.why_persists).unwrap_or_else(|_| "[]".into()),
                    card.confidence.as_str(),
                    card.confidence_explanation,
                    card.agent_audit.to_string(),
                    card.visible_in_audits,
                    embedding_to_blob(&card.embedding),
                    card.created_at.to_rfc3339(),
                    card.updated_at.to_rfc3339(),
                ],
            )?;

            for (position, source) in card.sources.iter().enumerate() {
                tx.execute(
                    "INSERT INTO sources (
                        id, claim_card_id, position, citation, url, quote_text, usage_context,
                        source_type, verification_method, verification_status, content_type,
                        url_verified
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        source.id.to_string(),
                        card.id.to_string(),
                        position as i64,
                        source.citation,
                        source.url,
                        source.quote_text,
                        source.usage_context,
                        source.source_type.as_str(),
                        source.verification_method.as_str(),
                        source.verification_status.as_str(),
                        source.content_type.as_str(),
                        source.url_verified,
                    ],
                )?;
            }

            for tag in &card.apologetics_tags {
                tx.execute(
                    "INSERT INTO claim_tags (claim_card_id, kind, tag) VALUES (?1, 'APOLOGETICS', ?2)",
                    params![card.id.to_string(), tag],
                )?;
            }
            for tag in &card.category_tags {
                tx.execute(
                    "INSERT INTO claim_tags (claim_card_id, kind, tag) VALUES (?1, 'CATEGORY', ?2)",
                    params![card.id.to_string(), tag],
                )?;
            }

            Ok(())
        })
    }

    /// Get a card with eager-loaded sources and tags.
    pub fn claim_card_by_id(&self, id: &Uuid) -> Result<ClaimCard> {
        let card = self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM claim_cards WHERE id = ?1", CLAIM_CARD_COLUMNS),
                params![id.to_string()],
                row_to_claim_card,
            )
            .optional()?
            .map(|mut card| {
                load_satellites(conn, &mut card)?;
                Ok(card)
            })
            .transpose()
        })?;

        card.ok_or_else(|| Error::not_found("claim card", id.to_string()))
    }

    /// Cosine search over stored claim embeddings.
    ///
    /// Returns up to `limit` `(card, similarity)` tuples with
    /// `similarity >= threshold`, ordered by descending similarity; ties are
    /// broken by newer `created_at`.
    pub fn search_by_embedding(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<(ClaimCard, f32)>> {
        if query.len() != EMBEDDING_DIM {
            return Err(Error::bad_input(format!(
                "query embedding has dimension {}, expected {}",
                query.len(),
                EMBEDDING_DIM
            )));
        }

        let mut scored: Vec<(Uuid, f32, String)> = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, embedding, created_at FROM claim_cards")?;
            let rows = stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                let created_at: String = row.get(2)?;
                Ok((id, blob, created_at))
            })?;

            let mut scored = Vec::new();
            for row in rows {
                let (id, blob, created_at) = row?;
                let Ok(id) = Uuid::parse_str(&id) else {
                    continue;
                };
                let embedding = blob_to_embedding(&blob);
                if embedding.len() != query.len() {
                    continue;
                }
                let similarity = cosine_similarity(query, &embedding);
                if similarity >= threshold {
                    scored.push((id, similarity, created_at));
                }
            }
            Ok(scored)
        })?;

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.2.cmp(&a.2))
        });
        scored.truncate(limit);

        let mut results = Vec::with_capacity(scored.len());
        for (id, similarity, _) in scored {
            results.push((self.claim_card_by_id(&id)?, similarity));
        }
        Ok(results)
    }

    /// Paginated public audits listing, restricted to visible cards.
    pub fn list_for_audits(&self, filter: &AuditListFilter) -> Result<Vec<ClaimCard>> {
        let ids: Vec<Uuid> = self.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT id FROM claim_cards WHERE visible_in_audits = 1",
            );
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(category) = filter.category {
                sql.push_str(" AND claim_type_category = ?");
                params_vec.push(Box::new(category.as_str().to_string()));
            }
            if let Some(verdict) = filter.verdict {
                sql.push_str(" AND verdict = ?");
                params_vec.push(Box::new(verdict.as_str().to_string()));
            }
            if let Some(ref query) = filter.query {
                sql.push_str(" AND claim_text LIKE ?");
                params_vec.push(Box::new(format!("%{}%", query)));
            }

            sql.push_str(" ORDER BY created_at DESC");
            sql.push_str(&format!(" LIMIT {} OFFSET {}", filter.limit, filter.offset));

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let mut stmt = conn.prepare(&sql)?;
            let ids = stmt
                .query_map(params_refs.as_slice(), |row| row.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .filter_map(|s| Uuid::parse_str(&s).ok())
                .collect();
            Ok(ids)
        })?;

        ids.iter().map(|id| self.claim_card_by_id(id)).collect()
    }

    /// Mutate `claim_text`, regenerating the embedding from the new text.
    ///
    /// The embedding is computed first, then text, embedding, and
    /// `updated_at` are written in one transaction so no observer ever sees
    /// a card whose vector belongs to stale text.
    pub async fn update_claim_text(
        &self,
        id: &Uuid,
        new_text: &str,
        embedder: &dyn Embedder,
    ) -> Result<()> {
        if new_text.trim().is_empty() {
            return Err(Error::bad_input("claim_text must not be empty"));
        }

        let embedding = embedder.embed(new_text).await?;

        let updated = self.with_tx(|tx| {
            tx.execute(
                "UPDATE claim_cards SET claim_text = ?2, embedding = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    new_text,
                    embedding_to_blob(&embedding),
                    Utc::now().to_rfc3339(),
                ],
            )
        })?;

        if updated == 0 {
            return Err(Error::not_found("claim card", id.to_string()));
        }
        Ok(())
    }

    /// Remove all generated content in one transaction.
    ///
    /// Delete order respects foreign keys: router decisions, blog posts,
    /// sources and tag links, claim cards, topic queue entries. Agent
    /// prompts and the verified-source library are untouched. Any failure
    /// rolls back the whole reset.
    pub fn delete_generated_content(&self) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute("DELETE FROM router_decisions", [])?;
            tx.execute("DELETE FROM blog_posts", [])?;
            tx.execute("DELETE FROM sources", [])?;
            tx.execute("DELETE FROM claim_tags", [])?;
            tx.execute("DELETE FROM claim_cards", [])?;
            tx.execute("DELETE FROM topic_queue", [])?;
            Ok(())
        })?;
        info!("generated content deleted; prompts and library preserved");
        Ok(())
    }

    /// Count rows in one of the store's tables.
    pub fn count_claim_cards(&self) -> Result<u64> {
        self.count_table("claim_cards")
    }

    pub fn count_blog_posts(&self) -> Result<u64> {
        self.count_table("blog_posts")
    }

    pub fn count_topics(&self) -> Result<u64> {
        self.count_table("topic_queue")
    }

    pub fn count_router_decisions(&self) -> Result<u64> {
        self.count_table("router_decisions")
    }

    pub fn count_agent_prompts(&self) -> Result<u64> {
        self.count_table("agent_prompts")
    }

    pub fn count_verified_sources(&self) -> Result<u64> {
        self.count_table("verified_sources")
    }

    fn count_table(&self, table: &str) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get::<_, i64>(0)
            })
        })
        .map(|n| n as u64)
    }
}

fn validate_card(card: &ClaimCard) -> Result<()> {
    if card.claim_text.trim().is_empty() {
        return Err(Error::bad_input("claim_text must not be empty"));
    }
    if card.short_answer.trim().is_empty() {
        return Err(Error::bad_input("short_answer must not be empty"));
    }
    if card.sources.is_empty() {
        return Err(Error::bad_input("a claim card requires at least one source"));
    }
    if card.embedding.len() != EMBEDDING_DIM {
        return Err(Error::bad_input(format!(
            "embedding has dimension {}, expected {}",
            card.embedding.len(),
            EMBEDDING_DIM
        )));
    }
    for source in &card.sources {
        if source.usage_context.trim().is_empty() {
            return Err(Error::bad_input(format!(
                "source '{}' is missing usage_context",
                source.citation
            )));
        }
    }
    Ok(())
}

fn row_to_claim_card(row: &rusqlite::Row) -> rusqlite::Result<ClaimCard> {
    let id: String = row.get(0)?;
    let category: Option<String> = row.get(4)?;
    let verdict: String = row.get(5)?;
    let why_persists: String = row.get(8)?;
    let confidence: String = row.get(9)?;
    let agent_audit: String = row.get(11)?;
    let embedding: Vec<u8> = row.get(13)?;

    Ok(ClaimCard {
        id: Uuid::parse_str(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        claim_text: row.get(1)?,
        claimant: row.get(2)?,
        claim_type: row.get(3)?,
        claim_type_category: category
            .map(|s| parse_enum_col(4, &s, ClaimCategory::parse, "claim category"))
            .transpose()?,
        verdict: parse_enum_col(5, &verdict, Verdict::parse, "verdict")?,
        short_answer: row.get(6)?,
        deep_answer: row.get(7)?,
        why_persists: serde_json::from_str(&why_persists).unwrap_or_default(),
        confidence: parse_enum_col(9, &confidence, ConfidenceLevel::parse, "confidence")?,
        confidence_explanation: row.get(10)?,
        agent_audit: serde_json::from_str(&agent_audit)
            .unwrap_or(serde_json::Value::Object(Default::default())),
        visible_in_audits: row.get(12)?,
        embedding: blob_to_embedding(&embedding),
        sources: Vec::new(),
        apologetics_tags: Vec::new(),
        category_tags: Vec::new(),
        created_at: parse_datetime(row.get::<_, String>(14)?),
        updated_at: parse_datetime(row.get::<_, String>(15)?),
    })
}

fn load_satellites(conn: &Connection, card: &mut ClaimCard) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT id, citation, url, quote_text, usage_context, source_type,
                verification_method, verification_status, content_type, url_verified
         FROM sources WHERE claim_card_id = ?1 ORDER BY position",
    )?;
    card.sources = stmt
        .query_map(params![card.id.to_string()], |row| {
            let id: String = row.get(0)?;
            let source_type: String = row.get(5)?;
            let method: String = row.get(6)?;
            let status: String = row.get(7)?;
            let content_type: String = row.get(8)?;
            Ok(Source {
                id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::new_v4()),
                citation: row.get(1)?,
                url: row.get(2)?,
                quote_text: row.get(3)?,
                usage_context: row.get(4)?,
                source_type: parse_enum_col(5, &source_type, SourceType::parse, "source type")?,
                verification_method: parse_enum_col(
                    6,
                    &method,
                    VerificationMethod::parse,
                    "verification method",
                )?,
                verification_status: parse_enum_col(
                    7,
                    &status,
                    VerificationStatus::parse,
                    "verification status",
                )?,
                content_type: parse_enum_col(8, &content_type, ContentType::parse, "content type")?,
                url_verified: row.get(9)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT kind, tag FROM claim_tags WHERE claim_card_id = ?1 ORDER BY rowid",
    )?;
    let tags = stmt
        .query_map(params![card.id.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    card.apologetics_tags = tags
        .iter()
        .filter(|(kind, _)| kind == "APOLOGETICS")
        .map(|(_, tag)| tag.clone())
        .collect();
    card.category_tags = tags
        .iter()
        .filter(|(kind, _)| kind == "CATEGORY")
        .map(|(_, tag)| tag.clone())
        .collect();

    Ok(())
}

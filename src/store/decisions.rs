//! Append-only routing decision log.

use rusqlite::params;
use uuid::Uuid;

use crate::error::Result;

use super::types::{RouterDecision, RoutingMode};
use super::{json_to_uuids, parse_datetime, parse_enum_col, uuids_to_json, Store};

/// Reasoning excerpts are capped at this many characters before storage.
pub const REASONING_EXCERPT_MAX: usize = 500;

const DECISION_COLUMNS: &str = "id, original_question, reformulated_question, recent_history, \
     mode, referenced_claim_ids, search_candidates, reasoning_excerpt, elapsed_ms, created_at";

impl Store {
    /// Append a routing decision. The candidate summary is always stored,
    /// `[]` when the search returned nothing.
    pub fn insert_router_decision(&self, decision: &RouterDecision) -> Result<()> {
        let mut excerpt = decision.reasoning_excerpt.clone();
        if excerpt.chars().count() > REASONING_EXCERPT_MAX {
            excerpt = excerpt.chars().take(REASONING_EXCERPT_MAX).collect();
        }

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO router_decisions (
                    id, original_question, reformulated_question, recent_history, mode,
                    referenced_claim_ids, search_candidates, reasoning_excerpt, elapsed_ms,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    decision.id.to_string(),
                    decision.original_question,
                    decision.reformulated_question,
                    decision.recent_history.to_string(),
                    decision.mode.as_str(),
                    uuids_to_json(&decision.referenced_claim_ids),
                    serde_json::to_string(&decision.search_candidates)
                        .unwrap_or_else(|_| "[]".into()),
                    excerpt,
                    decision.elapsed_ms as i64,
                    decision.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Most recent decisions, newest first.
    pub fn list_router_decisions(&self, limit: usize) -> Result<Vec<RouterDecision>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM router_decisions ORDER BY created_at DESC LIMIT ?1",
                DECISION_COLUMNS
            ))?;
            let rows = stmt.query_map(params![limit as i64], row_to_decision)?;
            rows.collect()
        })
    }

    /// Reverse lookup: decisions that referenced a given claim card.
    pub fn router_decisions_for_claim(&self, claim_id: &Uuid) -> Result<Vec<RouterDecision>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM router_decisions
                 WHERE referenced_claim_ids LIKE ?1 ORDER BY created_at DESC",
                DECISION_COLUMNS
            ))?;
            let rows = stmt.query_map(
                params![format!("%{}%", claim_id)],
                row_to_decision,
            )?;
            rows.collect()
        })
    }
}

fn row_to_decision(row: &rusqlite::Row) -> rusqlite::Result<RouterDecision> {
    let id: String = row.get(0)?;
    let recent_history: String = row.get(3)?;
    let mode: String = row.get(4)?;
    let referenced: String = row.get(5)?;
    let candidates: String = row.get(6)?;

    Ok(RouterDecision {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::new_v4()),
        original_question: row.get(1)?,
        reformulated_question: row.get(2)?,
        recent_history: serde_json::from_str(&recent_history)
            .unwrap_or(serde_json::Value::Array(Vec::new())),
        mode: parse_enum_col(4, &mode, RoutingMode::parse, "routing mode")?,
        referenced_claim_ids: json_to_uuids(&referenced),
        search_candidates: serde_json::from_str(&candidates).unwrap_or_default(),
        reasoning_excerpt: row.get(7)?,
        elapsed_ms: row.get::<_, i64>(8)? as u64,
        created_at: parse_datetime(row.get::<_, String>(9)?),
    })
}

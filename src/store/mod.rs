//! Persistent claim store: cards, sources, tags, library, topics, articles,
//! routing decisions, and agent prompts in one SQLite database.
//!
//! All writes go through transactions on a shared connection. Embeddings are
//! stored as little-endian `f32` BLOBs and compared by cosine similarity
//! over the L2-normalized vectors the embedding service produces.
//!
//! ## Example
//!
//! ```rust,ignore
//! use veracity_core::store::{AuditListFilter, ClaimCard, ConfidenceLevel, Source, Store, Verdict};
//!
//! let store = Store::in_memory()?;
//!
//! let card = ClaimCard::new("Luke used Mark as a source", Verdict::True, ConfidenceLevel::High)
//!     .with_short_answer("This claim is true; the verbal agreement is extensive.")
//!     .with_embedding(embedding)
//!     .with_source(Source::new("Streeter, The Four Gospels", "establishes priority"));
//! store.insert_claim_card(&card)?;
//!
//! let hits = store.search_by_embedding(&query_embedding, 0.80, 5)?;
//! ```

mod claims;
mod decisions;
mod library;
mod prompts;
mod schema;
mod topics;
mod types;

pub use prompts::{default_prompts, AGENT_NAMES};
pub use schema::{get_schema_version, initialize_schema, is_initialized, SCHEMA_VERSION};
pub use types::{
    normalized_source_key, AgentPrompt, AuditListFilter, BlogPost, CandidateSummary, ClaimCard,
    ClaimCategory, ConfidenceLevel, ContentType, ReviewStatus, RouterDecision, RoutingMode,
    Source, SourceType, TopicQueueEntry, TopicStatus, Verdict, VerificationMethod,
    VerificationStatus, VerifiedSource,
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::{Error, Result};

/// SQLite-backed claim store.
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(map_sqlite_error)?;
        if !schema::is_initialized(&conn) {
            schema::initialize_schema(&conn).map_err(map_sqlite_error)?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_error)?;
        schema::initialize_schema(&conn).map_err(map_sqlite_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn).map_err(map_sqlite_error)
    }

    /// Run `f` inside a transaction; any error rolls back every change.
    pub(crate) fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> rusqlite::Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        let tx = conn.transaction().map_err(map_sqlite_error)?;
        let out = f(&tx).map_err(map_sqlite_error)?;
        tx.commit().map_err(map_sqlite_error)?;
        Ok(out)
    }
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

/// Map rusqlite failures onto the crate's fault classes. Busy/locked and
/// constraint violations surface as conflicts so callers can distinguish a
/// racing writer from a broken database.
fn map_sqlite_error(e: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(inner, _) = &e {
        match inner.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::ConstraintViolation => {
                return Error::Conflict(e.to_string());
            }
            _ => {}
        }
    }
    Error::Storage(e.to_string())
}

// ==================== Row mapping helpers ====================

pub(crate) fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub(crate) fn blob_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().expect("4-byte chunk")))
        .collect()
}

pub(crate) fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's datetime('now') default emits "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn uuids_to_json(ids: &[Uuid]) -> String {
    serde_json::to_string(&ids.iter().map(|id| id.to_string()).collect::<Vec<_>>())
        .unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn json_to_uuids(json: &str) -> Vec<Uuid> {
    serde_json::from_str::<Vec<String>>(json)
        .unwrap_or_default()
        .iter()
        .filter_map(|s| Uuid::parse_str(s).ok())
        .collect()
}

/// Parse a stored enum name, failing the row mapping on an unknown value
/// instead of substituting a default.
pub(crate) fn parse_enum_col<T>(
    idx: usize,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
    what: &'static str,
) -> rusqlite::Result<T> {
    parse(value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::from(format!("unknown {}: {}", what, value)),
        )
    })
}

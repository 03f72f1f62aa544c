//! SQLite schema and migrations for the claim store.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    // Enable WAL mode for better concurrent access
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // Enable foreign keys
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // Create schema version table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Check current version
    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    // Apply migrations
    if current_version < 1 {
        apply_v1_schema(conn)?;
    }

    Ok(())
}

/// Apply version 1 schema.
fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    // Claim cards: one row per audited claim, embedding over claim_text
    conn.execute(
        "CREATE TABLE IF NOT EXISTS claim_cards (
            id TEXT PRIMARY KEY,
            claim_text TEXT NOT NULL,
            claimant TEXT,
            claim_type TEXT NOT NULL DEFAULT '',
            claim_type_category TEXT,
            verdict TEXT NOT NULL,
            short_answer TEXT NOT NULL,
            deep_answer TEXT NOT NULL DEFAULT '',
            why_persists TEXT NOT NULL DEFAULT '[]',
            confidence TEXT NOT NULL,
            confidence_explanation TEXT NOT NULL DEFAULT '',
            agent_audit TEXT NOT NULL DEFAULT '{}',
            visible_in_audits INTEGER NOT NULL DEFAULT 1,
            embedding BLOB NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Sources are owned by one claim card and die with it
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            claim_card_id TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0,
            citation TEXT NOT NULL,
            url TEXT NOT NULL DEFAULT '',
            quote_text TEXT NOT NULL DEFAULT '',
            usage_context TEXT NOT NULL,
            source_type TEXT NOT NULL,
            verification_method TEXT NOT NULL,
            verification_status TEXT NOT NULL,
            content_type TEXT NOT NULL,
            url_verified INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (claim_card_id) REFERENCES claim_cards(id) ON DELETE CASCADE
        )",
        [],
    )?;

    // Tag links (apologetics and category tags share a table, kind-discriminated)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS claim_tags (
            claim_card_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            tag TEXT NOT NULL,
            FOREIGN KEY (claim_card_id) REFERENCES claim_cards(id) ON DELETE CASCADE
        )",
        [],
    )?;

    // Long-lived library of previously verified external sources.
    // Holds metadata only, never claim-specific quotes; survives resets.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS verified_sources (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            publisher TEXT,
            published TEXT,
            identifier TEXT,
            normalized_key TEXT NOT NULL UNIQUE,
            url TEXT NOT NULL DEFAULT '',
            source_type TEXT NOT NULL,
            verification_method TEXT NOT NULL,
            topic_embedding BLOB NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Append-only routing decision log
    conn.execute(
        "CREATE TABLE IF NOT EXISTS router_decisions (
            id TEXT PRIMARY KEY,
            original_question TEXT NOT NULL,
            reformulated_question TEXT NOT NULL,
            recent_history TEXT NOT NULL DEFAULT '[]',
            mode TEXT NOT NULL,
            referenced_claim_ids TEXT NOT NULL DEFAULT '[]',
            search_candidates TEXT NOT NULL DEFAULT '[]',
            reasoning_excerpt TEXT NOT NULL DEFAULT '',
            elapsed_ms INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Topic queue for the article scheduler
    conn.execute(
        "CREATE TABLE IF NOT EXISTS topic_queue (
            id TEXT PRIMARY KEY,
            topic_text TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 5,
            status TEXT NOT NULL DEFAULT 'QUEUED',
            review_status TEXT NOT NULL DEFAULT 'PENDING_REVIEW',
            source TEXT NOT NULL DEFAULT '',
            claim_card_ids TEXT NOT NULL DEFAULT '[]',
            blog_post_id TEXT,
            error_message TEXT,
            admin_feedback TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Generated articles; topic deletion nulls the back-reference
    conn.execute(
        "CREATE TABLE IF NOT EXISTS blog_posts (
            id TEXT PRIMARY KEY,
            topic_id TEXT,
            title TEXT NOT NULL,
            article_body TEXT NOT NULL,
            claim_card_ids TEXT NOT NULL DEFAULT '[]',
            published_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (topic_id) REFERENCES topic_queue(id) ON DELETE SET NULL
        )",
        [],
    )?;

    // Hot-editable agent configuration, read on every invocation
    conn.execute(
        "CREATE TABLE IF NOT EXISTS agent_prompts (
            agent_name TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            system_prompt TEXT NOT NULL,
            temperature REAL NOT NULL DEFAULT 0.2,
            max_tokens INTEGER NOT NULL DEFAULT 4096,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Indexes for common queries
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_claim_cards_created ON claim_cards(created_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_claim_cards_category ON claim_cards(claim_type_category)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sources_claim ON sources(claim_card_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_claim_tags_claim ON claim_tags(claim_card_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_topic_queue_status ON topic_queue(status, priority)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_blog_posts_published ON blog_posts(published_at)",
        [],
    )?;

    // Record migration
    conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;

    Ok(())
}

/// Get the current schema version.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Check if the schema is initialized.
pub fn is_initialized(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='claim_cards'",
        [],
        |row| row.get::<_, i32>(0),
    )
    .map(|count| count > 0)
    .unwrap_or(false)
}

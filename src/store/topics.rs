//! Topic queue and generated articles, with the review-gating lifecycle.
//!
//! Status transitions: QUEUED → PROCESSING (the scheduler's exclusive
//! lease) → COMPLETED + PENDING_REVIEW, or FAILED with an error message.
//! A reviewer then approves (publishing the article), rejects, or requests
//! revision; failed topics can be requeued with feedback.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::types::{BlogPost, ReviewStatus, TopicQueueEntry, TopicStatus};
use super::{json_to_uuids, parse_datetime, parse_enum_col, uuids_to_json, Store};

const TOPIC_COLUMNS: &str = "id, topic_text, priority, status, review_status, source, \
     claim_card_ids, blog_post_id, error_message, admin_feedback, created_at, updated_at";

const POST_COLUMNS: &str =
    "id, topic_id, title, article_body, claim_card_ids, published_at, created_at";

impl Store {
    // ==================== Topic queue ====================

    /// Create a queued topic.
    pub fn enqueue_topic(
        &self,
        topic_text: &str,
        priority: u8,
        source: &str,
    ) -> Result<TopicQueueEntry> {
        if topic_text.trim().is_empty() {
            return Err(Error::bad_input("topic_text must not be empty"));
        }
        if !(1..=10).contains(&priority) {
            return Err(Error::bad_input("priority must be between 1 and 10"));
        }

        let entry = TopicQueueEntry {
            id: Uuid::new_v4(),
            topic_text: topic_text.to_string(),
            priority,
            status: TopicStatus::Queued,
            review_status: ReviewStatus::PendingReview,
            source: source.to_string(),
            claim_card_ids: Vec::new(),
            blog_post_id: None,
            error_message: None,
            admin_feedback: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO topic_queue (
                    id, topic_text, priority, status, review_status, source, claim_card_ids,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, '[]', ?7, ?8)",
                params![
                    entry.id.to_string(),
                    entry.topic_text,
                    entry.priority as i64,
                    entry.status.as_str(),
                    entry.review_status.as_str(),
                    entry.source,
                    entry.created_at.to_rfc3339(),
                    entry.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })?;

        Ok(entry)
    }

    pub fn topic_by_id(&self, id: &Uuid) -> Result<TopicQueueEntry> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM topic_queue WHERE id = ?1", TOPIC_COLUMNS),
                params![id.to_string()],
                row_to_topic,
            )
            .optional()
        })?
        .ok_or_else(|| Error::not_found("topic", id.to_string()))
    }

    /// Queued topics by descending priority (FIFO within a priority).
    pub fn pick_queued_topics(&self, limit: usize) -> Result<Vec<TopicQueueEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM topic_queue WHERE status = 'QUEUED'
                 ORDER BY priority DESC, created_at ASC LIMIT ?1",
                TOPIC_COLUMNS
            ))?;
            let rows = stmt.query_map(params![limit as i64], row_to_topic)?;
            rows.collect()
        })
    }

    /// Take the exclusive processing lease on a topic.
    ///
    /// The QUEUED→PROCESSING transition is the lease: it succeeds for
    /// exactly one caller, so two workers can never pick the same topic.
    pub fn lease_topic(&self, id: &Uuid) -> Result<bool> {
        let updated = self.with_conn(|conn| {
            conn.execute(
                "UPDATE topic_queue SET status = 'PROCESSING', updated_at = ?2
                 WHERE id = ?1 AND status = 'QUEUED'",
                params![id.to_string(), Utc::now().to_rfc3339()],
            )
        })?;
        Ok(updated == 1)
    }

    /// Mark a topic generated and awaiting review.
    pub fn complete_topic(
        &self,
        id: &Uuid,
        claim_card_ids: &[Uuid],
        blog_post_id: &Uuid,
    ) -> Result<()> {
        let updated = self.with_conn(|conn| {
            conn.execute(
                "UPDATE topic_queue SET status = 'COMPLETED', review_status = 'PENDING_REVIEW',
                        claim_card_ids = ?2, blog_post_id = ?3, error_message = NULL,
                        updated_at = ?4
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    uuids_to_json(claim_card_ids),
                    blog_post_id.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )
        })?;
        if updated == 0 {
            return Err(Error::not_found("topic", id.to_string()));
        }
        Ok(())
    }

    /// Mark a topic failed. Terminal unless a reviewer requeues it.
    pub fn fail_topic(&self, id: &Uuid, error_message: &str) -> Result<()> {
        let updated = self.with_conn(|conn| {
            conn.execute(
                "UPDATE topic_queue SET status = 'FAILED', error_message = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![id.to_string(), error_message, Utc::now().to_rfc3339()],
            )
        })?;
        if updated == 0 {
            return Err(Error::not_found("topic", id.to_string()));
        }
        Ok(())
    }

    /// Requeue a failed or revision-flagged topic with reviewer feedback.
    pub fn requeue_topic(&self, id: &Uuid, admin_feedback: &str) -> Result<()> {
        let updated = self.with_conn(|conn| {
            conn.execute(
                "UPDATE topic_queue SET status = 'QUEUED', review_status = 'PENDING_REVIEW',
                        error_message = NULL, admin_feedback = ?2, updated_at = ?3
                 WHERE id = ?1 AND status IN ('FAILED', 'COMPLETED')",
                params![id.to_string(), admin_feedback, Utc::now().to_rfc3339()],
            )
        })?;
        if updated == 0 {
            return Err(Error::Conflict(format!(
                "topic {} is not in a requeueable state",
                id
            )));
        }
        Ok(())
    }

    /// Delete a topic. Its blog post (if any) keeps existing with a nulled
    /// back-reference; component claim cards are untouched.
    pub fn delete_topic(&self, id: &Uuid) -> Result<bool> {
        let deleted = self.with_conn(|conn| {
            conn.execute("DELETE FROM topic_queue WHERE id = ?1", params![id.to_string()])
        })?;
        Ok(deleted > 0)
    }

    /// Topics awaiting a reviewer decision.
    pub fn list_pending_review(&self) -> Result<Vec<TopicQueueEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM topic_queue
                 WHERE status = 'COMPLETED' AND review_status = 'PENDING_REVIEW'
                 ORDER BY updated_at ASC",
                TOPIC_COLUMNS
            ))?;
            let rows = stmt.query_map([], row_to_topic)?;
            rows.collect()
        })
    }

    // ==================== Blog posts ====================

    /// Insert an unpublished article for a topic.
    pub fn insert_blog_post(
        &self,
        topic_id: &Uuid,
        title: &str,
        article_body: &str,
        claim_card_ids: &[Uuid],
    ) -> Result<BlogPost> {
        let post = BlogPost {
            id: Uuid::new_v4(),
            topic_id: Some(*topic_id),
            title: title.to_string(),
            article_body: article_body.to_string(),
            claim_card_ids: claim_card_ids.to_vec(),
            published_at: None,
            created_at: Utc::now(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO blog_posts (id, topic_id, title, article_body, claim_card_ids, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    post.id.to_string(),
                    topic_id.to_string(),
                    post.title,
                    post.article_body,
                    uuids_to_json(&post.claim_card_ids),
                    post.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })?;

        Ok(post)
    }

    pub fn blog_post_by_id(&self, id: &Uuid) -> Result<BlogPost> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM blog_posts WHERE id = ?1", POST_COLUMNS),
                params![id.to_string()],
                row_to_post,
            )
            .optional()
        })?
        .ok_or_else(|| Error::not_found("blog post", id.to_string()))
    }

    /// Public listing: only reviewer-approved, published articles.
    pub fn list_published_posts(&self) -> Result<Vec<BlogPost>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM blog_posts WHERE published_at IS NOT NULL
                 ORDER BY published_at DESC",
                POST_COLUMNS
            ))?;
            let rows = stmt.query_map([], row_to_post)?;
            rows.collect()
        })
    }

    // ==================== Review gating ====================

    /// Approve a pending topic, publishing its article.
    pub fn approve_topic(&self, id: &Uuid) -> Result<()> {
        let topic = self.topic_by_id(id)?;
        let Some(post_id) = topic.blog_post_id else {
            return Err(Error::Conflict(format!("topic {} has no article", id)));
        };

        self.with_tx(|tx| {
            tx.execute(
                "UPDATE topic_queue SET review_status = 'APPROVED', updated_at = ?2 WHERE id = ?1",
                params![id.to_string(), Utc::now().to_rfc3339()],
            )?;
            tx.execute(
                "UPDATE blog_posts SET published_at = ?2 WHERE id = ?1",
                params![post_id.to_string(), Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Reject a pending topic. The article stays unpublished; component
    /// claim cards remain visible in audits.
    pub fn reject_topic(&self, id: &Uuid) -> Result<()> {
        let updated = self.with_conn(|conn| {
            conn.execute(
                "UPDATE topic_queue SET review_status = 'REJECTED', updated_at = ?2 WHERE id = ?1",
                params![id.to_string(), Utc::now().to_rfc3339()],
            )
        })?;
        if updated == 0 {
            return Err(Error::not_found("topic", id.to_string()));
        }
        Ok(())
    }

    /// Flag a pending topic for revision with reviewer feedback.
    pub fn request_revision(&self, id: &Uuid, admin_feedback: &str) -> Result<()> {
        let updated = self.with_conn(|conn| {
            conn.execute(
                "UPDATE topic_queue SET review_status = 'NEEDS_REVISION', admin_feedback = ?2,
                        updated_at = ?3
                 WHERE id = ?1",
                params![id.to_string(), admin_feedback, Utc::now().to_rfc3339()],
            )
        })?;
        if updated == 0 {
            return Err(Error::not_found("topic", id.to_string()));
        }
        Ok(())
    }
}

fn row_to_topic(row: &rusqlite::Row) -> rusqlite::Result<TopicQueueEntry> {
    let id: String = row.get(0)?;
    let status: String = row.get(3)?;
    let review_status: String = row.get(4)?;
    let claim_ids: String = row.get(6)?;
    let blog_post_id: Option<String> = row.get(7)?;

    Ok(TopicQueueEntry {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::new_v4()),
        topic_text: row.get(1)?,
        priority: row.get::<_, i64>(2)? as u8,
        status: parse_enum_col(3, &status, TopicStatus::parse, "topic status")?,
        review_status: parse_enum_col(4, &review_status, ReviewStatus::parse, "review status")?,
        source: row.get(5)?,
        claim_card_ids: json_to_uuids(&claim_ids),
        blog_post_id: blog_post_id.and_then(|s| Uuid::parse_str(&s).ok()),
        error_message: row.get(8)?,
        admin_feedback: row.get(9)?,
        created_at: parse_datetime(row.get::<_, String>(10)?),
        updated_at: parse_datetime(row.get::<_, String>(11)?),
    })
}

fn row_to_post(row: &rusqlite::Row) -> rusqlite::Result<BlogPost> {
    let id: String = row.get(0)?;
    let topic_id: Option<String> = row.get(1)?;
    let claim_ids: String = row.get(4)?;
    let published_at: Option<String> = row.get(5)?;

    Ok(BlogPost {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::new_v4()),
        topic_id: topic_id.and_then(|s| Uuid::parse_str(&s).ok()),
        title: row.get(2)?,
        article_body: row.get(3)?,
        claim_card_ids: json_to_uuids(&claim_ids),
        published_at: published_at.map(parse_datetime),
        created_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

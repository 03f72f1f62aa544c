//! Scheduled topic-to-article generation.
//!
//! A cron-like trigger fires at an admin-configured time of day, picks up
//! to `posts_per_day` queued topics by descending priority, and runs each
//! through decompose → per-claim dedup/pipeline → compose. The
//! QUEUED→PROCESSING transition is the exclusive lease, so concurrent
//! workers never double-process a topic. Topics fail fast and
//! independently; a finished topic waits in review gating until an editor
//! approves its article.

mod autosuggest;
mod composer;
mod decomposer;

pub use autosuggest::{AutoSuggest, AutoSuggestConfig, AUTOSUGGEST_DEDUP_THRESHOLD};
pub use composer::{ComposedArticle, Composer, MAX_ARTICLE_WORDS, MIN_ARTICLE_WORDS};
pub use decomposer::{Decomposer, MAX_COMPONENT_CLAIMS, MIN_COMPONENT_CLAIMS};

use chrono::{DateTime, NaiveTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::AgentContext;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::llm::Gateway;
use crate::pipeline::Pipeline;
use crate::progress::{ProgressBus, SessionEmitter};
use crate::store::{Store, TopicQueueEntry, TopicStatus};
use crate::verify::SourceVerifier;

/// Default dedup threshold for component claims. Tighter than
/// auto-suggest's topic dedup: a component claim must be a near-duplicate
/// before an existing card is reused in its place.
pub const SCHEDULER_DEDUP_THRESHOLD: f32 = 0.92;

/// Scheduler tunables.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Topics picked per daily run
    pub posts_per_day: usize,
    /// Topics processed concurrently
    pub max_concurrent: usize,
    /// Time of day (UTC) the daily run fires
    pub run_at: NaiveTime,
    /// Component-claim dedup threshold
    pub dedup_threshold: f32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            posts_per_day: 1,
            max_concurrent: 2,
            run_at: NaiveTime::from_hms_opt(6, 0, 0).expect("valid time"),
            dedup_threshold: SCHEDULER_DEDUP_THRESHOLD,
        }
    }
}

/// Outcome of one topic run.
#[derive(Debug, Clone)]
pub struct TopicRunReport {
    pub topic_id: Uuid,
    pub status: TopicStatus,
    pub error: Option<String>,
}

/// Drives queued topics through decompose → pipeline fan-out → compose.
pub struct Scheduler {
    store: Store,
    gateway: Arc<Gateway>,
    embedder: Arc<dyn Embedder>,
    verifier: Arc<SourceVerifier>,
    bus: Arc<ProgressBus>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Store,
        gateway: Arc<Gateway>,
        embedder: Arc<dyn Embedder>,
        verifier: Arc<SourceVerifier>,
        bus: Arc<ProgressBus>,
    ) -> Self {
        Self {
            store,
            gateway,
            embedder,
            verifier,
            bus,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run until cancelled, firing once per day at the configured time.
    pub async fn run_forever(&self, cancel: &CancellationToken) {
        loop {
            let now = Utc::now();
            let next = next_activation(now, self.config.run_at);
            let wait = (next - now).to_std().unwrap_or_default();
            debug!(next = %next, "scheduler sleeping until next activation");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    match self.run_due_topics(cancel).await {
                        Ok(reports) => info!(count = reports.len(), "scheduled run finished"),
                        Err(e) => warn!(error = %e, "scheduled run failed"),
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// Pick and process due topics. Each topic fails independently.
    pub async fn run_due_topics(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<TopicRunReport>> {
        let topics = self.store.pick_queued_topics(self.config.posts_per_day)?;
        if topics.is_empty() {
            return Ok(Vec::new());
        }
        info!(count = topics.len(), "scheduler picked queued topics");

        let reports: Vec<Option<TopicRunReport>> = stream::iter(topics)
            .map(|topic| self.run_one(topic, cancel))
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        Ok(reports.into_iter().flatten().collect())
    }

    async fn run_one(
        &self,
        topic: TopicQueueEntry,
        cancel: &CancellationToken,
    ) -> Option<TopicRunReport> {
        // The status transition is the lease; losing it means another
        // worker owns this topic.
        match self.store.lease_topic(&topic.id) {
            Ok(true) => {}
            Ok(false) => {
                debug!(topic_id = %topic.id, "lease lost; skipping topic");
                return None;
            }
            Err(e) => {
                return Some(TopicRunReport {
                    topic_id: topic.id,
                    status: TopicStatus::Failed,
                    error: Some(e.to_string()),
                })
            }
        }

        match self.process_topic(&topic, cancel).await {
            Ok(()) => Some(TopicRunReport {
                topic_id: topic.id,
                status: TopicStatus::Completed,
                error: None,
            }),
            Err(e) => {
                warn!(topic_id = %topic.id, error = %e, "topic failed");
                if let Err(mark_err) = self.store.fail_topic(&topic.id, &e.to_string()) {
                    warn!(topic_id = %topic.id, error = %mark_err, "could not mark topic failed");
                }
                Some(TopicRunReport {
                    topic_id: topic.id,
                    status: TopicStatus::Failed,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    async fn process_topic(
        &self,
        topic: &TopicQueueEntry,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let decomposer = Decomposer::new(self.store.clone(), self.gateway.clone());
        let claims = decomposer
            .decompose(&topic.topic_text, topic.admin_feedback.as_deref(), cancel)
            .await?;
        info!(topic_id = %topic.id, claims = claims.len(), "topic decomposed");

        let mut card_ids = Vec::with_capacity(claims.len());
        for claim in &claims {
            if cancel.is_cancelled() {
                return Err(crate::error::Error::Cancelled);
            }

            // Near-duplicate claims reuse the existing audit
            let embedding = self.embedder.embed(claim).await?;
            let hits =
                self.store
                    .search_by_embedding(&embedding, self.config.dedup_threshold, 1)?;
            if let Some((card, similarity)) = hits.first() {
                debug!(claim = %claim, similarity, "component claim deduplicated");
                card_ids.push(card.id);
                continue;
            }

            let ctx = self.agent_context(format!("topic-{}", topic.id), cancel.child_token());
            let outcome = Pipeline::standard().run(&ctx, claim).await?;
            card_ids.push(outcome.claim_card_id);
        }

        let mut cards = Vec::with_capacity(card_ids.len());
        for id in &card_ids {
            cards.push(self.store.claim_card_by_id(id)?);
        }

        let composer = Composer::new(self.store.clone(), self.gateway.clone());
        let article = composer.compose(&topic.topic_text, &cards, cancel).await?;

        let post = self.store.insert_blog_post(
            &topic.id,
            &article.title,
            &article.article_body,
            &card_ids,
        )?;
        self.store.complete_topic(&topic.id, &card_ids, &post.id)?;
        info!(topic_id = %topic.id, post_id = %post.id, "topic completed, awaiting review");
        Ok(())
    }

    fn agent_context(&self, session_id: String, cancel: CancellationToken) -> AgentContext {
        AgentContext {
            store: self.store.clone(),
            gateway: self.gateway.clone(),
            verifier: self.verifier.clone(),
            embedder: self.embedder.clone(),
            emitter: SessionEmitter::new(self.bus.clone(), session_id),
            cancel,
        }
    }
}

/// Next daily activation at `run_at`, strictly after `now`.
pub fn next_activation(now: DateTime<Utc>, run_at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(run_at).and_utc();
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

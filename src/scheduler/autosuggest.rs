//! Auto-suggest: discovers candidate article topics from web content.
//!
//! Topics, not claims, go into the queue. Discovery deduplicates against
//! existing claim cards at a looser threshold than the scheduler's own
//! component-claim dedup; the divergence is deliberate (a topic overlapping
//! a single cached claim may still be worth a full article).

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::embedding::Embedder;
use crate::error::Result;
use crate::llm::{extract_json, Gateway};
use crate::store::{Store, TopicQueueEntry};
use crate::verify::WebSearch;

/// Default dedup threshold against existing claim cards.
pub const AUTOSUGGEST_DEDUP_THRESHOLD: f32 = 0.85;

/// Configuration for topic discovery.
#[derive(Debug, Clone)]
pub struct AutoSuggestConfig {
    pub dedup_threshold: f32,
    /// Priority assigned to discovered topics
    pub priority: u8,
    /// Cap on topics enqueued per discovery run
    pub max_topics: usize,
}

impl Default for AutoSuggestConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: AUTOSUGGEST_DEDUP_THRESHOLD,
            priority: 5,
            max_topics: 5,
        }
    }
}

/// Discovers and enqueues candidate topics from web search results.
pub struct AutoSuggest {
    store: Store,
    gateway: Arc<Gateway>,
    embedder: Arc<dyn Embedder>,
    web: Arc<dyn WebSearch>,
    config: AutoSuggestConfig,
}

impl AutoSuggest {
    pub fn new(
        store: Store,
        gateway: Arc<Gateway>,
        embedder: Arc<dyn Embedder>,
        web: Arc<dyn WebSearch>,
    ) -> Self {
        Self {
            store,
            gateway,
            embedder,
            web,
            config: AutoSuggestConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AutoSuggestConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one discovery pass for a seed query. Returns the enqueued
    /// topics.
    pub async fn discover(
        &self,
        seed_query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TopicQueueEntry>> {
        let hits = self.web.search(seed_query).await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = self.store.agent_prompt("topic_suggester")?;
        let config = prompt.call_config()?;

        let digest = hits
            .iter()
            .map(|h| format!("- {}: {}", h.title, h.snippet))
            .collect::<Vec<_>>()
            .join("\n");
        let user_prompt = format!(
            "Search results for '{}':\n{}\n\nExtract candidate audit topics.",
            seed_query, digest
        );
        let completion = self
            .gateway
            .complete_prompt(&config, user_prompt, cancel)
            .await?;
        let parsed = extract_json(&completion.text)?;

        let candidates: Vec<String> = parsed["topics"]
            .as_array()
            .map(|topics| {
                topics
                    .iter()
                    .filter_map(|t| t.as_str())
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let mut enqueued = Vec::new();
        for topic in candidates.into_iter().take(self.config.max_topics) {
            let embedding = self.embedder.embed(&topic).await?;
            let covered = self
                .store
                .search_by_embedding(&embedding, self.config.dedup_threshold, 1)?;
            if !covered.is_empty() {
                debug!(topic = %topic, "topic already covered by a claim card; skipping");
                continue;
            }
            let entry = self
                .store
                .enqueue_topic(&topic, self.config.priority, "auto_suggest")?;
            enqueued.push(entry);
        }

        info!(count = enqueued.len(), "auto-suggest enqueued topics");
        Ok(enqueued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::llm::test_support::ScriptedClient;
    use crate::llm::Provider;
    use crate::store::{ClaimCard, ConfidenceLevel, ContentType, Source, Verdict};
    use crate::verify::WebHit;
    use async_trait::async_trait;

    struct FakeWeb;

    #[async_trait]
    impl WebSearch for FakeWeb {
        async fn search(&self, _: &str) -> Result<Vec<WebHit>> {
            Ok(vec![WebHit {
                title: "Popular apologetics claims".into(),
                url: "https://example.org".into(),
                snippet: "flood geology, ark capacity, resurrection evidence".into(),
            }])
        }
    }

    #[tokio::test]
    async fn test_discover_dedups_against_claim_cards() {
        let store = Store::in_memory().unwrap();
        store.install_default_prompts().unwrap();

        // "flood geology evidence" is already covered by a card
        let covered_text = "flood geology evidence";
        let embedding =
            futures::executor::block_on(HashEmbedder::new().embed(covered_text)).unwrap();
        store
            .insert_claim_card(
                &ClaimCard::new(covered_text, Verdict::False, ConfidenceLevel::High)
                    .with_short_answer("This claim is false.")
                    .with_embedding(embedding)
                    .with_source(
                        Source::new("C", "ctx").with_quote("q", ContentType::ExactQuote),
                    ),
            )
            .unwrap();

        let gateway = Arc::new(Gateway::new().with_client(Arc::new(ScriptedClient::new(
            Provider::Anthropic,
            vec![ScriptedClient::text_response(
                r#"{"topics": ["flood geology evidence", "the resurrection appearances"]}"#,
            )],
        ))));

        let suggest = AutoSuggest::new(
            store.clone(),
            gateway,
            Arc::new(HashEmbedder::new()),
            Arc::new(FakeWeb),
        );
        let enqueued = suggest
            .discover("apologetics trends", &CancellationToken::new())
            .await
            .unwrap();

        // The covered topic is skipped; the novel one is enqueued
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].topic_text, "the resurrection appearances");
        assert_eq!(enqueued[0].source, "auto_suggest");
        assert_eq!(store.count_topics().unwrap(), 1);
    }
}

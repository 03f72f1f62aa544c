//! Composer: writes a narrative article from audited component claims.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::llm::{extract_json, Gateway};
use crate::store::{ClaimCard, Store};

/// Article body bounds, in words.
pub const MIN_ARTICLE_WORDS: usize = 500;
pub const MAX_ARTICLE_WORDS: usize = 1500;

/// A composed article awaiting persistence.
#[derive(Debug, Clone)]
pub struct ComposedArticle {
    pub title: String,
    pub article_body: String,
}

/// Synthesizes component claim cards into flowing prose.
pub struct Composer {
    store: Store,
    gateway: Arc<Gateway>,
}

impl Composer {
    pub fn new(store: Store, gateway: Arc<Gateway>) -> Self {
        Self { store, gateway }
    }

    /// Compose the article. The body references component claims through
    /// contextual markers; it is prose, never a rendered list of cards.
    pub async fn compose(
        &self,
        topic_text: &str,
        cards: &[ClaimCard],
        cancel: &CancellationToken,
    ) -> Result<ComposedArticle> {
        if cards.is_empty() {
            return Err(Error::bad_input("cannot compose an article without claims"));
        }

        let prompt = self.store.agent_prompt("composer")?;
        let config = prompt.call_config()?;

        let claims_digest = cards
            .iter()
            .enumerate()
            .map(|(i, card)| {
                format!(
                    "[{}] {} - verdict {}: {}",
                    i + 1,
                    card.claim_text,
                    card.verdict.as_str(),
                    card.short_answer
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let user_prompt = format!(
            "Topic: {}\n\nAudited component claims:\n{}",
            topic_text, claims_digest
        );
        let completion = self
            .gateway
            .complete_prompt(&config, user_prompt, cancel)
            .await?;
        let parsed = extract_json(&completion.text)?;

        let title = parsed["title"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::invalid_output("composer produced no title"))?;
        let article_body = parsed["article_body"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::invalid_output("composer produced no article_body"))?;

        let words = article_body.split_whitespace().count();
        if !(MIN_ARTICLE_WORDS..=MAX_ARTICLE_WORDS).contains(&words) {
            return Err(Error::invalid_output(format!(
                "article body has {} words (wanted {}-{})",
                words, MIN_ARTICLE_WORDS, MAX_ARTICLE_WORDS
            )));
        }

        Ok(ComposedArticle {
            title: title.to_string(),
            article_body: article_body.to_string(),
        })
    }
}

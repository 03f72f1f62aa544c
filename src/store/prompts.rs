//! Hot-editable agent prompt rows.
//!
//! Every agent loads its row at the start of every invocation; nothing in
//! the process caches these beyond a single call. Editing a row changes the
//! next invocation, no restart needed.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::error::{Error, Result};

use super::types::AgentPrompt;
use super::{parse_datetime, Store};

/// Agents that read their configuration from the prompt table.
pub const AGENT_NAMES: &[&str] = &[
    "topic_finder",
    "source_checker",
    "adversarial_checker",
    "writer",
    "publisher",
    "context_analyzer",
    "router",
    "decomposer",
    "composer",
    "source_relevance",
    "source_fallback",
    "topic_suggester",
];

impl Store {
    /// Insert or replace an agent prompt row.
    pub fn upsert_agent_prompt(&self, prompt: &AgentPrompt) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO agent_prompts (
                    agent_name, provider, model, system_prompt, temperature, max_tokens, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(agent_name) DO UPDATE SET
                    provider = excluded.provider,
                    model = excluded.model,
                    system_prompt = excluded.system_prompt,
                    temperature = excluded.temperature,
                    max_tokens = excluded.max_tokens,
                    updated_at = excluded.updated_at",
                params![
                    prompt.agent_name,
                    prompt.provider,
                    prompt.model,
                    prompt.system_prompt,
                    prompt.temperature,
                    prompt.max_tokens as i64,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Read an agent's prompt row. Missing rows are a configuration fault.
    pub fn agent_prompt(&self, agent_name: &str) -> Result<AgentPrompt> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT agent_name, provider, model, system_prompt, temperature, max_tokens,
                        updated_at
                 FROM agent_prompts WHERE agent_name = ?1",
                params![agent_name],
                |row| {
                    Ok(AgentPrompt {
                        agent_name: row.get(0)?,
                        provider: row.get(1)?,
                        model: row.get(2)?,
                        system_prompt: row.get(3)?,
                        temperature: row.get(4)?,
                        max_tokens: row.get::<_, i64>(5)? as u32,
                        updated_at: parse_datetime(row.get::<_, String>(6)?),
                    })
                },
            )
            .optional()
        })?
        .ok_or_else(|| Error::config_missing(agent_name))
    }

    /// Seed default prompt rows for any agent that has none.
    ///
    /// Existing rows are left alone so operator edits survive restarts.
    pub fn install_default_prompts(&self) -> Result<usize> {
        let mut installed = 0;
        for prompt in default_prompts() {
            let exists = self.with_conn(|conn| {
                conn.query_row(
                    "SELECT 1 FROM agent_prompts WHERE agent_name = ?1",
                    params![prompt.agent_name],
                    |_| Ok(()),
                )
                .optional()
            })?;
            if exists.is_none() {
                self.upsert_agent_prompt(&prompt)?;
                installed += 1;
            }
        }
        Ok(installed)
    }
}

/// Built-in prompt defaults for every agent.
pub fn default_prompts() -> Vec<AgentPrompt> {
    let fast = |name: &str| AgentPrompt::new(name, "anthropic", "claude-3-5-haiku-20241022");
    let strong = |name: &str| AgentPrompt::new(name, "anthropic", "claude-3-5-sonnet-20241022");

    vec![
        strong("topic_finder")
            .with_system_prompt(
                "You normalize a user question into a single auditable claim. Respond with a \
                 JSON object: {\"claim_text\", \"claimant\", \"claim_type\", \
                 \"claim_type_category\", \"category_tags\"}. claim_text MUST be an affirmative \
                 declarative statement whose truth can be evaluated, matching the asker's \
                 semantic intent - never the negation of what they are asking about. \
                 claim_type_category is one of HISTORICAL, EPISTEMOLOGY, INTERPRETATION, \
                 THEOLOGICAL, TEXTUAL, or null.",
            )
            .with_temperature(0.1),
        strong("source_checker").with_system_prompt(
            "You enumerate candidate sources for auditing a claim. Respond with a JSON object \
             {\"sources\": [...]}, between 3 and 8 entries. Each entry has \"title\", \
             \"author\", \"domain\" (book | paper | ancient | web), \"source_type\" \
             (PRIMARY_HISTORICAL | SCHOLARLY_PEER_REVIEWED), and \"usage_context\" describing \
             what the source establishes. Never invent URLs; verification happens downstream.",
        ),
        strong("adversarial_checker")
            .with_system_prompt(
                "You evaluate whether the CLAIM is factually accurate given the evidence. The \
                 verdict is about the claim, not about the evidence. Respond with a JSON object \
                 {\"verdict\": TRUE | MISLEADING | FALSE | UNFALSIFIABLE | \
                 DEPENDS_ON_DEFINITIONS, \"reasoning\", \"evidence_concerns\": [...]}. Weigh \
                 re-verification discrepancies against the sources, not against the claim.",
            )
            .with_temperature(0.1),
        strong("writer").with_system_prompt(
            "You write the published audit prose. Respond with a JSON object \
             {\"short_answer\", \"deep_answer\", \"why_persists\": [...], \
             \"confidence_level\": HIGH | MEDIUM | LOW, \"confidence_explanation\"}. \
             short_answer is self-contained and at most 150 words. Do not reference \
             'provided quotes' unless you include a verbatim quote inline.",
        ),
        fast("publisher")
            .with_system_prompt(
                "You compose the audit trail for a finished claim audit. Respond with a JSON \
                 object keyed by agent name; each value has \"summary\" (what was checked), \
                 \"limitations\", and \"change_verdict_if\".",
            )
            .with_temperature(0.1),
        fast("context_analyzer")
            .with_system_prompt(
                "You rewrite a follow-up question so it stands alone, using the recent \
                 dialogue. Distinguish (a) a clarification of an already-discussed claim, \
                 which you resolve into that claim's topic, from (b) an ALTERNATIVE \
                 EXPLANATION, which is a new claim and must be kept as one. Respond with a \
                 JSON object {\"reformulated_question\"}. For a standalone question, return \
                 it unchanged.",
            )
            .with_temperature(0.0)
            .with_max_tokens(512),
        strong("router")
            .with_system_prompt(
                "You decide how to answer a question about a factual claim. ALWAYS call \
                 search_existing_claims first. If one candidate clearly restates the question's \
                 claim (similarity at or above 0.92 and the same claim type), answer \
                 EXACT_MATCH with that claim id. If cached claims cover the topic but not the \
                 exact claim, call get_claim_details as needed and compose a synthesis, then \
                 answer CONTEXTUAL. Otherwise call generate_new_claim with an affirmative \
                 claim text and answer NOVEL_CLAIM. Finish with a JSON object {\"mode\", \
                 \"claim_id\", \"referenced_claim_ids\", \"synthesized_response\", \
                 \"reasoning\"}.",
            )
            .with_temperature(0.0),
        strong("decomposer").with_system_prompt(
            "You break an article topic into component claims. Respond with a JSON object \
             {\"claims\": [...]}, each entry an affirmative, independently auditable claim \
             statement. Choose between 3 and 12 claims according to the topic's complexity; \
             order them as the article should address them.",
        ),
        strong("composer")
            .with_system_prompt(
                "You write a narrative article from audited component claims. Respond with a \
                 JSON object {\"title\", \"article_body\"}. The body is 500-1500 words of \
                 flowing prose that references component claims with contextual markers like \
                 [1], [2] where they support the narrative. Never render the claims as a list.",
            )
            .with_max_tokens(8192),
        fast("source_relevance")
            .with_system_prompt(
                "You judge whether a previously verified source is relevant to a new claim, \
                 and if so supply a fresh paraphrase suited to this claim. Respond with a JSON \
                 object {\"relevant\": true | false, \"quote_text\", \"usage_context\"}. Never \
                 reuse wording from prior audits.",
            )
            .with_temperature(0.1),
        fast("source_fallback").with_system_prompt(
            "You supply a citation from memory when no external catalog verified a source. \
             Respond with a JSON object {\"citation\", \"quote_text\", \"usage_context\", \
             \"source_type\"}. Leave no URL field at all; unverified sources carry no URL.",
        ),
        fast("topic_suggester").with_system_prompt(
            "You extract candidate audit topics from web search results. Respond with a JSON \
             object {\"topics\": [...]}, each a short topic phrase suitable for a full \
             article, not a single claim.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_agent() {
        let prompts = default_prompts();
        for name in AGENT_NAMES {
            assert!(
                prompts.iter().any(|p| p.agent_name == *name),
                "no default prompt for {}",
                name
            );
        }
    }

    #[test]
    fn test_install_is_idempotent_and_preserves_edits() {
        let store = Store::in_memory().unwrap();
        let installed = store.install_default_prompts().unwrap();
        assert_eq!(installed, AGENT_NAMES.len());

        // Operator edit
        let mut edited = store.agent_prompt("router").unwrap();
        edited.system_prompt = "custom routing policy".into();
        store.upsert_agent_prompt(&edited).unwrap();

        // Re-seeding installs nothing and keeps the edit
        assert_eq!(store.install_default_prompts().unwrap(), 0);
        assert_eq!(
            store.agent_prompt("router").unwrap().system_prompt,
            "custom routing policy"
        );
    }

    #[test]
    fn test_missing_prompt_is_config_error() {
        let store = Store::in_memory().unwrap();
        let err = store.agent_prompt("topic_finder").unwrap_err();
        assert!(matches!(err, Error::ConfigMissing { .. }));
    }

    #[test]
    fn test_upsert_replaces() {
        let store = Store::in_memory().unwrap();
        let prompt = AgentPrompt::new("writer", "anthropic", "model-a");
        store.upsert_agent_prompt(&prompt).unwrap();

        let replacement = AgentPrompt::new("writer", "openai", "model-b").with_temperature(0.7);
        store.upsert_agent_prompt(&replacement).unwrap();

        let fetched = store.agent_prompt("writer").unwrap();
        assert_eq!(fetched.provider, "openai");
        assert_eq!(fetched.model, "model-b");
        assert_eq!(fetched.temperature, 0.7);
    }
}

//! Topic finder: normalizes a question into an auditable affirmative claim.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::store::ClaimCategory;

use super::{input_str, require_inputs, AgentContext, PipelineAgent, StageInputs};

/// First pipeline stage. Turns the (possibly reformulated) question into
/// `{claim_text, claimant?, claim_type, claim_type_category, category_tags}`.
///
/// `claim_text` must be an affirmative statement matching the asker's
/// semantic intent - "How similar are Luke and Mark?" becomes "Luke used
/// Mark as a source", never "Luke is independent of Mark".
pub struct TopicFinder;

#[async_trait]
impl PipelineAgent for TopicFinder {
    fn name(&self) -> &'static str {
        "topic_finder"
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &["question"]
    }

    async fn execute(&self, ctx: &AgentContext, inputs: &StageInputs) -> Result<Value> {
        require_inputs(self.name(), inputs, self.required_inputs())?;
        let question = input_str(self.name(), inputs, "question")?;

        let prompt = ctx.load_prompt(self.name())?;
        let config = prompt.call_config()?;

        let user_prompt = format!("Question to normalize into an auditable claim:\n{}", question);
        let parsed = ctx.complete_json(&config, user_prompt).await?;

        let claim_text = parsed["claim_text"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::invalid_output("topic finder produced no claim_text"))?;

        // The category gates router behavior later; accept only the known
        // values or null.
        let category = match parsed["claim_type_category"].as_str() {
            Some(raw) => Some(ClaimCategory::parse(raw).ok_or_else(|| {
                Error::invalid_output(format!("unknown claim_type_category '{}'", raw))
            })?),
            None => None,
        };

        let category_tags: Vec<String> = parsed["category_tags"]
            .as_array()
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "claim_text": claim_text,
            "claimant": parsed["claimant"].as_str(),
            "claim_type": parsed["claim_type"].as_str().unwrap_or(""),
            "claim_type_category": category.map(|c| c.as_str()),
            "category_tags": category_tags,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::{json as scripted_json, scripted_context};
    use serde_json::json;

    fn question_inputs(q: &str) -> StageInputs {
        let mut inputs = StageInputs::new();
        inputs.insert("question".into(), json!(q));
        inputs
    }

    #[tokio::test]
    async fn test_normalizes_question_to_affirmative_claim() {
        let ctx = scripted_context(vec![scripted_json(
            r#"{"claim_text": "Luke used Mark as a source", "claimant": null,
                "claim_type": "literary dependence", "claim_type_category": "TEXTUAL",
                "category_tags": ["synoptic problem"]}"#,
        )]);

        let output = TopicFinder
            .execute(&ctx, &question_inputs("How similar are Luke and Mark?"))
            .await
            .unwrap();

        assert_eq!(output["claim_text"], "Luke used Mark as a source");
        assert_eq!(output["claim_type_category"], "TEXTUAL");
        assert_eq!(output["category_tags"][0], "synoptic problem");
    }

    #[tokio::test]
    async fn test_missing_question_is_bad_input() {
        let ctx = scripted_context(vec![]);
        let err = TopicFinder
            .execute(&ctx, &StageInputs::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadInput(_)));
    }

    #[tokio::test]
    async fn test_empty_claim_text_is_invalid_output() {
        let ctx = scripted_context(vec![scripted_json(r#"{"claim_text": "  "}"#)]);
        let err = TopicFinder
            .execute(&ctx, &question_inputs("Did the flood happen?"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOutput(_)));
    }

    #[tokio::test]
    async fn test_unknown_category_is_invalid_output() {
        let ctx = scripted_context(vec![scripted_json(
            r#"{"claim_text": "a claim", "claim_type_category": "PHILOSOPHY"}"#,
        )]);
        let err = TopicFinder
            .execute(&ctx, &question_inputs("q"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOutput(_)));
    }

    #[tokio::test]
    async fn test_missing_prompt_row_is_config_error() {
        let store = crate::store::Store::in_memory().unwrap();
        // No prompts installed
        let ctx = crate::agent::test_support::scripted_context_with_store(store, vec![]);
        let err = TopicFinder
            .execute(&ctx, &question_inputs("q"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfigMissing { .. }));
    }
}

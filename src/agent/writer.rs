//! Writer: produces the published prose for the audit.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::store::ConfidenceLevel;

use super::{input_str, require_inputs, word_count, AgentContext, PipelineAgent, StageInputs};

/// Upper bound on the short answer, in words.
pub const SHORT_ANSWER_MAX_WORDS: usize = 150;

/// Fourth pipeline stage. Writes `short_answer` (at most 150 words,
/// self-contained), `deep_answer`, `why_persists`, and the confidence
/// fields. The prompt forbids referencing "provided quotes" unless a
/// verbatim quote appears inline; an over-length short answer fails the
/// stage rather than being silently truncated.
pub struct Writer;

#[async_trait]
impl PipelineAgent for Writer {
    fn name(&self) -> &'static str {
        "writer"
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &["claim_text", "sources", "preliminary_verdict"]
    }

    async fn execute(&self, ctx: &AgentContext, inputs: &StageInputs) -> Result<Value> {
        require_inputs(self.name(), inputs, self.required_inputs())?;
        let claim_text = input_str(self.name(), inputs, "claim_text")?;
        let verdict = input_str(self.name(), inputs, "preliminary_verdict")?;

        let prompt = ctx.load_prompt(self.name())?;
        let config = prompt.call_config()?;

        let notes = inputs
            .get("reverification_notes")
            .and_then(|v| v.as_array())
            .map(|notes| {
                notes
                    .iter()
                    .filter_map(|n| n.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        let user_prompt = format!(
            "Claim: {}\nVerdict: {}\nSources (JSON):\n{}\nRe-verification notes:\n{}",
            claim_text,
            verdict,
            inputs["sources"],
            if notes.is_empty() { "none" } else { &notes },
        );
        let parsed = ctx.complete_json(&config, user_prompt).await?;

        let short_answer = parsed["short_answer"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::invalid_output("writer produced no short_answer"))?;
        if word_count(short_answer) > SHORT_ANSWER_MAX_WORDS {
            return Err(Error::invalid_output(format!(
                "short_answer has {} words (limit {})",
                word_count(short_answer),
                SHORT_ANSWER_MAX_WORDS
            )));
        }

        check_verdict_consistency(short_answer, verdict)?;

        let confidence = parsed["confidence_level"]
            .as_str()
            .and_then(ConfidenceLevel::parse)
            .ok_or_else(|| Error::invalid_output("writer produced no usable confidence_level"))?;

        let why_persists: Vec<String> = parsed["why_persists"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "short_answer": short_answer,
            "deep_answer": parsed["deep_answer"].as_str().unwrap_or(""),
            "why_persists": why_persists,
            "confidence_level": confidence.as_str(),
            "confidence_explanation": parsed["confidence_explanation"].as_str().unwrap_or(""),
        }))
    }
}

/// The prose must agree with the verdict: an opening "this claim is true"
/// requires a TRUE verdict, and a "this claim is false" statement requires
/// FALSE or MISLEADING.
fn check_verdict_consistency(short_answer: &str, verdict: &str) -> Result<()> {
    let Some(verdict) = crate::store::Verdict::parse(verdict) else {
        return Err(Error::bad_input(format!("unknown verdict '{}'", verdict)));
    };
    let lower = short_answer.to_lowercase();

    if lower.starts_with("this claim is true") && verdict != crate::store::Verdict::True {
        return Err(Error::invalid_output(format!(
            "short_answer asserts the claim is true but the verdict is {}",
            verdict
        )));
    }
    if lower.contains("this claim is false")
        && !matches!(
            verdict,
            crate::store::Verdict::False | crate::store::Verdict::Misleading
        )
    {
        return Err(Error::invalid_output(format!(
            "short_answer asserts the claim is false but the verdict is {}",
            verdict
        )));
    }
    Ok(())
}

//! Adversarial checker: re-verifies the evidence and renders a preliminary
//! verdict on the claim.
//!
//! The contract is explicit: the verdict is about the CLAIM given the
//! evidence, not about the evidence. A source whose quote fails re-check is
//! flagged in the audit trail, never a reason to abort the pipeline.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{Error, Result};
use crate::store::{Source, Verdict};
use crate::verify::VerifiedRecord;

use super::{input_str, require_inputs, AgentContext, PipelineAgent, StageInputs};

pub struct AdversarialChecker;

#[async_trait]
impl PipelineAgent for AdversarialChecker {
    fn name(&self) -> &'static str {
        "adversarial_checker"
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &["claim_text", "sources"]
    }

    async fn execute(&self, ctx: &AgentContext, inputs: &StageInputs) -> Result<Value> {
        require_inputs(self.name(), inputs, self.required_inputs())?;
        let claim_text = input_str(self.name(), inputs, "claim_text")?;

        let records: Vec<VerifiedRecord> =
            serde_json::from_value(inputs["sources"].clone())
                .map_err(|e| Error::bad_input(format!("malformed sources input: {}", e)))?;

        // Independent re-verification of every source. Discrepancies are
        // annotations for the audit trail, not failures.
        let mut reverification_notes: Vec<String> = Vec::new();
        for record in &records {
            if ctx.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let source: Source = record.clone().into_source();
            match ctx.verifier.reverify_source(&source, claim_text).await {
                Ok(outcome) => {
                    for note in &outcome.notes {
                        reverification_notes.push(format!("{}: {}", record.citation, note));
                    }
                    if outcome.has_discrepancy() {
                        reverification_notes.push(format!(
                            "{}: flagged as discrepant during re-verification",
                            record.citation
                        ));
                    }
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(citation = %record.citation, error = %e, "re-verification errored");
                    reverification_notes
                        .push(format!("{}: re-verification errored ({})", record.citation, e));
                }
            }
        }

        let prompt = ctx.load_prompt(self.name())?;
        let config = prompt.call_config()?;

        let sources_digest = records
            .iter()
            .map(|r| {
                format!(
                    "- {} [{} / {}]: {}",
                    r.citation,
                    r.verification_status.as_str(),
                    r.content_type.as_str(),
                    if r.quote_text.is_empty() { "(no quote)" } else { &r.quote_text }
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let notes_digest = if reverification_notes.is_empty() {
            "none".to_string()
        } else {
            reverification_notes.join("\n")
        };

        let user_prompt = format!(
            "Claim under audit:\n{}\n\nEvidence:\n{}\n\nRe-verification findings:\n{}",
            claim_text, sources_digest, notes_digest
        );
        let parsed = ctx.complete_json(&config, user_prompt).await?;

        let verdict = parsed["verdict"]
            .as_str()
            .and_then(Verdict::parse)
            .ok_or_else(|| {
                Error::invalid_output(format!(
                    "adversarial checker produced no usable verdict: {}",
                    parsed["verdict"]
                ))
            })?;

        Ok(json!({
            "preliminary_verdict": verdict.as_str(),
            "adversarial_reasoning": parsed["reasoning"].as_str().unwrap_or(""),
            "evidence_concerns": parsed["evidence_concerns"].as_array().cloned().unwrap_or_default(),
            "reverification_notes": reverification_notes,
        }))
    }
}

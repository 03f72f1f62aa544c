//! Publisher: composes the audit trail, persists the claim card, and
//! announces it on the progress bus.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::progress::ProgressEvent;
use crate::store::{ClaimCard, ClaimCategory, ConfidenceLevel, Verdict};
use crate::verify::VerifiedRecord;

use super::{input_str, require_inputs, AgentContext, PipelineAgent, StageInputs};

/// Final pipeline stage. Builds `agent_audit` (per-agent what-was-checked
/// summary, limitations, and change-verdict-if notes), embeds the claim
/// text, persists the card through the store, and emits `claim_card_ready`.
pub struct Publisher;

#[async_trait]
impl PipelineAgent for Publisher {
    fn name(&self) -> &'static str {
        "publisher"
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &[
            "claim_text",
            "sources",
            "preliminary_verdict",
            "short_answer",
            "confidence_level",
        ]
    }

    async fn execute(&self, ctx: &AgentContext, inputs: &StageInputs) -> Result<Value> {
        require_inputs(self.name(), inputs, self.required_inputs())?;
        let claim_text = input_str(self.name(), inputs, "claim_text")?;

        let verdict_raw = input_str(self.name(), inputs, "preliminary_verdict")?;
        let verdict = Verdict::parse(verdict_raw)
            .ok_or_else(|| Error::bad_input(format!("unknown verdict '{}'", verdict_raw)))?;
        let confidence_raw = input_str(self.name(), inputs, "confidence_level")?;
        let confidence = ConfidenceLevel::parse(confidence_raw)
            .ok_or_else(|| Error::bad_input(format!("unknown confidence '{}'", confidence_raw)))?;

        let records: Vec<VerifiedRecord> = serde_json::from_value(inputs["sources"].clone())
            .map_err(|e| Error::bad_input(format!("malformed sources input: {}", e)))?;
        if records.is_empty() {
            return Err(Error::bad_input("cannot publish a card with no sources"));
        }

        let prompt = ctx.load_prompt(self.name())?;
        let config = prompt.call_config()?;

        let user_prompt = format!(
            "Compose the audit trail for this finished claim audit.\n\nClaim: {}\nVerdict: {}\n\
             Sources: {}\nAdversarial reasoning: {}\nWriter short answer: {}",
            claim_text,
            verdict.as_str(),
            inputs["sources"],
            inputs.get("adversarial_reasoning").and_then(|v| v.as_str()).unwrap_or(""),
            inputs["short_answer"],
        );
        let mut agent_audit = ctx.complete_json(&config, user_prompt).await?;

        // The re-verification notes are recorded verbatim in the trail,
        // whatever the audit summary says about them.
        if let Some(notes) = inputs.get("reverification_notes") {
            attach_reverification_notes(&mut agent_audit, notes);
        }

        let embedding = ctx.embedder.embed(claim_text).await?;

        let mut card = ClaimCard::new(claim_text, verdict, confidence)
            .with_short_answer(input_str(self.name(), inputs, "short_answer")?)
            .with_deep_answer(
                inputs.get("deep_answer").and_then(|v| v.as_str()).unwrap_or(""),
            )
            .with_claim_type(
                inputs.get("claim_type").and_then(|v| v.as_str()).unwrap_or(""),
            )
            .with_confidence_explanation(
                inputs
                    .get("confidence_explanation")
                    .and_then(|v| v.as_str())
                    .unwrap_or(""),
            )
            .with_why_persists(string_vec(inputs.get("why_persists")))
            .with_tags(Vec::new(), string_vec(inputs.get("category_tags")))
            .with_agent_audit(agent_audit)
            .with_embedding(embedding);

        if let Some(category) = inputs
            .get("claim_type_category")
            .and_then(|v| v.as_str())
            .and_then(ClaimCategory::parse)
        {
            card = card.with_category(category);
        }
        if let Some(claimant) = inputs.get("claimant").and_then(|v| v.as_str()) {
            card = card.with_claimant(claimant);
        }
        for record in records {
            card = card.with_source(record.into_source());
        }

        ctx.store.insert_claim_card(&card)?;

        let serialized = serde_json::to_value(&card)?;
        ctx.emitter
            .emit(ProgressEvent::claim_card_ready(serialized.clone()));

        Ok(json!({
            "claim_card_id": card.id.to_string(),
            "claim_card": serialized,
        }))
    }
}

fn attach_reverification_notes(agent_audit: &mut Value, notes: &Value) {
    if !agent_audit.is_object() {
        *agent_audit = Value::Object(Map::new());
    }
    let audit = agent_audit.as_object_mut().expect("audit is an object");
    let entry = audit
        .entry("adversarial_checker".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    entry
        .as_object_mut()
        .expect("entry is an object")
        .insert("reverification_notes".to_string(), notes.clone());
}

fn string_vec(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

//! Source checker: enumerates candidate sources and routes each through
//! the tiered verification walk.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::SourceType;
use crate::verify::{SourceDomain, SourceRequest};

use super::{input_str, require_inputs, AgentContext, PipelineAgent, StageInputs};

/// Candidate sources the LLM may propose per claim.
const MAX_CANDIDATES: usize = 8;

/// Second pipeline stage. The LLM proposes 3-8 candidate sources; every
/// candidate goes through the verification tiers, and the stage emits the
/// full verification metadata per source. URLs come only from verification,
/// never from the proposing model.
pub struct SourceChecker;

#[async_trait]
impl PipelineAgent for SourceChecker {
    fn name(&self) -> &'static str {
        "source_checker"
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &["claim_text"]
    }

    async fn execute(&self, ctx: &AgentContext, inputs: &StageInputs) -> Result<Value> {
        require_inputs(self.name(), inputs, self.required_inputs())?;
        let claim_text = input_str(self.name(), inputs, "claim_text")?;

        let prompt = ctx.load_prompt(self.name())?;
        let config = prompt.call_config()?;

        let user_prompt = format!("Claim to source:\n{}", claim_text);
        let parsed = ctx.complete_json(&config, user_prompt).await?;

        let candidates = parsed["sources"]
            .as_array()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::invalid_output("source checker produced no candidates"))?;

        let mut verified = Vec::new();
        for candidate in candidates.iter().take(MAX_CANDIDATES) {
            if ctx.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let request = candidate_to_request(claim_text, candidate)?;
            debug!(title = %request.title, domain = ?request.domain, "verifying candidate source");
            let record = ctx.verifier.verify(&request, &ctx.cancel).await?;
            verified.push(serde_json::to_value(record)?);
        }

        Ok(json!({ "sources": verified }))
    }
}

fn candidate_to_request(claim_text: &str, candidate: &Value) -> Result<SourceRequest> {
    let title = candidate["title"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::invalid_output("candidate source has no title"))?;
    let usage_context = candidate["usage_context"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            Error::invalid_output(format!("candidate source '{}' has no usage_context", title))
        })?;

    let domain = candidate["domain"]
        .as_str()
        .and_then(SourceDomain::parse)
        .unwrap_or(SourceDomain::Book);
    let source_type = candidate["source_type"]
        .as_str()
        .and_then(SourceType::parse)
        .unwrap_or(SourceType::ScholarlyPeerReviewed);

    let mut request = SourceRequest::new(
        title,
        candidate["author"].as_str().unwrap_or(""),
        domain,
        claim_text,
        usage_context,
    );
    request.source_type = source_type;
    request.identifier = candidate["identifier"].as_str().map(|s| s.to_string());
    Ok(request)
}

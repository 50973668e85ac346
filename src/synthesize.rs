//! The structured-field synthesizer and its fallback chain.
//!
//! Three tiers, strict priority order:
//!
//! 1. Parsed LLM output, merged key by key over the fallback text.
//! 2. Heuristic template text derived from the OCR text.
//! 3. The fixed canonical description, when there is no text at all.
//!
//! Everything that can go wrong with the LLM (no credential, timeout,
//! transport failure, unusable JSON) is absorbed here and converted into
//! tier 2/3 output plus a diagnostic string. Nothing propagates to the
//! caller, and no field is ever empty.

use std::time::Duration;

use schemars::JsonSchema;

use crate::{
    fields::{self, EvidenceFields, RubricMatch},
    llm::{ChatDriver, ChatJsonRequest, LlmBackend, LlmOpts},
    prelude::*,
    prompt::{PromptBindings, render_synthesis_prompt},
    recover::{self, JsonObject, LenientParse},
};

/// Which strategy ultimately produced the card fields.
#[derive(Clone, Copy, Debug, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisTier {
    /// Parsed LLM output (possibly with per-field fallbacks mixed in).
    Llm,

    /// Template text derived from the OCR text.
    Heuristic,

    /// The fixed canonical description.
    Canonical,
}

/// The synthesizer's output. All fields are populated, always.
#[derive(Clone, Debug, JsonSchema, Serialize)]
pub struct Synthesis {
    /// The card description fields.
    pub fields: EvidenceFields,

    /// Official rubric categories this evidence supports. At most two.
    pub rubric: Vec<RubricMatch>,

    /// Which tier produced `fields`.
    pub tier: SynthesisTier,

    /// Operator-facing diagnostics. Never surfaced as field values.
    pub diagnostics: Vec<String>,
}

/// Caller-provided context for the prompt.
#[derive(Clone, Debug, Default)]
pub struct SynthesisHints {
    /// Teacher name.
    pub teacher: String,

    /// Subject taught.
    pub subject: String,

    /// School name.
    pub school: String,

    /// Program name override.
    pub program_name: Option<String>,

    /// Program description hint.
    pub program_description: Option<String>,
}

/// Produces evidence-card fields from cleaned OCR text.
#[derive(Debug)]
pub struct Synthesizer {
    backend: LlmBackend,
}

impl Synthesizer {
    /// Create a synthesizer over an explicit backend.
    pub fn new(backend: LlmBackend) -> Self {
        Self { backend }
    }

    /// Synthesize card fields from cleaned OCR text.
    ///
    /// Infallible by design: every failure downgrades to the next fallback
    /// tier instead of erroring.
    #[instrument(level = "debug", skip_all)]
    pub async fn synthesize(&self, cleaned_text: &str, hints: &SynthesisHints) -> Synthesis {
        let mut diagnostics = Vec::new();
        let (fallback_fields, fallback_tier) = if cleaned_text.trim().is_empty() {
            (fields::canonical_fields(), SynthesisTier::Canonical)
        } else {
            (fields::heuristic_fields(cleaned_text), SynthesisTier::Heuristic)
        };

        // `Disabled` has no driver at all, so "no credential, no network
        // call" is enforced by construction.
        let (driver, opts) = match &self.backend {
            LlmBackend::Enabled { driver, opts } => (driver.clone(), opts),
            LlmBackend::Disabled => {
                debug!("LLM backend disabled; using fallback text");
                diagnostics
                    .push("LLM synthesis disabled: no credential configured".to_owned());
                return Synthesis {
                    fields: fallback_fields,
                    rubric: vec![],
                    tier: fallback_tier,
                    diagnostics,
                };
            }
        };

        let object = match call_llm(driver.as_ref(), opts, cleaned_text, hints).await {
            Ok(LenientParse::Strict(object)) => object,
            Ok(LenientParse::Recovered(object)) => {
                diagnostics
                    .push("LLM response had prose around the JSON payload".to_owned());
                object
            }
            Ok(LenientParse::Malformed {
                strict_error,
                recovery_error,
            }) => {
                warn!(%strict_error, ?recovery_error, "LLM returned unusable JSON");
                diagnostics.push(format!("LLM response was not a JSON object: {strict_error}"));
                return Synthesis {
                    fields: fallback_fields,
                    rubric: vec![],
                    tier: fallback_tier,
                    diagnostics,
                };
            }
            Err(err) => {
                warn!(error = ?err, "LLM call failed; using fallback text");
                diagnostics.push(format!("LLM call failed: {err:#}"));
                return Synthesis {
                    fields: fallback_fields,
                    rubric: vec![],
                    tier: fallback_tier,
                    diagnostics,
                };
            }
        };

        let merged = EvidenceFields::merge_llm(&object, &fallback_fields);
        let rubric = fields::filter_rubric(parse_rubric(&object, &mut diagnostics));
        Synthesis {
            fields: merged,
            rubric,
            tier: SynthesisTier::Llm,
            diagnostics,
        }
    }
}

/// Render the prompt, run the driver, and parse the content leniently.
async fn call_llm(
    driver: &dyn ChatDriver,
    opts: &LlmOpts,
    cleaned_text: &str,
    hints: &SynthesisHints,
) -> Result<LenientParse> {
    let bindings = PromptBindings {
        teacher: &hints.teacher,
        subject: &hints.subject,
        school: &hints.school,
        program_name: hints.program_name.as_deref(),
        program_description: hints.program_description.as_deref(),
        ocr_text: cleaned_text,
        categories: &fields::RUBRIC_CATEGORIES,
    };
    let (system, user) = render_synthesis_prompt(&bindings)?;
    let req = ChatJsonRequest {
        model: opts.model.clone(),
        temperature: opts.temperature,
        system,
        user,
    };
    let content = driver
        .chat_json(&req, Duration::from_secs(opts.timeout))
        .await?;
    Ok(recover::parse_object(&content))
}

/// Pull the `rubric` array out of the LLM object, tolerating shape drift.
fn parse_rubric(object: &JsonObject, diagnostics: &mut Vec<String>) -> Vec<RubricMatch> {
    let Some(value) = object.get("rubric") else {
        return vec![];
    };
    match serde_json::from_value::<Vec<RubricMatch>>(value.clone()) {
        Ok(matches) => matches,
        Err(err) => {
            diagnostics.push(format!("ignoring malformed rubric list: {err}"));
            vec![]
        }
    }
}

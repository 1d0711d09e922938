//! Named, versioned [`PipelineSpec`] templates shipped with the engine, and
//! the overlay-merge logic a loader uses to apply user overrides on top of
//! one.
//!
//! Merging is keyed by [`GuardrailSpec::name`]: an overlay entry whose name
//! matches a preset entry replaces it wholesale; an overlay entry with a new
//! name is appended; any preset entry absent from the overlay is carried
//! through unchanged.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::guardrail::spec::{Action, GuardrailSpec, OnError, PipelineSpec, Stage};

fn guardrail(name: &str, kind: &str, stage: Stage, action: Action, config: serde_json::Value) -> GuardrailSpec {
    GuardrailSpec {
        name: name.to_string(),
        kind: kind.to_string(),
        enabled: true,
        stage,
        action,
        confidence_threshold: 0.8,
        on_error: OnError::Block,
        timeout_ms: 1000,
        config,
    }
}

fn base(preset: &str, input: Vec<GuardrailSpec>, output: Vec<GuardrailSpec>) -> PipelineSpec {
    PipelineSpec {
        version: "1.0".to_string(),
        preset: Some(preset.to_string()),
        input,
        output,
        order_by_performance_class: false,
        pipeline_deadline_ms: Some(5_000),
    }
}

/// General-purpose defaults: PII on input, unsafe code generation on output.
/// The starting point for a new deployment with no domain-specific needs.
#[must_use]
pub fn basic() -> PipelineSpec {
    base(
        "basic",
        vec![guardrail(
            "pii_check",
            "simple_pii_detection",
            Stage::Input,
            Action::Block,
            serde_json::json!({"config": {"patterns": ["ssn", "credit_card", "email", "phone"]}}),
        )],
        vec![guardrail(
            "code_check",
            "simple_code_generation",
            Stage::Output,
            Action::Block,
            serde_json::json!({}),
        )],
    )
}

/// Support-desk deployments: adds toxicity and keyword blocking on input and
/// a rate limit, since abusive users tend to retry rather than stop.
#[must_use]
pub fn customer_service() -> PipelineSpec {
    base(
        "customer_service",
        vec![
            guardrail(
                "pii_check",
                "simple_pii_detection",
                Stage::Input,
                Action::Block,
                serde_json::json!({"config": {"patterns": ["ssn", "credit_card", "email", "phone"]}}),
            ),
            guardrail(
                "toxicity_check",
                "simple_toxicity_detection",
                Stage::Input,
                Action::Warn,
                serde_json::json!({}),
            ),
            guardrail(
                "rate_limit_check",
                "rate_limit",
                Stage::Input,
                Action::Block,
                serde_json::json!({}),
            ),
        ],
        vec![guardrail(
            "code_check",
            "simple_code_generation",
            Stage::Output,
            Action::Block,
            serde_json::json!({}),
        )],
    )
}

/// Clinical deployments: strict PII enforcement (no warn tier), topic
/// filtering away from diagnosis/prescription language the application
/// isn't licensed to produce.
#[must_use]
pub fn medical() -> PipelineSpec {
    base(
        "medical",
        vec![
            guardrail(
                "pii_check",
                "simple_pii_detection",
                Stage::Both,
                Action::Block,
                serde_json::json!({"config": {"patterns": ["ssn", "credit_card", "email", "phone", "iban"]}}),
            ),
            guardrail(
                "topic_check",
                "topic_filter",
                Stage::Output,
                Action::Block,
                serde_json::json!({"config": {
                    "mode": "deny",
                    "topics": [{"label": "diagnosis", "keywords": ["you have", "you are diagnosed with", "i diagnose"]}]
                }}),
            ),
        ],
        vec![],
    )
}

/// Financial-services deployments: PII plus compound scoring combining
/// multiple low-confidence signals, since individual weak signals in this
/// domain are rarely worth blocking alone.
#[must_use]
pub fn financial() -> PipelineSpec {
    base(
        "financial",
        vec![
            guardrail(
                "pii_check",
                "simple_pii_detection",
                Stage::Input,
                Action::Block,
                serde_json::json!({"config": {"patterns": ["ssn", "credit_card", "iban"]}}),
            ),
            guardrail(
                "compound_check",
                "compound_scoring",
                Stage::Input,
                Action::Block,
                serde_json::json!({}),
            ),
        ],
        vec![],
    )
}

/// Education deployments: keeps the output pipeline loose (tutoring wants
/// code examples), leans on keyword blocking for academic-integrity terms.
#[must_use]
pub fn educational() -> PipelineSpec {
    base(
        "educational",
        vec![guardrail(
            "integrity_check",
            "keyword_block",
            Stage::Input,
            Action::Warn,
            serde_json::json!({"config": {"keywords": ["write my essay for me", "do my homework"]}}),
        )],
        vec![],
    )
}

/// Look up a bundled preset by name.
///
/// # Errors
///
/// Returns [`ConfigError::Semantic`] if `name` does not match a bundled preset.
pub fn by_name(name: &str) -> Result<PipelineSpec, ConfigError> {
    match name {
        "basic" => Ok(basic()),
        "customer_service" => Ok(customer_service()),
        "medical" => Ok(medical()),
        "financial" => Ok(financial()),
        "educational" => Ok(educational()),
        other => Err(ConfigError::Semantic {
            message: format!("unknown preset '{other}'"),
        }),
    }
}

/// A partial set of overrides applied on top of a preset.
///
/// Every field is optional; an absent field leaves the preset's value
/// untouched. Guardrail overrides are matched by [`GuardrailSpec::name`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOverlay {
    /// Guardrails to add to, or replace wholesale within, the input pipeline.
    #[serde(default)]
    pub input: Vec<GuardrailSpec>,
    /// Guardrails to add to, or replace wholesale within, the output pipeline.
    #[serde(default)]
    pub output: Vec<GuardrailSpec>,
    /// Overrides the preset's ordering flag, if present.
    #[serde(default)]
    pub order_by_performance_class: Option<bool>,
    /// Overrides the preset's pipeline deadline, if present. `Some(None)`
    /// explicitly clears a preset-declared deadline.
    #[serde(default)]
    pub pipeline_deadline_ms: Option<Option<u64>>,
}

/// Merge `overlay` onto `preset`, producing the resulting [`PipelineSpec`].
///
/// Any guardrail present in `preset` but absent (by name) from `overlay`
/// retains the preset's settings exactly.
#[must_use]
pub fn merge(preset: &PipelineSpec, overlay: &PipelineOverlay) -> PipelineSpec {
    PipelineSpec {
        version: preset.version.clone(),
        preset: preset.preset.clone(),
        input: merge_list(&preset.input, &overlay.input),
        output: merge_list(&preset.output, &overlay.output),
        order_by_performance_class: overlay.order_by_performance_class.unwrap_or(preset.order_by_performance_class),
        pipeline_deadline_ms: overlay.pipeline_deadline_ms.unwrap_or(preset.pipeline_deadline_ms),
    }
}

fn merge_list(base: &[GuardrailSpec], overrides: &[GuardrailSpec]) -> Vec<GuardrailSpec> {
    let mut merged: Vec<GuardrailSpec> = base.to_vec();
    for overlay_spec in overrides {
        if let Some(existing) = merged.iter_mut().find(|g| g.name == overlay_spec.name) {
            *existing = overlay_spec.clone();
        } else {
            merged.push(overlay_spec.clone());
        }
    }
    merged
}

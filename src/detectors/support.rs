//! Shared helpers for reading a [`GuardrailSpec::config`] value.
//!
//! Every bundled detector's configuration is read the same way: look for a
//! nested `config` sub-map first (the documented shape), then fall back to
//! treating the value itself as the map (flat back-compat).

use serde_json::Value;

use crate::guardrail::result::{GuardrailResult, RiskLevel};
use crate::guardrail::GuardrailError;
use crate::pipeline::outcome::{StageError, StageOutcome};

/// Adapt a [`StageOutcome`] from a [`GuardrailStage`](crate::pipeline::stage::GuardrailStage)
/// into the flatter [`GuardrailResult`] shape the new engine expects.
///
/// `Transform` and `Escalate` outcomes have no `Guardrail`-shaped
/// equivalent yet; both are reported as non-blocking with the outcome kind
/// recorded in `details` so they remain visible in audit trails.
#[must_use]
pub fn result_from_stage_outcome(name: &str, kind: &str, outcome: StageOutcome) -> GuardrailResult {
    match outcome {
        StageOutcome::Allow { confidence } => {
            let mut result = GuardrailResult::clear(name, kind);
            result.confidence = confidence;
            result
        }
        StageOutcome::Block { reason, severity } => {
            GuardrailResult::blocking(name, kind, 1.0, RiskLevel::from(severity), reason)
        }
        StageOutcome::Skip { reason } => {
            let mut result = GuardrailResult::clear(name, kind);
            result.reason = reason;
            result
        }
        StageOutcome::Transform { description, .. } => GuardrailResult::clear(name, kind)
            .with_detail("stage_outcome", serde_json::json!("transform"))
            .with_detail("description", serde_json::json!(description)),
        StageOutcome::Escalate { reason, .. } => {
            GuardrailResult::blocking(name, kind, 0.5, RiskLevel::Medium, reason)
                .with_detail("stage_outcome", serde_json::json!("escalate"))
        }
    }
}

/// Adapt a [`StageError`] into a [`GuardrailError`], attributing it to `name`.
#[must_use]
pub fn error_from_stage_error(name: &str, err: StageError) -> GuardrailError {
    match err {
        StageError::BackendUnavailable { reason, .. } => GuardrailError::Unavailable {
            guardrail: name.to_string(),
            reason,
        },
        StageError::InvalidContent { reason, .. } => GuardrailError::InvalidContent {
            guardrail: name.to_string(),
            reason,
        },
        StageError::Internal { source, .. } => GuardrailError::Internal {
            guardrail: name.to_string(),
            source,
        },
    }
}

/// Resolve the effective configuration object for a detector: prefers a
/// nested `"config"` key, falls back to the value itself.
#[must_use]
pub fn config_map(raw: &Value) -> &Value {
    raw.get("config").unwrap_or(raw)
}

/// Read a string array field, defaulting to empty.
#[must_use]
pub fn string_list(config: &Value, key: &str) -> Vec<String> {
    config
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
        .unwrap_or_default()
}

/// Read a float field with a default.
#[must_use]
pub fn float_or(config: &Value, key: &str, default: f32) -> f32 {
    config.get(key).and_then(Value::as_f64).map_or(default, |v| v as f32)
}

/// Read an unsigned integer field with a default.
#[must_use]
pub fn u64_or(config: &Value, key: &str, default: u64) -> u64 {
    config.get(key).and_then(Value::as_u64).unwrap_or(default)
}

/// Read a boolean field with a default.
#[must_use]
pub fn bool_or(config: &Value, key: &str, default: bool) -> bool {
    config.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Read a string field with a default borrowed string.
#[must_use]
pub fn str_or<'a>(config: &'a Value, key: &str, default: &'a str) -> &'a str {
    config.get(key).and_then(Value::as_str).unwrap_or(default)
}

//! Declarative configuration types for guardrails and pipelines.
//!
//! These are the structs the [config loader](crate::config::loader) produces
//! from a YAML/TOML/JSON document and the [engine](super::engine) consumes to
//! assemble a running pipeline. They are plain serde data — no behavior lives
//! here, only shape and validation constraints.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Which phase of a request a guardrail applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Runs against the user-supplied prompt before the model sees it.
    Input,
    /// Runs against the model's response before the caller sees it.
    Output,
    /// Registered in both the input and output pipelines.
    Both,
}

/// Per-guardrail policy applied to a blocking result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// A blocking result short-circuits the pipeline.
    Block,
    /// A blocking result is recorded as a warning; evaluation continues.
    Warn,
    /// The guardrail is advisory only — it can never set the aggregate `blocked`.
    Allow,
}

/// Policy applied when a guardrail's `analyze` call itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Treat the failure as a blocking result with reason `"detector_error"`.
    Block,
    /// Record a warning and continue.
    Warn,
    /// Ignore the failure and continue as if the guardrail were absent.
    Allow,
    /// Continue without even recording a warning.
    Skip,
}

/// Declared latency band for a guardrail, used for opt-in ordering and
/// performance-regression tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceClass {
    /// Under 10ms — pure in-process pattern matching.
    Instant,
    /// 10-100ms — local computation with moderate allocation.
    Fast,
    /// 100ms-1s — typically an external call.
    Moderate,
    /// Over 1s — large model inference or a slow upstream.
    Slow,
}

/// Declarative configuration for a single guardrail instance.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GuardrailSpec {
    /// Stable, unique name used in audit events and `reasons` lists.
    #[validate(length(min = 1))]
    pub name: String,

    /// Registry key identifying which detector implementation to construct.
    #[serde(rename = "type")]
    #[validate(length(min = 1))]
    pub kind: String,

    /// Whether this guardrail participates at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Which pipeline(s) this guardrail is wired into.
    pub stage: Stage,

    /// What a blocking result does to the pipeline.
    #[serde(default = "default_action")]
    pub action: Action,

    /// Minimum confidence at which this guardrail's result is treated as blocking.
    #[serde(default = "default_confidence_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_threshold: f32,

    /// Policy applied when `analyze` itself fails.
    #[serde(default = "default_on_error")]
    pub on_error: OnError,

    /// Per-call timeout in milliseconds.
    #[serde(default = "default_timeout_ms", rename = "timeout_ms")]
    pub timeout_ms: u64,

    /// Detector-specific configuration, looked up as a nested sub-map by
    /// convention (`config.patterns`, `config.providers`, …) with flat
    /// top-level keys honored for back-compat.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl GuardrailSpec {
    /// The configured timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_action() -> Action {
    Action::Block
}

fn default_confidence_threshold() -> f32 {
    0.8
}

fn default_on_error() -> OnError {
    OnError::Block
}

fn default_timeout_ms() -> u64 {
    1000
}

/// The full declarative pipeline assembly: ordered input and output guardrail
/// lists plus global defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineSpec {
    /// Document schema version.
    #[validate(length(min = 1))]
    pub version: String,

    /// Preset this spec was expanded from, if any (informational).
    #[serde(default)]
    pub preset: Option<String>,

    /// Guardrails wired into the input pipeline, in declaration order.
    #[serde(default)]
    #[validate(nested)]
    pub input: Vec<GuardrailSpec>,

    /// Guardrails wired into the output pipeline, in declaration order.
    #[serde(default)]
    #[validate(nested)]
    pub output: Vec<GuardrailSpec>,

    /// When `true`, the engine stable-sorts each pipeline by declared
    /// [`PerformanceClass`] (instant first) before declaration order breaks
    /// ties. Defaults to `false` — declaration order is authoritative.
    #[serde(default)]
    pub order_by_performance_class: bool,

    /// Global deadline applied to an entire `check_input`/`check_output` call,
    /// independent of any single guardrail's own timeout.
    #[serde(default)]
    pub pipeline_deadline_ms: Option<u64>,
}

impl PipelineSpec {
    /// Guardrails declared for `stage`, including ones declared `Stage::Both`,
    /// in the order they should run for that stage.
    #[must_use]
    pub fn guardrails_for(&self, stage: Stage) -> Vec<&GuardrailSpec> {
        let matches = |s: Stage| s == stage || s == Stage::Both;
        match stage {
            Stage::Input => self.input.iter().filter(|g| matches(g.stage)).collect(),
            Stage::Output => self.output.iter().filter(|g| matches(g.stage)).collect(),
            Stage::Both => self.input.iter().chain(self.output.iter()).collect(),
        }
    }

    /// The configured pipeline-wide deadline, if any.
    #[must_use]
    pub fn pipeline_deadline(&self) -> Option<Duration> {
        self.pipeline_deadline_ms.map(Duration::from_millis)
    }
}

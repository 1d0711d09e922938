//! Heuristic Prompt Injection guardrail — adapts
//! [`InjectionStage`](crate::input::injection::InjectionStage) (a
//! [`GuardrailStage`]) into the [`Guardrail`] contract the engine dispatches,
//! via the shared conversion helpers in [`crate::detectors::support`].

use async_trait::async_trait;

use crate::guardrail::result::GuardrailResult;
use crate::guardrail::{AnalysisContext, Guardrail, GuardrailError, PerformanceClass};
use crate::input::injection::{InjectionConfig, InjectionStage};
use crate::pipeline::stage::GuardrailStage;

use super::support::{bool_or, error_from_stage_error, result_from_stage_outcome, u64_or};

/// Wraps [`InjectionStage`] so it can be registered under the
/// `heuristic_prompt_injection` type tag.
pub struct HeuristicInjectionGuardrail {
    name: String,
    stage: InjectionStage,
}

impl HeuristicInjectionGuardrail {
    /// Construct from a guardrail spec's raw config value.
    ///
    /// # Errors
    ///
    /// Returns [`GuardrailError::Internal`] if the heuristic pattern set
    /// fails to compile (malformed `config.additional_patterns`).
    pub fn new(name: impl Into<String>, raw_config: &serde_json::Value) -> Result<Self, GuardrailError> {
        let name = name.into();
        let config = super::support::config_map(raw_config);
        let mut injection_config = InjectionConfig::new();
        injection_config = injection_config.max_content_bytes(u64_or(config, "max_content_bytes", 1_048_576) as usize);

        let mut heuristic_config = crate::input::injection::HeuristicConfig::default();
        heuristic_config = heuristic_config.case_sensitive(bool_or(config, "case_sensitive", false));
        injection_config = injection_config.heuristic_config(heuristic_config);

        let stage = InjectionStage::new(injection_config).map_err(|e| error_from_stage_error(&name, e))?;
        Ok(Self { name, stage })
    }
}

#[async_trait]
impl Guardrail for HeuristicInjectionGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "heuristic_prompt_injection"
    }

    async fn analyze(
        &self,
        content: &crate::pipeline::content::Content,
        ctx: &AnalysisContext,
    ) -> Result<GuardrailResult, GuardrailError> {
        let outcome = self
            .stage
            .evaluate(content, &ctx.security)
            .await
            .map_err(|e| error_from_stage_error(&self.name, e))?;
        Ok(result_from_stage_outcome(&self.name, self.kind(), outcome))
    }

    fn performance_class(&self) -> PerformanceClass {
        PerformanceClass::Fast
    }
}

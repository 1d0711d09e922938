//! RAG Spotlight guardrail — adapts [`Spotlight`](crate::input::spotlight::Spotlight)
//! (a [`GuardrailStage`]) into the [`Guardrail`] contract, marking and
//! scanning retrieved-document boundaries for indirect prompt injection.

use async_trait::async_trait;

use crate::guardrail::result::GuardrailResult;
use crate::guardrail::{AnalysisContext, Guardrail, GuardrailError, PerformanceClass};
use crate::input::spotlight::{Spotlight, SpotlightConfig};
use crate::pipeline::stage::GuardrailStage;

use super::support::{bool_or, config_map, error_from_stage_error, result_from_stage_outcome, str_or, u64_or};

/// Wraps [`Spotlight`] so it can be registered under the `rag_spotlight` type tag.
pub struct RagSpotlightGuardrail {
    name: String,
    stage: Spotlight,
}

impl RagSpotlightGuardrail {
    /// Construct from a guardrail spec's raw config value.
    #[must_use]
    pub fn new(name: impl Into<String>, raw_config: &serde_json::Value) -> Self {
        let config = config_map(raw_config);
        let spotlight_config = SpotlightConfig::new()
            .marker_prefix(str_or(config, "marker_prefix", "⟪chunk-"))
            .marker_suffix(str_or(config, "marker_suffix", "⟫"))
            .randomize_markers(bool_or(config, "randomize_markers", true))
            .random_suffix_length(u64_or(config, "random_suffix_length", 8) as usize);
        Self {
            name: name.into(),
            stage: Spotlight::new(spotlight_config),
        }
    }
}

#[async_trait]
impl Guardrail for RagSpotlightGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "rag_spotlight"
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

//! Length guardrail — blocks content outside configured character bounds.

use async_trait::async_trait;

use crate::guardrail::result::{GuardrailResult, RiskLevel};
use crate::guardrail::{AnalysisContext, Guardrail, GuardrailError, PerformanceClass};
use crate::pipeline::content::Content;

use super::support::{config_map, u64_or};

/// Enforces a minimum and/or maximum character count.
pub struct LengthGuardrail {
    name: String,
    min_chars: u64,
    max_chars: u64,
}

impl LengthGuardrail {
    /// Construct from a guardrail spec's raw config value.
    ///
    /// `min_chars` defaults to `0`, `max_chars` defaults to `u64::MAX`
    /// (effectively unbounded) so either bound can be omitted.
    #[must_use]
    pub fn new(name: impl Into<String>, raw_config: &serde_json::Value) -> Self {
        let config = config_map(raw_config);
        Self {
            name: name.into(),
            min_chars: u64_or(config, "min_chars", 0),
            max_chars: u64_or(config, "max_chars", u64::MAX),
        }
    }
}

#[async_trait]
impl Guardrail for LengthGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "length"
    }

    async fn analyze(&self, content: &Content, _ctx: &AnalysisContext) -> Result<GuardrailResult, GuardrailError> {
        let text = content.as_text();
        let len = text.chars().count() as u64;

        if len < self.min_chars {
            return Ok(GuardrailResult::blocking(
                &self.name,
                self.kind(),
                1.0,
                RiskLevel::Low,
                format!("content too short ({len} < {})", self.min_chars),
            ));
        }
        if len > self.max_chars {
            return Ok(GuardrailResult::blocking(
                &self.name,
                self.kind(),
                1.0,
                RiskLevel::Low,
                format!("content too long ({len} > {})", self.max_chars),
            ));
        }
        Ok(GuardrailResult::clear(&self.name, self.kind()))
    }

    fn performance_class(&self) -> PerformanceClass {
        PerformanceClass::Instant
    }
}

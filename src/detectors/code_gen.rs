//! Pattern code-generation detector — flags requests for (or production of)
//! source code, weighted toward explicit "write me a script" phrasing.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use crate::guardrail::result::{GuardrailResult, RiskLevel};
use crate::guardrail::{AnalysisContext, Guardrail, GuardrailError, PerformanceClass};
use crate::pipeline::content::Content;

static EXPLICIT_REQUEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(write|generate|give me) (a|an|some) (script|program|function|code) (that|to|which)\b").unwrap()
});
static LANGUAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(python|rust|javascript|typescript|golang|java|c\+\+|bash|powershell)\b").unwrap()
});
static SYNTAX_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\n)\s*(def |fn |function |class |import |#include|```)").unwrap());

/// Flags source code and explicit code-generation requests.
pub struct PatternCodeGeneration {
    name: String,
}

impl PatternCodeGeneration {
    /// Construct the detector; no configuration is currently consulted.
    #[must_use]
    pub fn new(name: impl Into<String>, _raw_config: &serde_json::Value) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Guardrail for PatternCodeGeneration {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "simple_code_generation"
    }

    async fn analyze(&self, content: &Content, _ctx: &AnalysisContext) -> Result<GuardrailResult, GuardrailError> {
        let text = content.as_text();
        let mut indicators = Vec::new();
        let mut confidence: f32 = 0.0;

        if EXPLICIT_REQUEST.is_match(&text) {
            indicators.push("explicit_request".to_string());
            confidence = confidence.max(0.75);
        }
        if SYNTAX_TOKEN.is_match(&text) {
            indicators.push("syntax_token".to_string());
            confidence = confidence.max(0.6);
        }
        if LANGUAGE_NAME.is_match(&text) {
            indicators.push("language_name".to_string());
            confidence = confidence.max(0.4);
        }

        if indicators.is_empty() {
            return Ok(GuardrailResult::clear(&self.name, self.kind()));
        }

        let risk = if confidence >= 0.6 { RiskLevel::Medium } else { RiskLevel::Low };
        let blocked = confidence >= 0.6;
        let mut result = if blocked {
            GuardrailResult::blocking(&self.name, self.kind(), confidence, risk, "code_generation_detected")
        } else {
            let mut r = GuardrailResult::clear(&self.name, self.kind());
            r.confidence = confidence;
            r.risk_level = risk;
            r.reason = "code_generation_detected".into();
            r
        };
        result = result.with_indicators(indicators);
        Ok(result)
    }

    fn performance_class(&self) -> PerformanceClass {
        PerformanceClass::Instant
    }
}

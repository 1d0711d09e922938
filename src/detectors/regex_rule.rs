//! User-supplied regex guardrail — allow or deny semantics over a configured
//! pattern list.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};

use crate::guardrail::result::{GuardrailResult, RiskLevel};
use crate::guardrail::{AnalysisContext, Guardrail, GuardrailError, PerformanceClass};
use crate::pipeline::content::Content;

use super::support::{bool_or, config_map, str_or, string_list};

/// Whether matching a pattern blocks the content, or the *absence* of any
/// match blocks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Any match blocks (deny-list).
    Deny,
    /// Content must match at least one pattern to pass (allow-list).
    Allow,
}

/// Evaluates user-supplied regex patterns against content with deny- or
/// allow-list semantics.
pub struct RegexGuardrail {
    name: String,
    patterns: Vec<Regex>,
    mode: Mode,
}

impl RegexGuardrail {
    /// Construct from a guardrail spec's raw config value.
    ///
    /// # Panics
    ///
    /// Panics if a configured pattern fails to compile. Detector construction
    /// happens at config-load time — the same "validate at construction"
    /// principle applied to credentials applies equally to pattern validity —
    /// so callers should validate patterns during config loading rather than
    /// relying on this constructor's panics at runtime.
    #[must_use]
    pub fn new(name: impl Into<String>, raw_config: &serde_json::Value) -> Self {
        let config = config_map(raw_config);
        let case_sensitive = bool_or(config, "case_sensitive", false);
        let mode = match str_or(config, "mode", "deny") {
            "allow" => Mode::Allow,
            _ => Mode::Deny,
        };
        let patterns = string_list(config, "patterns")
            .into_iter()
            .map(|p| {
                RegexBuilder::new(&p)
                    .case_insensitive(!case_sensitive)
                    .build()
                    .unwrap_or_else(|e| panic!("invalid regex guardrail pattern '{p}': {e}"))
            })
            .collect();

        Self {
            name: name.into(),
            patterns,
            mode,
        }
    }
}

#[async_trait]
impl Guardrail for RegexGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "regex"
    }

    async fn analyze(&self, content: &Content, _ctx: &AnalysisContext) -> Result<GuardrailResult, GuardrailError> {
        let text = content.as_text();
        let matched: Vec<String> = self
            .patterns
            .iter()
            .filter(|re| re.is_match(&text))
            .map(|re| re.as_str().to_string())
            .collect();

        let blocked = match self.mode {
            Mode::Deny => !matched.is_empty(),
            Mode::Allow => matched.is_empty() && !self.patterns.is_empty(),
        };

        if !blocked {
            return Ok(GuardrailResult::clear(&self.name, self.kind()));
        }

        let reason = match self.mode {
            Mode::Deny => "matched denied pattern",
            Mode::Allow => "matched no allowed pattern",
        };
        Ok(
            GuardrailResult::blocking(&self.name, self.kind(), 0.9, RiskLevel::Medium, reason)
                .with_indicators(matched),
        )
    }

    fn performance_class(&self) -> PerformanceClass {
        PerformanceClass::Instant
    }
}

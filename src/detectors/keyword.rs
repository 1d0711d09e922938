//! Keyword-block guardrail — inline or file-backed keyword lists.

use async_trait::async_trait;

use crate::guardrail::result::{GuardrailResult, RiskLevel};
use crate::guardrail::{AnalysisContext, Guardrail, GuardrailError, PerformanceClass};
use crate::pipeline::content::Content;

use super::support::{bool_or, config_map, string_list};

/// Blocks content containing any configured keyword, inline or loaded from a
/// newline-delimited file.
pub struct KeywordGuardrail {
    name: String,
    keywords: Vec<String>,
    case_sensitive: bool,
}

impl KeywordGuardrail {
    /// Construct from a guardrail spec's raw config value.
    ///
    /// Reads `keywords` (inline list) and, if present, `keyword_file` (a
    /// newline-delimited file merged in). A missing or unreadable
    /// `keyword_file` is tolerated — callers relying on the file should
    /// verify it during config-loader Semantic validation, not here.
    #[must_use]
    pub fn new(name: impl Into<String>, raw_config: &serde_json::Value) -> Self {
        let config = config_map(raw_config);
        let mut keywords = string_list(config, "keywords");

        if let Some(path) = config.get("keyword_file").and_then(|v| v.as_str())
            && let Ok(contents) = std::fs::read_to_string(path)
        {
            keywords.extend(contents.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_owned));
        }

        let case_sensitive = bool_or(config, "case_sensitive", false);
        if !case_sensitive {
            for k in &mut keywords {
                *k = k.to_lowercase();
            }
        }

        Self {
            name: name.into(),
            keywords,
            case_sensitive,
        }
    }
}

#[async_trait]
impl Guardrail for KeywordGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "keyword_block"
    }

    async fn analyze(&self, content: &Content, _ctx: &AnalysisContext) -> Result<GuardrailResult, GuardrailError> {
        let text = content.as_text();
        let haystack = if self.case_sensitive {
            text.into_owned()
        } else {
            text.to_lowercase()
        };

        let matched: Vec<String> = self
            .keywords
            .iter()
            .filter(|k| haystack.contains(k.as_str()))
            .cloned()
            .collect();

        if matched.is_empty() {
            return Ok(GuardrailResult::clear(&self.name, self.kind()));
        }

        Ok(
            GuardrailResult::blocking(&self.name, self.kind(), 1.0, RiskLevel::Medium, "keyword_matched")
                .with_indicators(matched),
        )
    }

    fn performance_class(&self) -> PerformanceClass {
        PerformanceClass::Instant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::spec::Stage;
    use crate::pipeline::stage::SecurityContext;

    fn ctx() -> AnalysisContext {
        AnalysisContext::new(Stage::Input, SecurityContext::default())
    }

    #[tokio::test]
    async fn case_insensitive_by_default() {
        let detector = KeywordGuardrail::new("kw", &serde_json::json!({"config": {"keywords": ["banned"]}}));
        let result = detector.analyze(&Content::Text("this is BANNED".into()), &ctx()).await.unwrap();
        assert!(result.blocked);
    }

    #[tokio::test]
    async fn case_sensitive_when_configured() {
        let detector = KeywordGuardrail::new(
            "kw",
            &serde_json::json!({"config": {"keywords": ["Banned"], "case_sensitive": true}}),
        );
        let result = detector.analyze(&Content::Text("this is banned".into()), &ctx()).await.unwrap();
        assert!(!result.blocked);
    }
}

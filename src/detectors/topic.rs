//! Topic Filter — allow/deny content by topic label, matched against a
//! configured keyword set standing in for each topic.

use async_trait::async_trait;

use crate::guardrail::result::{GuardrailResult, RiskLevel};
use crate::guardrail::{AnalysisContext, Guardrail, GuardrailError, PerformanceClass};

use super::support::{config_map, string_list};

/// A named topic and the keywords that indicate its presence in content.
#[derive(Debug, Clone)]
struct Topic {
    label: String,
    keywords: Vec<String>,
}

/// Blocks (or allows-only) content matching a configured set of topics.
///
/// `mode: "deny"` (the default) blocks content matching any listed topic;
/// `mode: "allow"` blocks content matching *none* of the listed topics, for
/// domains that must stay strictly on-topic (e.g. a medical assistant).
pub struct TopicFilter {
    name: String,
    topics: Vec<Topic>,
    deny_mode: bool,
}

impl TopicFilter {
    /// Construct from a guardrail spec's raw config value.
    ///
    /// Expects `config.topics: [{label, keywords: [...]}, ...]` and an
    /// optional `config.mode: "deny" | "allow"`.
    #[must_use]
    pub fn new(name: impl Into<String>, raw_config: &serde_json::Value) -> Self {
        let config = config_map(raw_config);
        let topics = config
            .get("topics")
            .and_then(serde_json::Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| {
                        let label = t.get("label")?.as_str()?.to_string();
                        let keywords = string_list(t, "keywords");
                        Some(Topic { label, keywords })
                    })
                    .collect()
            })
            .unwrap_or_default();
        let mode = config.get("mode").and_then(serde_json::Value::as_str).unwrap_or("deny");
        Self {
            name: name.into(),
            topics,
            deny_mode: mode != "allow",
        }
    }

    fn matching_topics(&self, text_lower: &str) -> Vec<&str> {
        self.topics
            .iter()
            .filter(|t| t.keywords.iter().any(|kw| text_lower.contains(&kw.to_lowercase())))
            .map(|t| t.label.as_str())
            .collect()
    }
}

#[async_trait]
impl Guardrail for TopicFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "topic_filter"
    }

    async fn analyze(
        &self,
        content: &crate::pipeline::content::Content,
        _ctx: &AnalysisContext,
    ) -> Result<GuardrailResult, GuardrailError> {
        let text = content.as_text().to_lowercase();
        let matched = self.matching_topics(&text);

        let blocked = if self.deny_mode {
            !matched.is_empty()
        } else {
            self.topics.is_empty() || matched.is_empty()
        };

        if !blocked {
            let mut result = GuardrailResult::clear(&self.name, self.kind());
            if !matched.is_empty() {
                result.indicators = matched.into_iter().map(str::to_string).collect();
            }
            return Ok(result);
        }

        let reason = if self.deny_mode { "denied_topic" } else { "off_topic" };
        Ok(
            GuardrailResult::blocking(&self.name, self.kind(), 0.85, RiskLevel::Medium, reason)
                .with_indicators(matched.into_iter().map(str::to_string).collect()),
        )
    }

    fn performance_class(&self) -> PerformanceClass {
        PerformanceClass::Instant
    }
}

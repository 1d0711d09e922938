//! Pattern toxicity detector — category-tagged keyword/regex sets.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use crate::guardrail::result::{GuardrailResult, RiskLevel};
use crate::guardrail::{AnalysisContext, Guardrail, GuardrailError, PerformanceClass};
use crate::pipeline::content::Content;

static HARASSMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(i hate you|shut up|you'?re (stupid|worthless|pathetic))\b").unwrap());
static HATE_SPEECH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(subhuman|racial slur|ethnic cleansing)\b").unwrap());
static THREATS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(i will kill you|i'?m going to hurt you|i will find you)\b").unwrap());
static SEXUAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(explicit sexual content|nsfw request)\b").unwrap());
static VIOLENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(how to make a bomb|how to build a weapon|mass casualty)\b").unwrap());

/// `(category label, compiled pattern, confidence floor once matched)`.
///
/// "Serious" categories (everything but `sexual`) carry the higher 0.6 floor
/// described for Pattern Toxicity.
fn categories() -> [(&'static str, &'static Regex, f32); 5] {
    [
        ("harassment", &HARASSMENT, 0.6),
        ("hate_speech", &HATE_SPEECH, 0.6),
        ("threats", &THREATS, 0.6),
        ("sexual", &SEXUAL, 0.5),
        ("violence", &VIOLENCE, 0.6),
    ]
}

/// Keyword/regex toxicity classifier tagged by OWASP-style content categories.
pub struct PatternToxicity {
    name: String,
}

impl PatternToxicity {
    /// Construct from a guardrail spec's raw config value (currently unused —
    /// the category set is fixed; reserved for future category allow-lists).
    #[must_use]
    pub fn new(name: impl Into<String>, _raw_config: &serde_json::Value) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Guardrail for PatternToxicity {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "simple_toxicity_detection"
    }

    async fn analyze(&self, content: &Content, _ctx: &AnalysisContext) -> Result<GuardrailResult, GuardrailError> {
        let text = content.as_text();
        let mut indicators = Vec::new();
        let mut confidence: f32 = 0.0;

        for (name, regex, floor) in categories() {
            if regex.is_match(&text) {
                indicators.push(name.to_string());
                confidence = confidence.max(floor);
            }
        }

        if indicators.is_empty() {
            return Ok(GuardrailResult::clear(&self.name, self.kind()));
        }

        let risk = if confidence >= 0.6 { RiskLevel::High } else { RiskLevel::Medium };
        Ok(
            GuardrailResult::blocking(&self.name, self.kind(), confidence, risk, "toxicity_detected")
                .with_indicators(indicators),
        )
    }

    fn performance_class(&self) -> PerformanceClass {
        PerformanceClass::Instant
    }
}

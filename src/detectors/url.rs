//! URL guardrail — extracts URLs (scheme optional) and checks them against
//! an allow- or deny-list of domains.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use crate::guardrail::result::{GuardrailResult, RiskLevel};
use crate::guardrail::{AnalysisContext, Guardrail, GuardrailError, PerformanceClass};
use crate::pipeline::content::Content;

use super::support::{config_map, string_list};

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:https?://)?(?:[a-z0-9-]+\.)+[a-z]{2,}(?:/[^\s]*)?").unwrap()
});

fn domain_of(url_match: &str) -> String {
    let without_scheme = url_match.trim_start_matches("http://").trim_start_matches("https://");
    without_scheme.split('/').next().unwrap_or(without_scheme).to_lowercase()
}

/// Extracted-URL domain checker with allow- or deny-list semantics.
pub struct UrlGuardrail {
    name: String,
    deny_domains: Vec<String>,
    allow_domains: Vec<String>,
}

impl UrlGuardrail {
    /// Construct from a guardrail spec's raw config value.
    #[must_use]
    pub fn new(name: impl Into<String>, raw_config: &serde_json::Value) -> Self {
        let config = config_map(raw_config);
        Self {
            name: name.into(),
            deny_domains: string_list(config, "deny_domains").into_iter().map(|d| d.to_lowercase()).collect(),
            allow_domains: string_list(config, "allow_domains").into_iter().map(|d| d.to_lowercase()).collect(),
        }
    }
}

#[async_trait]
impl Guardrail for UrlGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "url"
    }

    async fn analyze(&self, content: &Content, _ctx: &AnalysisContext) -> Result<GuardrailResult, GuardrailError> {
        let text = content.as_text();
        let mut blocked_domains = Vec::new();

        for m in URL_RE.find_iter(&text) {
            let domain = domain_of(m.as_str());

            if self.deny_domains.iter().any(|d| domain.ends_with(d.as_str())) {
                blocked_domains.push(domain.clone());
                continue;
            }

            if !self.allow_domains.is_empty() && !self.allow_domains.iter().any(|d| domain.ends_with(d.as_str())) {
                blocked_domains.push(domain);
            }
        }

        if blocked_domains.is_empty() {
            return Ok(GuardrailResult::clear(&self.name, self.kind()));
        }

        Ok(
            GuardrailResult::blocking(&self.name, self.kind(), 0.9, RiskLevel::Medium, "disallowed_url_domain")
                .with_indicators(blocked_domains),
        )
    }

    fn performance_class(&self) -> PerformanceClass {
        PerformanceClass::Instant
    }
}

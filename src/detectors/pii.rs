//! Pattern PII detector — regexes for the common structured-PII shapes, with
//! a Luhn check for credit card numbers to keep the false-positive rate down.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use crate::guardrail::result::{GuardrailResult, RiskLevel};
use crate::guardrail::{AnalysisContext, Guardrail, GuardrailError, PerformanceClass};

use super::support::{config_map, string_list};

static SSN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static CREDIT_CARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]?){13,19}\b").unwrap());
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[\w.+-]+@[\w-]+\.[a-zA-Z]{2,}\b").unwrap());
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\+?1[-. ]?)?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}\b").unwrap());
static IPV4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d?\d)\b").unwrap()
});
static IBAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2}\d{2}[A-Z0-9]{10,30}\b").unwrap());

/// Luhn checksum validation for candidate credit card digit strings.
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 {
        return false;
    }
    let mut sum = 0u32;
    for (i, &d) in digits.iter().rev().enumerate() {
        if i % 2 == 1 {
            let doubled = d * 2;
            sum += if doubled > 9 { doubled - 9 } else { doubled };
        } else {
            sum += d;
        }
    }
    sum % 10 == 0
}

/// Redact every PII pattern this detector recognizes, replacing each match
/// with a fixed token plus a correlation hash of the original substring.
/// Used by the audit subsystem so a redacted event's content and this
/// detector's live blocking decision never disagree on what counts as PII.
#[must_use]
pub fn redact(text: &str) -> String {
    let mut result = text.to_string();
    for regex in [&*SSN, &*EMAIL, &*PHONE, &*IPV4, &*IBAN] {
        result = regex.replace_all(&result, |caps: &regex::Captures<'_>| redaction_token(&caps[0])).into_owned();
    }
    CREDIT_CARD
        .replace_all(&result, |caps: &regex::Captures<'_>| {
            let m = &caps[0];
            let digits: String = m.chars().filter(char::is_ascii_digit).collect();
            if luhn_valid(&digits) { redaction_token(m) } else { m.to_string() }
        })
        .into_owned()
}

/// Non-cryptographic correlation hash: lets operators match up redacted
/// events referring to the same underlying value without storing it.
fn redaction_token(matched: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    matched.hash(&mut hasher);
    format!("[REDACTED:{:016x}]", hasher.finish())
}

/// Which pattern families this instance checks; defaults to all of them.
#[derive(Debug, Clone)]
struct PatternSet {
    ssn: bool,
    credit_card: bool,
    email: bool,
    phone: bool,
    ipv4: bool,
    iban: bool,
}

impl PatternSet {
    fn from_config(config: &serde_json::Value) -> Self {
        let patterns = string_list(config, "patterns");
        if patterns.is_empty() {
            return Self {
                ssn: true,
                credit_card: true,
                email: true,
                phone: true,
                ipv4: true,
                iban: true,
            };
        }
        let has = |name: &str| patterns.iter().any(|p| p == name);
        Self {
            ssn: has("ssn"),
            credit_card: has("credit_card"),
            email: has("email"),
            phone: has("phone"),
            ipv4: has("ipv4"),
            iban: has("iban"),
        }
    }
}

/// Regex-based PII detector covering SSN, credit card (Luhn-checked), email,
/// phone, bare IPv4, and IBAN.
pub struct PatternPii {
    name: String,
    patterns: PatternSet,
}

impl PatternPii {
    /// Construct from a guardrail spec's raw config value.
    #[must_use]
    pub fn new(name: impl Into<String>, raw_config: &serde_json::Value) -> Self {
        let config = config_map(raw_config);
        Self {
            name: name.into(),
            patterns: PatternSet::from_config(config),
        }
    }
}

#[async_trait]
impl Guardrail for PatternPii {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "simple_pii_detection"
    }

    async fn analyze(
        &self,
        content: &crate::pipeline::content::Content,
        _ctx: &AnalysisContext,
    ) -> Result<GuardrailResult, GuardrailError> {
        let text = content.as_text();
        let mut indicators = Vec::new();
        let mut confidence: f32 = 0.0;

        if self.patterns.ssn && SSN.is_match(&text) {
            indicators.push("ssn".to_string());
            confidence = confidence.max(0.9);
        }
        if self.patterns.credit_card {
            for m in CREDIT_CARD.find_iter(&text) {
                let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
                if luhn_valid(&digits) {
                    indicators.push("credit_card".to_string());
                    confidence = confidence.max(0.9);
                    break;
                }
            }
        }
        if self.patterns.email && EMAIL.is_match(&text) {
            indicators.push("email".to_string());
            confidence = confidence.max(0.85);
        }
        if self.patterns.phone && PHONE.is_match(&text) {
            indicators.push("phone".to_string());
            confidence = confidence.max(0.8);
        }
        if self.patterns.ipv4 && IPV4.is_match(&text) {
            // Bare IPs are ambiguous (could be a benign example, a local
            // address, or a versioned identifier) so confidence is capped low.
            indicators.push("ipv4".to_string());
            confidence = confidence.max(0.5);
        }
        if self.patterns.iban && IBAN.is_match(&text) {
            indicators.push("iban".to_string());
            confidence = confidence.max(0.85);
        }

        if indicators.is_empty() {
            return Ok(GuardrailResult::clear(&self.name, self.kind()));
        }

        let blocked = confidence >= 0.8;
        let risk = if confidence >= 0.8 {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        };
        let result = if blocked {
            GuardrailResult::blocking(&self.name, self.kind(), confidence, risk, "pii_detected")
        } else {
            let mut r = GuardrailResult::clear(&self.name, self.kind());
            r.confidence = confidence;
            r.risk_level = risk;
            r.reason = "pii_detected".into();
            r
        };
        Ok(result.with_indicators(indicators))
    }

    fn performance_class(&self) -> PerformanceClass {
        PerformanceClass::Instant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::spec::Stage;
    use crate::pipeline::content::Content;
    use crate::pipeline::stage::SecurityContext;

    fn ctx() -> AnalysisContext {
        AnalysisContext::new(Stage::Input, SecurityContext::default())
    }

    #[tokio::test]
    async fn detects_ssn() {
        let detector = PatternPii::new("pii_check", &serde_json::json!({}));
        let result = detector
            .analyze(&Content::Text("My SSN is 123-45-6789".into()), &ctx())
            .await
            .unwrap();
        assert!(result.blocked);
        assert!(result.indicators.contains(&"ssn".to_string()));
    }

    #[tokio::test]
    async fn safe_text_passes() {
        let detector = PatternPii::new("pii_check", &serde_json::json!({}));
        let result = detector
            .analyze(&Content::Text("Hello, how can you help me today?".into()), &ctx())
            .await
            .unwrap();
        assert!(!result.blocked);
    }

    #[tokio::test]
    async fn rejects_non_luhn_digit_strings() {
        let detector = PatternPii::new("pii_check", &serde_json::json!({}));
        let result = detector
            .analyze(&Content::Text("order id 4111111111111112".into()), &ctx())
            .await
            .unwrap();
        assert!(!result.indicators.contains(&"credit_card".to_string()));
    }

    #[tokio::test]
    async fn accepts_valid_luhn_card() {
        let detector = PatternPii::new("pii_check", &serde_json::json!({}));
        let result = detector
            .analyze(&Content::Text("card 4111111111111111 please".into()), &ctx())
            .await
            .unwrap();
        assert!(result.indicators.contains(&"credit_card".to_string()));
    }

    #[test]
    fn luhn_validates_known_test_numbers() {
        assert!(luhn_valid("4111111111111111"));
        assert!(!luhn_valid("4111111111111112"));
    }

    #[test]
    fn redact_replaces_ssn_and_email_but_not_prose() {
        let redacted = redact("contact jane@example.com, ssn 123-45-6789, nice weather today");
        assert!(!redacted.contains("jane@example.com"));
        assert!(!redacted.contains("123-45-6789"));
        assert!(redacted.contains("nice weather today"));
        assert!(redacted.contains("[REDACTED:"));
    }

    #[test]
    fn redact_is_deterministic_for_correlation() {
        assert_eq!(redact("email me at a@b.com"), redact("email me at a@b.com"));
    }

    #[tokio::test]
    async fn restricts_to_configured_patterns() {
        let detector = PatternPii::new("pii_check", &serde_json::json!({"config": {"patterns": ["email"]}}));
        let result = detector
            .analyze(&Content::Text("my ssn is 123-45-6789".into()), &ctx())
            .await
            .unwrap();
        assert!(!result.indicators.contains(&"ssn".to_string()));
    }
}

//! The outward-facing result type every guardrail produces.
//!
//! [`GuardrailResult`] is deliberately flatter than
//! [`StageOutcome`](crate::pipeline::outcome::StageOutcome) — it is the
//! shape callers of the engine see and the shape the audit subsystem
//! serializes, so it favours a stable struct over an evolving enum.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::pipeline::outcome::Severity;

/// Coarse risk banding for a guardrail decision.
///
/// Mirrors [`Severity`] but adds a true "nothing of note" variant — `Severity`
/// conflates "informational event" with "no risk at all", which this type
/// keeps distinct so `risk_level == None` is a meaningful default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// No risk signal at all.
    None,
    /// Low risk — worth recording, rarely worth blocking alone.
    Low,
    /// Medium risk — typically warns.
    Medium,
    /// High risk — typically blocks.
    High,
    /// Critical — always blocks under default policy.
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl From<Severity> for RiskLevel {
    fn from(s: Severity) -> Self {
        match s {
            Severity::Info => Self::None,
            Severity::Low => Self::Low,
            Severity::Medium => Self::Medium,
            Severity::High => Self::High,
            Severity::Critical => Self::Critical,
        }
    }
}

impl From<RiskLevel> for Severity {
    /// `RiskLevel::None` has no real severity equivalent; it maps to `Info`
    /// since callers only convert a `RiskLevel` once a result is blocking.
    fn from(r: RiskLevel) -> Self {
        match r {
            RiskLevel::None => Self::Info,
            RiskLevel::Low => Self::Low,
            RiskLevel::Medium => Self::Medium,
            RiskLevel::High => Self::High,
            RiskLevel::Critical => Self::Critical,
        }
    }
}

/// The result of a single guardrail's analysis of one piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailResult {
    /// Whether this guardrail, taken alone, considers the content blocked.
    pub blocked: bool,
    /// Confidence in `[0.0, 1.0]` that the content matches the guardrail's concern.
    pub confidence: f32,
    /// Coarse risk banding for alerting and audit grouping.
    pub risk_level: RiskLevel,
    /// Short human-readable explanation.
    pub reason: String,
    /// Matched pattern names or category labels.
    pub indicators: Vec<String>,
    /// Opaque diagnostic details (never assumed stable across versions).
    pub details: HashMap<String, serde_json::Value>,
    /// Stable name of the guardrail instance that produced this result.
    pub guardrail_name: String,
    /// `type` tag of the guardrail (as declared in its [`GuardrailSpec`](super::spec::GuardrailSpec)).
    pub guardrail_type: String,
    /// Wall-clock cost of producing this result.
    pub latency: Duration,
}

impl GuardrailResult {
    /// Build an "all clear" result for a guardrail that found nothing.
    #[must_use]
    pub fn clear(guardrail_name: impl Into<String>, guardrail_type: impl Into<String>) -> Self {
        Self {
            blocked: false,
            confidence: 0.0,
            risk_level: RiskLevel::None,
            reason: String::new(),
            indicators: Vec::new(),
            details: HashMap::new(),
            guardrail_name: guardrail_name.into(),
            guardrail_type: guardrail_type.into(),
            latency: Duration::ZERO,
        }
    }

    /// Build a blocking result.
    #[must_use]
    pub fn blocking(
        guardrail_name: impl Into<String>,
        guardrail_type: impl Into<String>,
        confidence: f32,
        risk_level: RiskLevel,
        reason: impl Into<String>,
    ) -> Self {
        debug_assert!((0.0..=1.0).contains(&confidence));
        debug_assert!(risk_level != RiskLevel::None, "a blocking result must carry risk");
        Self {
            blocked: true,
            confidence,
            risk_level,
            reason: reason.into(),
            indicators: Vec::new(),
            details: HashMap::new(),
            guardrail_name: guardrail_name.into(),
            guardrail_type: guardrail_type.into(),
            latency: Duration::ZERO,
        }
    }

    /// Attach matched indicators (builder style).
    #[must_use]
    pub fn with_indicators(mut self, indicators: Vec<String>) -> Self {
        self.indicators = indicators;
        self
    }

    /// Attach a single diagnostic field (builder style).
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Stamp the measured latency (called by the engine after timing the call).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_maps_info_to_none() {
        assert_eq!(RiskLevel::from(Severity::Info), RiskLevel::None);
        assert_eq!(RiskLevel::from(Severity::Critical), RiskLevel::Critical);
    }

    #[test]
    fn clear_result_is_not_blocked() {
        let r = GuardrailResult::clear("pii_check", "simple_pii_detection");
        assert!(!r.blocked);
        assert_eq!(r.risk_level, RiskLevel::None);
    }

    #[test]
    fn blocking_result_round_trips_json() {
        let r = GuardrailResult::blocking("pii_check", "simple_pii_detection", 0.92, RiskLevel::High, "ssn_detected")
            .with_indicators(vec!["ssn".into()]);
        let json = serde_json::to_string(&r).unwrap();
        let back: GuardrailResult = serde_json::from_str(&json).unwrap();
        assert!(back.blocked);
        assert_eq!(back.indicators, vec!["ssn".to_string()]);
    }
}

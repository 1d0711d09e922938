//! Health/Metrics: per-detector counters, latency histograms, circuit-breaker
//! states, audit-buffer depth, and uptime, rendered on demand.
//!
//! The core maintains its own atomic counters rather than depending on a
//! metrics backend; [`HealthSnapshot`] is plain serializable data that a
//! boundary collaborator (an HTTP `/health` handler, a Prometheus exporter)
//! can forward however it likes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::guardrail::result::GuardrailResult;
use crate::guardrail::spec::PerformanceClass;
use crate::resilience::breaker::CircuitState;

/// Which latency band an observed call fell into, for the histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyBucket {
    /// Under 10ms.
    Instant,
    /// 10-100ms.
    Fast,
    /// 100ms-1s.
    Moderate,
    /// Over 1s.
    Slow,
}

impl LatencyBucket {
    fn of(latency: std::time::Duration) -> Self {
        let ms = latency.as_millis();
        if ms < 10 {
            Self::Instant
        } else if ms < 100 {
            Self::Fast
        } else if ms < 1000 {
            Self::Moderate
        } else {
            Self::Slow
        }
    }
}

impl From<PerformanceClass> for LatencyBucket {
    fn from(class: PerformanceClass) -> Self {
        match class {
            PerformanceClass::Instant => Self::Instant,
            PerformanceClass::Fast => Self::Fast,
            PerformanceClass::Moderate => Self::Moderate,
            PerformanceClass::Slow => Self::Slow,
        }
    }
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    blocks: AtomicU64,
    warnings: AtomicU64,
    errors: AtomicU64,
    histogram: Mutex<[u64; 4]>,
}

impl Counters {
    fn bump_histogram(&self, bucket: LatencyBucket) {
        let idx = bucket as usize;
        let mut hist = self.histogram.lock().expect("histogram lock poisoned");
        hist[idx] += 1;
    }
}

/// Per-detector health, as rendered into a [`HealthSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorHealth {
    /// The detector instance's configured name.
    pub name: String,
    /// The detector's registry `type` tag.
    pub kind: String,
    /// Number of `analyze` calls observed.
    pub requests: u64,
    /// Number of calls that resulted in a block.
    pub blocks: u64,
    /// Number of calls that resulted in a warning.
    pub warnings: u64,
    /// Number of calls that errored (before `on_error` mapping).
    pub errors: u64,
    /// Latency histogram: `[instant, fast, moderate, slow]` call counts.
    pub latency_histogram: [u64; 4],
    /// The detector's declared performance class, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_class: Option<PerformanceClass>,
    /// The latency band most of this detector's calls actually fell into,
    /// for spotting drift against `declared_class`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_class: Option<LatencyBucket>,
}

/// A point-in-time rendering of everything [`HealthRegistry`] tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Wall-clock duration since the registry was created.
    pub uptime_secs: u64,
    /// Per-detector counters and histograms, keyed by detector name.
    pub detectors: Vec<DetectorHealth>,
    /// Circuit-breaker state by upstream name, where applicable.
    pub circuit_breakers: HashMap<String, String>,
    /// Current audit buffer depth, if an audit subsystem is wired in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_buffer_depth: Option<usize>,
    /// Events dropped by the audit subsystem due to a full buffer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_dropped_events: Option<u64>,
}

/// Live, process-wide counters the engine updates as it runs guardrails.
///
/// Construct one per [`PipelineEngine`](crate::guardrail::engine::PipelineEngine)
/// (or share process-wide — the registry favors an explicit `init`/`shutdown`
/// over a global singleton) and call [`Self::record`] after every `analyze`
/// call completes.
pub struct HealthRegistry {
    started_at: Instant,
    per_detector: Mutex<HashMap<String, Counters>>,
    declared_classes: Mutex<HashMap<String, PerformanceClass>>,
    breakers: Mutex<HashMap<String, CircuitState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Build an empty registry, stamping the current instant as its start time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            per_detector: Mutex::new(HashMap::new()),
            declared_classes: Mutex::new(HashMap::new()),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Declare a detector's latency class ahead of its first call, so it
    /// shows up in a snapshot even before any `record` call (and so drift
    /// against `declared_class` can be computed).
    pub fn declare(&self, name: impl Into<String>, class: PerformanceClass) {
        self.declared_classes
            .lock()
            .expect("declared-class lock poisoned")
            .insert(name.into(), class);
    }

    /// Record one completed (non-erroring) `analyze` call.
    pub fn record(&self, result: &GuardrailResult) {
        let mut table = self.per_detector.lock().expect("health counters lock poisoned");
        let counters = table.entry(result.guardrail_name.clone()).or_default();
        counters.requests.fetch_add(1, Ordering::Relaxed);
        if result.blocked {
            counters.blocks.fetch_add(1, Ordering::Relaxed);
        }
        counters.bump_histogram(LatencyBucket::of(result.latency));
    }

    /// Record that a detector's call errored (irrespective of `on_error` policy).
    pub fn record_error(&self, guardrail_name: &str) {
        let mut table = self.per_detector.lock().expect("health counters lock poisoned");
        let counters = table.entry(guardrail_name.to_string()).or_default();
        counters.requests.fetch_add(1, Ordering::Relaxed);
        counters.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that a warn-only result was recorded for a detector.
    pub fn record_warning(&self, guardrail_name: &str) {
        let table = self.per_detector.lock().expect("health counters lock poisoned");
        if let Some(counters) = table.get(guardrail_name) {
            counters.warnings.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the current state of a named circuit breaker (typically an
    /// upstream provider name).
    pub fn record_breaker(&self, name: impl Into<String>, state: CircuitState) {
        self.breakers.lock().expect("breaker table lock poisoned").insert(name.into(), state);
    }

    /// Render a point-in-time [`HealthSnapshot`].
    ///
    /// `audit` is an optional `(buffer_depth, dropped_events)` pair from a
    /// live [`AuditHandle`](crate::audit::AuditHandle) / [`AuditSubsystem`](crate::audit::AuditSubsystem).
    #[must_use]
    pub fn snapshot(&self, audit: Option<(usize, u64)>) -> HealthSnapshot {
        let table = self.per_detector.lock().expect("health counters lock poisoned");
        let declared = self.declared_classes.lock().expect("declared-class lock poisoned");
        let breakers = self.breakers.lock().expect("breaker table lock poisoned");

        let mut names: Vec<&String> = table.keys().chain(declared.keys()).collect();
        names.sort();
        names.dedup();

        let detectors = names
            .into_iter()
            .map(|name| {
                let declared_class = declared.get(name).copied();
                let (requests, blocks, warnings, errors, histogram) = table
                    .get(name)
                    .map(|c| {
                        (
                            c.requests.load(Ordering::Relaxed),
                            c.blocks.load(Ordering::Relaxed),
                            c.warnings.load(Ordering::Relaxed),
                            c.errors.load(Ordering::Relaxed),
                            *c.histogram.lock().expect("histogram lock poisoned"),
                        )
                    })
                    .unwrap_or_default();

                let observed_class = dominant_bucket(&histogram);

                DetectorHealth {
                    name: name.clone(),
                    kind: String::new(),
                    requests,
                    blocks,
                    warnings,
                    errors,
                    latency_histogram: histogram,
                    declared_class,
                    observed_class,
                }
            })
            .collect();

        HealthSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            detectors,
            circuit_breakers: breakers.iter().map(|(k, v)| (k.clone(), format!("{v:?}").to_lowercase())).collect(),
            audit_buffer_depth: audit.map(|(depth, _)| depth),
            audit_dropped_events: audit.map(|(_, dropped)| dropped),
        }
    }
}

/// Forward a snapshot into the process's `metrics` recorder, if one is
/// installed. A boundary collaborator (Prometheus/OTLP exporter) owns
/// actually installing a recorder; the core only emits into it.
#[cfg(feature = "health-metrics")]
pub fn export(snapshot: &HealthSnapshot) {
    metrics::gauge!("guardrail_engine_uptime_seconds").set(snapshot.uptime_secs as f64);
    for detector in &snapshot.detectors {
        let labels = [("detector", detector.name.clone())];
        metrics::counter!("guardrail_engine_requests_total", &labels).absolute(detector.requests);
        metrics::counter!("guardrail_engine_blocks_total", &labels).absolute(detector.blocks);
        metrics::counter!("guardrail_engine_errors_total", &labels).absolute(detector.errors);
    }
    if let Some(depth) = snapshot.audit_buffer_depth {
        metrics::gauge!("guardrail_engine_audit_buffer_depth").set(depth as f64);
    }
}

fn dominant_bucket(histogram: &[u64; 4]) -> Option<LatencyBucket> {
    let buckets = [LatencyBucket::Instant, LatencyBucket::Fast, LatencyBucket::Moderate, LatencyBucket::Slow];
    let (idx, count) = histogram.iter().enumerate().max_by_key(|(_, c)| **c)?;
    if *count == 0 {
        return None;
    }
    Some(buckets[idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::result::RiskLevel;
    use std::time::Duration;

    fn result(name: &str, blocked: bool, latency_ms: u64) -> GuardrailResult {
        let mut r = if blocked {
            GuardrailResult::blocking(name, "kind", 0.9, RiskLevel::High, "matched")
        } else {
            GuardrailResult::clear(name, "kind")
        };
        r.latency = Duration::from_millis(latency_ms);
        r
    }

    #[test]
    fn record_accumulates_per_detector_counts() {
        let registry = HealthRegistry::new();
        registry.record(&result("pii_check", true, 5));
        registry.record(&result("pii_check", false, 5));
        let snapshot = registry.snapshot(None);
        let pii = snapshot.detectors.iter().find(|d| d.name == "pii_check").unwrap();
        assert_eq!(pii.requests, 2);
        assert_eq!(pii.blocks, 1);
    }

    #[test]
    fn latency_buckets_classify_correctly() {
        assert_eq!(LatencyBucket::of(Duration::from_millis(1)), LatencyBucket::Instant);
        assert_eq!(LatencyBucket::of(Duration::from_millis(50)), LatencyBucket::Fast);
        assert_eq!(LatencyBucket::of(Duration::from_millis(500)), LatencyBucket::Moderate);
        assert_eq!(LatencyBucket::of(Duration::from_millis(2000)), LatencyBucket::Slow);
    }

    #[test]
    fn declared_class_surfaces_even_without_calls() {
        let registry = HealthRegistry::new();
        registry.declare("slow_check", PerformanceClass::Slow);
        let snapshot = registry.snapshot(None);
        let d = snapshot.detectors.iter().find(|d| d.name == "slow_check").unwrap();
        assert_eq!(d.declared_class, Some(PerformanceClass::Slow));
        assert_eq!(d.requests, 0);
    }

    #[test]
    fn breaker_state_is_reported_lowercase() {
        let registry = HealthRegistry::new();
        registry.record_breaker("openai", CircuitState::Open);
        let snapshot = registry.snapshot(None);
        assert_eq!(snapshot.circuit_breakers.get("openai").map(String::as_str), Some("open"));
    }

    #[test]
    fn audit_figures_pass_through_when_provided() {
        let registry = HealthRegistry::new();
        let snapshot = registry.snapshot(Some((3, 7)));
        assert_eq!(snapshot.audit_buffer_depth, Some(3));
        assert_eq!(snapshot.audit_dropped_events, Some(7));
    }
}

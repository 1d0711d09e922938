//! The pipeline engine: ordered dispatch of guardrails with short-circuit,
//! warn-and-continue, and on-error semantics.
//!
//! Grounded in [`crate::pipeline::executor::PipelineExecutor`]'s execution
//! shape (sequential dispatch, `Instant`-based per-stage timing, a
//! `tracing::warn!` on degraded paths) but built against the richer,
//! spec-shaped [`Guardrail`]/[`GuardrailResult`] contract instead of the
//! binary `GuardrailStage`/`StageOutcome` one — every guardrail here carries
//! its own [`Action`] and [`OnError`] policy rather than sharing one
//! pipeline-wide fail mode.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use super::registry::Registry;
use super::result::{GuardrailResult, RiskLevel};
use super::spec::{Action, GuardrailSpec, OnError, PerformanceClass, PipelineSpec, Stage};
use super::{AnalysisContext, Guardrail, GuardrailError};
use crate::config::ConfigError;
use crate::health::HealthRegistry;
use crate::pipeline::content::Content;
use crate::pipeline::outcome::{Severity, StageOutcome};
use crate::prompt::refusal::RefusalPolicy;

/// An amendment [`PipelineEngine::update_guardrail`] applies to one named
/// guardrail's spec before reloading.
#[derive(Debug, Clone)]
pub enum GuardrailUpdate {
    /// Flip the guardrail's `enabled` flag without touching its `config`.
    Enabled(bool),
    /// Replace the guardrail's `config` sub-map wholesale.
    Config(serde_json::Value),
}

/// A guardrail bound to the spec that produced it.
struct Bound {
    spec: GuardrailSpec,
    guardrail: Arc<dyn Guardrail>,
}

/// An assembled, ready-to-run pipeline for one `PipelineSpec`.
struct Resolved {
    spec: PipelineSpec,
    input: Vec<Bound>,
    output: Vec<Bound>,
}

impl Resolved {
    fn build(spec: &PipelineSpec, registry: &Registry) -> Result<Self, ConfigError> {
        let mut input = Self::bind(&spec.input, Stage::Input, registry)?;
        let mut output = Self::bind(&spec.output, Stage::Output, registry)?;

        if spec.order_by_performance_class {
            input.sort_by_key(|b| b.guardrail.performance_class());
            output.sort_by_key(|b| b.guardrail.performance_class());
        }

        Ok(Self {
            spec: spec.clone(),
            input,
            output,
        })
    }

    fn bind(specs: &[GuardrailSpec], stage: Stage, registry: &Registry) -> Result<Vec<Bound>, ConfigError> {
        specs
            .iter()
            .filter(|s| s.enabled && (s.stage == stage || s.stage == Stage::Both))
            .map(|s| {
                let guardrail = registry.build(s)?;
                Ok(Bound {
                    spec: s.clone(),
                    guardrail,
                })
            })
            .collect()
    }

    fn plan(&self, stage: Stage) -> &[Bound] {
        match stage {
            Stage::Input => &self.input,
            Stage::Output => &self.output,
            Stage::Both => unreachable!("a resolved plan is always queried for Input or Output"),
        }
    }
}

/// The merged verdict of running every guardrail in a stage's plan.
#[derive(Debug, Clone)]
pub struct AggregateResult {
    /// `true` iff any non-overridden guardrail with `action = block` fired.
    pub blocked: bool,
    /// Highest confidence among contributing (blocking or warning) results.
    pub confidence: f32,
    /// Highest risk level observed.
    pub risk_level: RiskLevel,
    /// Ordered names of guardrails that contributed to the final verdict —
    /// the blocking guardrail (or synthetic reason) first, if any.
    pub reasons: Vec<String>,
    /// Union of indicators from every guardrail that reported any.
    pub indicators: Vec<String>,
    /// Full per-guardrail results, in execution order, for audit logging.
    pub results: Vec<GuardrailResult>,
    /// Whether the pipeline was canceled by its own deadline.
    pub canceled: bool,
    /// Response text a configured [`RefusalPolicy`] chose for a blocked
    /// result — `None` when nothing blocked, or when the engine has no
    /// refusal policy attached.
    pub response_text: Option<String>,
    /// Highest confidence among results that actually blocked (not
    /// overridden by `warn`/`allow`). Tracked separately from `confidence`
    /// so a high-confidence warning can't inflate the reported confidence
    /// of a lower-confidence block.
    blocking_confidence: f32,
}

impl AggregateResult {
    fn clear() -> Self {
        Self {
            blocked: false,
            confidence: 0.0,
            risk_level: RiskLevel::None,
            reasons: Vec::new(),
            indicators: Vec::new(),
            results: Vec::new(),
            canceled: false,
            response_text: None,
            blocking_confidence: 0.0,
        }
    }

    fn record(&mut self, result: GuardrailResult, warn_only: bool) {
        if result.risk_level > self.risk_level {
            self.risk_level = result.risk_level;
        }
        if result.confidence > self.confidence {
            self.confidence = result.confidence;
        }
        self.indicators.extend(result.indicators.iter().cloned());
        if result.blocked {
            self.reasons.push(result.guardrail_name.clone());
            if !warn_only {
                self.blocked = true;
                if result.confidence > self.blocking_confidence {
                    self.blocking_confidence = result.confidence;
                }
            }
        }
        self.results.push(result);
    }

    /// Resolve the reported `confidence` now that every guardrail in the
    /// plan has run: the max among blocking detectors if the aggregate is
    /// blocked, the max overall otherwise (spec §4.2).
    fn finalize_confidence(&mut self) {
        if self.blocked {
            self.confidence = self.blocking_confidence;
        }
    }

    fn canceled_at(deadline_reason: &str) -> Self {
        let mut r = Self::clear();
        r.blocked = true;
        r.canceled = true;
        r.risk_level = RiskLevel::High;
        r.reasons.push(deadline_reason.to_string());
        r
    }
}

/// Errors that prevent engine assembly (not per-request failures).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A `GuardrailSpec` referenced an unknown or misconfigured detector type.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Orchestrates `check_input`/`check_output` calls against an assembled plan.
///
/// The active plan is held behind a `RwLock<Arc<_>>` so [`PipelineEngine::reload`]
/// can swap in a newly validated plan atomically: in-flight calls keep the
/// `Arc` they already cloned out and run to completion against it.
pub struct PipelineEngine {
    active: RwLock<Arc<Resolved>>,
    registry: Registry,
    health: HealthRegistry,
    refusal: Option<RefusalPolicy>,
}

impl PipelineEngine {
    /// Build an engine from a validated [`PipelineSpec`] and detector [`Registry`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if any declared guardrail type cannot be built
    /// (unknown `type` tag, or the detector's own construction-time validation
    /// fails — e.g. a missing required credential).
    pub fn build(spec: &PipelineSpec, registry: Registry) -> Result<Self, EngineError> {
        let resolved = Resolved::build(spec, &registry)?;
        let health = HealthRegistry::new();
        for bound in resolved.input.iter().chain(resolved.output.iter()) {
            health.declare(&bound.spec.name, bound.guardrail.performance_class());
        }
        Ok(Self {
            active: RwLock::new(Arc::new(resolved)),
            registry,
            health,
            refusal: None,
        })
    }

    /// Attach a [`RefusalPolicy`] that shapes the response text returned for
    /// blocked content (builder style). Without one, [`AggregateResult::response_text`]
    /// is always `None` and callers are responsible for their own messaging.
    #[must_use]
    pub fn with_refusal_policy(mut self, policy: RefusalPolicy) -> Self {
        self.refusal = Some(policy);
        self
    }

    /// A snapshot of per-detector counters, latency histograms, and
    /// declared-vs-observed performance class drift.
    #[must_use]
    pub fn health(&self) -> crate::health::HealthSnapshot {
        self.health.snapshot(None)
    }

    /// A health snapshot with audit-buffer depth and dropped-event count
    /// folded in, for callers (like [`crate::facade::Pipeline`]) that have
    /// an [`crate::audit::AuditHandle`] attached alongside this engine.
    #[must_use]
    pub fn health_with_audit(&self, buffer_depth: usize, dropped_events: u64) -> crate::health::HealthSnapshot {
        self.health.snapshot(Some((buffer_depth, dropped_events)))
    }

    /// Atomically replace the running plan with a freshly assembled one.
    ///
    /// The new plan is fully constructed and validated *before* the swap, so
    /// a failure here leaves the previously active plan untouched.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] under the same conditions as [`Self::build`].
    pub fn reload(&self, spec: &PipelineSpec) -> Result<(), EngineError> {
        let resolved = Arc::new(Resolved::build(spec, &self.registry)?);
        *self.active.write().expect("engine plan lock poisoned") = resolved;
        Ok(())
    }

    /// A clone of the `PipelineSpec` the active plan was built from.
    ///
    /// Intended for callers that want to inspect or incrementally amend the
    /// running configuration (see [`Self::update_guardrail`]) rather than
    /// holding their own copy of the spec alongside the engine.
    #[must_use]
    pub fn current_spec(&self) -> PipelineSpec {
        self.active.read().expect("engine plan lock poisoned").spec.clone()
    }

    /// Amend a single guardrail's `enabled` flag or `config` sub-map by name
    /// and atomically reload the pipeline against the result.
    ///
    /// Looks the name up in both the input and output lists (a guardrail
    /// declared `Stage::Both` lives in one list only; its spec is shared).
    /// The guardrail is rebuilt from its amended spec as part of the reload,
    /// so a bad `config` value surfaces as an [`EngineError`] here rather
    /// than corrupting the running plan.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if `name` is not declared anywhere in the
    /// active spec, or if the amended spec fails to build (propagated from
    /// [`Self::reload`]).
    pub fn update_guardrail(&self, name: &str, update: GuardrailUpdate) -> Result<(), EngineError> {
        let mut spec = self.current_spec();
        let mut found = false;
        for guardrail_spec in spec.input.iter_mut().chain(spec.output.iter_mut()) {
            if guardrail_spec.name == name {
                found = true;
                match &update {
                    GuardrailUpdate::Enabled(enabled) => guardrail_spec.enabled = *enabled,
                    GuardrailUpdate::Config(config) => guardrail_spec.config = config.clone(),
                }
            }
        }
        if !found {
            return Err(EngineError::Config(ConfigError::Semantic {
                message: format!("no guardrail named '{name}' in the active pipeline"),
            }));
        }
        self.reload(&spec)
    }

    /// Run the input pipeline against `content`.
    pub async fn check_input(&self, content: &Content, ctx: &AnalysisContext) -> AggregateResult {
        self.run(Stage::Input, content, ctx).await
    }

    /// Run the output pipeline against `content`.
    pub async fn check_output(&self, content: &Content, ctx: &AnalysisContext) -> AggregateResult {
        self.run(Stage::Output, content, ctx).await
    }

    async fn run(&self, stage: Stage, content: &Content, ctx: &AnalysisContext) -> AggregateResult {
        let plan = self.active.read().expect("engine plan lock poisoned").clone();
        let bounds = plan.plan(stage);

        let capped_ctx;
        let ctx = match plan.spec.pipeline_deadline() {
            Some(cap) => {
                capped_ctx = ctx.clone().capped_at(cap);
                &capped_ctx
            }
            None => ctx,
        };

        let mut aggregate = AggregateResult::clear();

        for bound in bounds {
            if ctx.is_expired() {
                tracing::warn!(stage = ?stage, "pipeline deadline exceeded before all guardrails ran");
                return AggregateResult::canceled_at("deadline");
            }

            let start = Instant::now();
            let outcome = bound.guardrail.analyze(content, ctx).await;
            let elapsed = start.elapsed();

            match outcome {
                Ok(mut result) => {
                    result = apply_threshold(result, bound.spec.confidence_threshold);
                    result.latency = elapsed;
                    self.health.record(&result);

                    let warn_only = match bound.spec.action {
                        Action::Block => false,
                        Action::Warn => true,
                        Action::Allow => {
                            // Advisory only: never contributes to `blocked`.
                            result.blocked = false;
                            aggregate.record(result, true);
                            continue;
                        }
                    };

                    if warn_only && result.blocked {
                        self.health.record_warning(&bound.spec.name);
                    }

                    let should_short_circuit = result.blocked && !warn_only;
                    aggregate.record(result, warn_only);
                    if should_short_circuit {
                        break;
                    }
                }
                Err(err) => {
                    self.health.record_error(&bound.spec.name);
                    if !apply_on_error(&mut aggregate, bound, err, elapsed) {
                        break;
                    }
                }
            }
        }

        aggregate.finalize_confidence();
        if aggregate.blocked {
            aggregate.response_text = self.resolve_refusal_text(&aggregate, ctx);
        }

        aggregate
    }

    /// Ask the attached [`RefusalPolicy`], if any, how a blocked aggregate
    /// should be communicated back to the caller.
    fn resolve_refusal_text(&self, aggregate: &AggregateResult, ctx: &AnalysisContext) -> Option<String> {
        let policy = self.refusal.as_ref()?;
        let reason = aggregate.reasons.first().cloned().unwrap_or_default();
        let severity: Severity = aggregate.risk_level.into();
        let outcome = StageOutcome::Block { reason, severity };
        policy.apply(&outcome, &ctx.security).map(|action| action.response_text)
    }
}

/// Clamp a raw result against the guardrail's configured threshold: a result
/// below threshold is demoted to non-blocking even if the detector itself
/// thought it was worth flagging.
fn apply_threshold(mut result: GuardrailResult, threshold: f32) -> GuardrailResult {
    if result.blocked && result.confidence < threshold {
        result.blocked = false;
    }
    result
}

/// Fold a guardrail error into the aggregate per its `on_error` policy.
///
/// Returns `false` when the pipeline should short-circuit (an error treated
/// as `Action::Block`-equivalent), `true` to continue to the next guardrail.
fn apply_on_error(aggregate: &mut AggregateResult, bound: &Bound, err: GuardrailError, elapsed: std::time::Duration) -> bool {
    let name = bound.spec.name.clone();
    let kind = bound.spec.kind.clone();

    match bound.spec.on_error {
        OnError::Block => {
            tracing::warn!(guardrail = %name, error = %err, "guardrail error treated as block");
            let result = GuardrailResult::blocking(
                name,
                kind,
                1.0,
                RiskLevel::High,
                format!("detector_error:{err}"),
            )
            .with_latency(elapsed);
            aggregate.record(result, false);
            false
        }
        OnError::Warn => {
            tracing::warn!(guardrail = %name, error = %err, "guardrail error recorded as warning");
            let result = GuardrailResult::blocking(name, kind, 0.5, RiskLevel::Medium, format!("detector_error:{err}"))
                .with_latency(elapsed);
            aggregate.record(result, true);
            true
        }
        OnError::Allow => {
            tracing::debug!(guardrail = %name, error = %err, "guardrail error ignored by policy");
            true
        }
        OnError::Skip => {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::spec::{Action, OnError, Stage};
    use crate::pipeline::content::Content;
    use async_trait::async_trait;

    struct Always {
        kind: &'static str,
        blocked: bool,
        risk: RiskLevel,
    }

    #[async_trait]
    impl Guardrail for Always {
        fn name(&self) -> &str {
            self.kind
        }
        fn kind(&self) -> &str {
            self.kind
        }
        async fn analyze(
            &self,
            _content: &Content,
            _ctx: &AnalysisContext,
        ) -> Result<GuardrailResult, GuardrailError> {
            if self.blocked {
                Ok(GuardrailResult::blocking(self.kind, self.kind, 0.95, self.risk, "matched"))
            } else {
                Ok(GuardrailResult::clear(self.kind, self.kind))
            }
        }
    }

    struct Confident {
        name: &'static str,
        kind: &'static str,
        confidence: f32,
        blocked: bool,
    }

    #[async_trait]
    impl Guardrail for Confident {
        fn name(&self) -> &str {
            self.name
        }
        fn kind(&self) -> &str {
            self.kind
        }
        async fn analyze(
            &self,
            _content: &Content,
            _ctx: &AnalysisContext,
        ) -> Result<GuardrailResult, GuardrailError> {
            if self.blocked {
                Ok(GuardrailResult::blocking(
                    self.name,
                    self.kind,
                    self.confidence,
                    RiskLevel::Medium,
                    "matched",
                ))
            } else {
                Ok(GuardrailResult::clear(self.name, self.kind))
            }
        }
    }

    struct AlwaysErrors;

    #[async_trait]
    impl Guardrail for AlwaysErrors {
        fn name(&self) -> &str {
            "flaky"
        }
        fn kind(&self) -> &str {
            "flaky"
        }
        async fn analyze(
            &self,
            _content: &Content,
            _ctx: &AnalysisContext,
        ) -> Result<GuardrailResult, GuardrailError> {
            Err(GuardrailError::Unavailable {
                guardrail: "flaky".into(),
                reason: "down".into(),
            })
        }
    }

    fn spec(name: &str, kind: &str, action: Action, on_error: OnError) -> GuardrailSpec {
        GuardrailSpec {
            name: name.into(),
            kind: kind.into(),
            enabled: true,
            stage: Stage::Input,
            action,
            confidence_threshold: 0.8,
            on_error,
            timeout_ms: 1000,
            config: serde_json::Value::Null,
        }
    }

    fn registry_with(kind: &'static str, blocked: bool, risk: RiskLevel) -> Registry {
        let mut registry = Registry::new();
        registry.register(kind, move |_s| Ok(Arc::new(Always { kind, blocked, risk })));
        registry
    }

    #[tokio::test]
    async fn block_action_short_circuits() {
        let registry = registry_with("bad", true, RiskLevel::High);
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![spec("bad_check", "bad", Action::Block, OnError::Block)],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry).unwrap();
        let ctx = AnalysisContext::new(Stage::Input, crate::pipeline::stage::SecurityContext::default());
        let result = engine.check_input(&Content::Text("x".into()), &ctx).await;
        assert!(result.blocked);
        assert_eq!(result.reasons, vec!["bad_check".to_string()]);
    }

    #[tokio::test]
    async fn warn_action_never_blocks_but_is_recorded() {
        let registry = registry_with("toxic", true, RiskLevel::Medium);
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![spec("toxicity", "toxic", Action::Warn, OnError::Block)],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry).unwrap();
        let ctx = AnalysisContext::new(Stage::Input, crate::pipeline::stage::SecurityContext::default());
        let result = engine.check_input(&Content::Text("x".into()), &ctx).await;
        assert!(!result.blocked);
        assert_eq!(result.reasons, vec!["toxicity".to_string()]);
    }

    #[tokio::test]
    async fn blocked_confidence_ignores_higher_confidence_warnings() {
        let mut registry = Registry::new();
        registry.register("loud", |_s| {
            Ok(Arc::new(Confident {
                name: "loud_warn",
                kind: "loud",
                confidence: 0.99,
                blocked: true,
            }))
        });
        registry.register("quiet", |_s| {
            Ok(Arc::new(Confident {
                name: "quiet_block",
                kind: "quiet",
                confidence: 0.85,
                blocked: true,
            }))
        });
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![
                spec("loud_warn", "loud", Action::Warn, OnError::Block),
                spec("quiet_block", "quiet", Action::Block, OnError::Block),
            ],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry).unwrap();
        let ctx = AnalysisContext::new(Stage::Input, crate::pipeline::stage::SecurityContext::default());
        let result = engine.check_input(&Content::Text("x".into()), &ctx).await;
        assert!(result.blocked);
        assert_eq!(result.confidence, 0.85);
    }

    #[tokio::test]
    async fn unblocked_confidence_is_max_overall() {
        let mut registry = Registry::new();
        registry.register("loud", |_s| {
            Ok(Arc::new(Confident {
                name: "loud_warn",
                kind: "loud",
                confidence: 0.99,
                blocked: true,
            }))
        });
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![spec("loud_warn", "loud", Action::Warn, OnError::Block)],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry).unwrap();
        let ctx = AnalysisContext::new(Stage::Input, crate::pipeline::stage::SecurityContext::default());
        let result = engine.check_input(&Content::Text("x".into()), &ctx).await;
        assert!(!result.blocked);
        assert_eq!(result.confidence, 0.99);
    }

    #[tokio::test]
    async fn allow_action_is_advisory_only() {
        let registry = registry_with("monitor", true, RiskLevel::Low);
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![spec("monitor", "monitor", Action::Allow, OnError::Block)],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry).unwrap();
        let ctx = AnalysisContext::new(Stage::Input, crate::pipeline::stage::SecurityContext::default());
        let result = engine.check_input(&Content::Text("x".into()), &ctx).await;
        assert!(!result.blocked);
    }

    #[tokio::test]
    async fn on_error_block_synthesizes_blocking_result() {
        let mut registry = Registry::new();
        registry.register("flaky", |_s| Ok(Arc::new(AlwaysErrors)));
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![spec("flaky_check", "flaky", Action::Block, OnError::Block)],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry).unwrap();
        let ctx = AnalysisContext::new(Stage::Input, crate::pipeline::stage::SecurityContext::default());
        let result = engine.check_input(&Content::Text("x".into()), &ctx).await;
        assert!(result.blocked);
        assert!(result.reasons[0].contains("flaky_check"));
    }

    #[tokio::test]
    async fn on_error_skip_continues_silently() {
        let mut registry = Registry::new();
        registry.register("flaky", |_s| Ok(Arc::new(AlwaysErrors)));
        registry.register("safe", |_s| Ok(Arc::new(Always { kind: "safe", blocked: false, risk: RiskLevel::None })));
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![
                spec("flaky_check", "flaky", Action::Block, OnError::Skip),
                spec("safe_check", "safe", Action::Block, OnError::Block),
            ],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry).unwrap();
        let ctx = AnalysisContext::new(Stage::Input, crate::pipeline::stage::SecurityContext::default());
        let result = engine.check_input(&Content::Text("x".into()), &ctx).await;
        assert!(!result.blocked);
        assert_eq!(result.results.len(), 1);
    }

    #[tokio::test]
    async fn expired_deadline_cancels_before_next_guardrail() {
        let registry = registry_with("safe", false, RiskLevel::None);
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![spec("safe_check", "safe", Action::Block, OnError::Block)],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry).unwrap();
        let ctx = AnalysisContext::new(Stage::Input, crate::pipeline::stage::SecurityContext::default())
            .with_deadline(std::time::Duration::from_millis(0));
        std::thread::sleep(std::time::Duration::from_millis(5));
        let result = engine.check_input(&Content::Text("x".into()), &ctx).await;
        assert!(result.canceled);
        assert_eq!(result.reasons, vec!["deadline".to_string()]);
    }

    struct Slow(std::time::Duration);

    #[async_trait]
    impl Guardrail for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn kind(&self) -> &str {
            "slow"
        }
        async fn analyze(
            &self,
            _content: &Content,
            _ctx: &AnalysisContext,
        ) -> Result<GuardrailResult, GuardrailError> {
            tokio::time::sleep(self.0).await;
            Ok(GuardrailResult::clear("slow", "slow"))
        }
    }

    #[tokio::test]
    async fn spec_level_pipeline_deadline_cancels_without_caller_deadline() {
        let mut registry = Registry::new();
        registry.register("slow", |_s| Ok(Arc::new(Slow(std::time::Duration::from_millis(20)))));
        registry.register("safe", |_s| Ok(Arc::new(Always { kind: "safe", blocked: false, risk: RiskLevel::None })));
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![
                spec("slow_check", "slow", Action::Block, OnError::Block),
                spec("safe_check", "safe", Action::Block, OnError::Block),
            ],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: Some(1),
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry).unwrap();
        let ctx = AnalysisContext::new(Stage::Input, crate::pipeline::stage::SecurityContext::default());
        let result = engine.check_input(&Content::Text("x".into()), &ctx).await;
        assert!(result.canceled);
        assert_eq!(result.reasons, vec!["deadline".to_string()]);
    }

    #[tokio::test]
    async fn reload_swaps_plan_atomically() {
        let registry = registry_with("safe", false, RiskLevel::None);
        let v1 = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![spec("safe_check", "safe", Action::Block, OnError::Block)],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&v1, registry.clone()).unwrap();
        let v2 = PipelineSpec {
            input: vec![],
            ..v1
        };
        engine.reload(&v2).unwrap();
        let ctx = AnalysisContext::new(Stage::Input, crate::pipeline::stage::SecurityContext::default());
        let result = engine.check_input(&Content::Text("x".into()), &ctx).await;
        assert!(result.results.is_empty());
    }

    #[tokio::test]
    async fn blocked_result_has_no_response_text_without_a_refusal_policy() {
        let registry = registry_with("bad", true, RiskLevel::High);
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![spec("bad_check", "bad", Action::Block, OnError::Block)],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry).unwrap();
        let ctx = AnalysisContext::new(Stage::Input, crate::pipeline::stage::SecurityContext::default());
        let result = engine.check_input(&Content::Text("x".into()), &ctx).await;
        assert!(result.blocked);
        assert!(result.response_text.is_none());
    }

    #[tokio::test]
    async fn attached_refusal_policy_shapes_blocked_response_text() {
        let registry = registry_with("bad", true, RiskLevel::Critical);
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![spec("bad_check", "bad", Action::Block, OnError::Block)],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry)
            .unwrap()
            .with_refusal_policy(RefusalPolicy::with_defaults());
        let ctx = AnalysisContext::new(Stage::Input, crate::pipeline::stage::SecurityContext::default());
        let result = engine.check_input(&Content::Text("x".into()), &ctx).await;
        assert!(result.blocked);
        assert_eq!(
            result.response_text.as_deref(),
            Some("Request blocked: critical severity threat detected")
        );
    }

    #[tokio::test]
    async fn refusal_policy_leaves_non_blocking_results_untouched() {
        let registry = registry_with("safe", false, RiskLevel::None);
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![spec("safe_check", "safe", Action::Block, OnError::Block)],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry)
            .unwrap()
            .with_refusal_policy(RefusalPolicy::with_defaults());
        let ctx = AnalysisContext::new(Stage::Input, crate::pipeline::stage::SecurityContext::default());
        let result = engine.check_input(&Content::Text("x".into()), &ctx).await;
        assert!(!result.blocked);
        assert!(result.response_text.is_none());
    }

    #[tokio::test]
    async fn update_guardrail_disables_by_name() {
        let registry = registry_with("bad", true, RiskLevel::High);
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![spec("bad_check", "bad", Action::Block, OnError::Block)],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry).unwrap();
        engine.update_guardrail("bad_check", GuardrailUpdate::Enabled(false)).unwrap();

        let ctx = AnalysisContext::new(Stage::Input, crate::pipeline::stage::SecurityContext::default());
        let result = engine.check_input(&Content::Text("x".into()), &ctx).await;
        assert!(!result.blocked);
        assert!(result.results.is_empty());
        assert!(!engine.current_spec().input[0].enabled);
    }

    #[tokio::test]
    async fn update_guardrail_replaces_config() {
        let registry = registry_with("bad", true, RiskLevel::High);
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![spec("bad_check", "bad", Action::Block, OnError::Block)],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry).unwrap();
        let new_config = serde_json::json!({"patterns": ["ssn"]});
        engine
            .update_guardrail("bad_check", GuardrailUpdate::Config(new_config.clone()))
            .unwrap();
        assert_eq!(engine.current_spec().input[0].config, new_config);
    }

    #[test]
    fn update_guardrail_unknown_name_is_an_error() {
        let registry = registry_with("bad", true, RiskLevel::High);
        let pipeline_spec = PipelineSpec {
            version: "1.0".into(),
            preset: None,
            input: vec![spec("bad_check", "bad", Action::Block, OnError::Block)],
            output: vec![],
            order_by_performance_class: false,
            pipeline_deadline_ms: None,
        };
        let engine = PipelineEngine::build(&pipeline_spec, registry).unwrap();
        assert!(engine
            .update_guardrail("does_not_exist", GuardrailUpdate::Enabled(false))
            .is_err());
    }
}

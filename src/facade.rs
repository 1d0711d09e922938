//! `Pipeline` — the single entry point a host application drives: build it
//! from a named preset or a configuration document, then push every turn
//! through [`Pipeline::check_input`]/[`Pipeline::check_output`].
//!
//! Everything this module does is composition. [`crate::guardrail::engine::PipelineEngine`]
//! already owns dispatch, short-circuit, and aggregation; [`crate::audit::AuditHandle`]
//! already owns non-blocking event buffering. `Pipeline` just ties the two
//! together the way the public surface in the crate's design notes describes:
//! a `user_prompt`/`llm_response` audit event ahead of a call's
//! `guardrail_decision` events, so a caller gets the full audit trail for
//! free instead of having to wire the engine and the audit subsystem by hand.

use crate::audit::{AuditEvent, AuditHandle, EventType};
use crate::config::loader::{self, DocumentFormat};
use crate::config::presets;
use crate::config::ConfigError;
use crate::guardrail::engine::{AggregateResult, EngineError, GuardrailUpdate, PipelineEngine};
use crate::guardrail::registry::Registry;
use crate::guardrail::spec::{PipelineSpec, Stage};
use crate::guardrail::AnalysisContext;
use crate::health::HealthSnapshot;
use crate::pipeline::content::Content;
use crate::pipeline::stage::SecurityContext;
use crate::prompt::refusal::RefusalPolicy;

/// Errors building a [`Pipeline`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineBuildError {
    /// The named preset, config document, or a declared guardrail's config
    /// failed one of the config loader's validation levels.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The validated spec failed to assemble into a running plan.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Composes a [`PipelineEngine`] with an optional [`AuditHandle`] so every
/// `check_input`/`check_output` call produces both a verdict and a complete
/// audit trail in one step.
///
/// Conversation state is deliberately *not* owned here: the `rate_limit`
/// guardrail (if configured) already shares a [`crate::conversation::ConversationStore`]
/// through the registry, and turn bookkeeping belongs to the caller, who
/// alone knows when a prompt/response exchange actually completed.
pub struct Pipeline {
    engine: PipelineEngine,
    audit: Option<AuditHandle>,
}

impl Pipeline {
    /// Build a pipeline from one of the engine's bundled presets
    /// (`basic`, `customer_service`, `medical`, `financial`, `educational`).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineBuildError`] if `name` is not a known preset, or if
    /// assembling its guardrails fails (this should not happen for an
    /// unmodified bundled preset).
    pub fn from_preset(name: &str) -> Result<Self, PipelineBuildError> {
        let spec = presets::by_name(name)?;
        Self::from_spec(&spec)
    }

    /// Build a pipeline from a preset merged with a user overlay.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineBuildError`] under the same conditions as
    /// [`Self::from_preset`].
    pub fn from_preset_with_overlay(name: &str, overlay: &presets::PipelineOverlay) -> Result<Self, PipelineBuildError> {
        let preset = presets::by_name(name)?;
        let spec = presets::merge(&preset, overlay);
        Self::from_spec(&spec)
    }

    /// Parse, schema-validate, and semantically validate a configuration
    /// document, then build a pipeline from it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineBuildError`] at whichever validation level first
    /// rejects the document (syntax, schema, or semantic — level 4, runtime
    /// reachability, is advisory and left to [`loader::validate_runtime`]).
    pub fn from_config(document: &str, format: DocumentFormat) -> Result<Self, PipelineBuildError> {
        let registry = Registry::default_with_builtins();
        let spec = loader::parse_document(document, format)?;
        loader::validate_schema(&spec)?;
        loader::validate_semantic(&spec, &registry)?;
        let engine = PipelineEngine::build(&spec, registry)?;
        Ok(Self { engine, audit: None })
    }

    fn from_spec(spec: &PipelineSpec) -> Result<Self, PipelineBuildError> {
        let registry = Registry::default_with_builtins();
        let engine = PipelineEngine::build(spec, registry)?;
        Ok(Self { engine, audit: None })
    }

    /// Attach an [`AuditHandle`] (builder style). Without one, `check_input`/
    /// `check_output` still run the pipeline but produce no audit events.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Attach a [`RefusalPolicy`] (builder style), forwarded to the
    /// underlying [`PipelineEngine`] so blocked results carry response text.
    #[must_use]
    pub fn with_refusal_policy(mut self, policy: RefusalPolicy) -> Self {
        self.engine = self.engine.with_refusal_policy(policy);
        self
    }

    /// Run the input pipeline against `content`, emitting a `user_prompt`
    /// audit event ahead of every guardrail's `guardrail_decision` event.
    pub async fn check_input(&self, content: &str, conversation_id: Option<&str>) -> AggregateResult {
        self.check(Stage::Input, EventType::UserPrompt, content, conversation_id).await
    }

    /// Run the output pipeline against `content`, emitting an `llm_response`
    /// audit event ahead of every guardrail's `guardrail_decision` event.
    pub async fn check_output(&self, content: &str, conversation_id: Option<&str>) -> AggregateResult {
        self.check(Stage::Output, EventType::LlmResponse, content, conversation_id).await
    }

    async fn check(&self, stage: Stage, entry_event: EventType, content: &str, conversation_id: Option<&str>) -> AggregateResult {
        let mut ctx = AnalysisContext::new(stage, SecurityContext::default());
        if let Some(id) = conversation_id {
            ctx = ctx.with_conversation(id);
        }

        self.emit(entry_event, conversation_id, |event| event.with_content(content.to_string()));

        let content_value = Content::Text(content.to_string());
        let result = match stage {
            Stage::Input => self.engine.check_input(&content_value, &ctx).await,
            Stage::Output => self.engine.check_output(&content_value, &ctx).await,
            Stage::Both => unreachable!("a pipeline call always checks one concrete stage"),
        };

        if result.canceled {
            self.emit(EventType::GuardrailDecision, conversation_id, |event| {
                event.with_decision("pipeline", "block", "deadline", result.confidence, result.indicators.clone())
            });
        }
        for detector_result in &result.results {
            let decision = if detector_result.blocked { "block" } else { "allow" };
            self.emit(EventType::GuardrailDecision, conversation_id, |event| {
                event.with_decision(
                    detector_result.guardrail_name.clone(),
                    decision,
                    detector_result.reason.clone(),
                    detector_result.confidence,
                    detector_result.indicators.clone(),
                )
            });
        }

        result
    }

    fn emit(&self, event_type: EventType, conversation_id: Option<&str>, build: impl FnOnce(AuditEvent) -> AuditEvent) {
        let Some(audit) = &self.audit else {
            return;
        };
        let mut event = build(AuditEvent::new(event_type));
        if let Some(id) = conversation_id {
            event = event.with_conversation(id);
        }
        audit.enqueue(event);
    }

    /// Amend a single named guardrail's `enabled` flag or `config` sub-map
    /// and atomically reload the running plan against the result.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if no guardrail named `name` is declared, or
    /// if the amended spec fails to rebuild.
    pub fn update_guardrail(&self, name: &str, update: GuardrailUpdate) -> Result<(), EngineError> {
        self.engine.update_guardrail(name, update)
    }

    /// A snapshot of per-detector counters, latency histograms,
    /// circuit-breaker state, and (when an audit handle is attached) audit
    /// buffer depth and dropped-event count.
    #[must_use]
    pub fn health(&self) -> HealthSnapshot {
        match &self.audit {
            Some(audit) => self.engine.health_with_audit(audit.depth(), audit.dropped_events()),
            None => self.engine.health(),
        }
    }
}

//! The guardrail contract: the single capability every detector implements,
//! plus the declarative types that describe how detectors are assembled into
//! a pipeline.
//!
//! ```text
//! PipelineSpec ─┬─► GuardrailSpec ─► registry::build() ─► Arc<dyn Guardrail>
//!               │
//!               └─► PipelineEngine::build() ─► check_input()/check_output()
//! ```
//!
//! This sits one layer above [`crate::pipeline`]'s `GuardrailStage` /
//! `PipelineExecutor` pair: that substrate is a generic, binary-outcome
//! content-inspection framework; this module is the richer, spec-shaped
//! contract (per-guardrail `action`/`on_error`, a flat [`GuardrailResult`])
//! that the rest of the engine is built around. A couple of bundled
//! detectors adapt a `GuardrailStage` into a `Guardrail` rather than
//! duplicating its pattern-matching logic (see [`crate::detectors::support`]).

pub mod engine;
pub mod error;
pub mod registry;
pub mod result;
pub mod spec;

use async_trait::async_trait;
use std::time::{Duration, Instant};

pub use error::GuardrailError;
pub use result::{GuardrailResult, RiskLevel};
pub use spec::{Action, GuardrailSpec, OnError, PerformanceClass, PipelineSpec, Stage};

use crate::pipeline::content::Content;
use crate::pipeline::stage::SecurityContext;

/// Everything a guardrail needs beyond the content itself: which stage it is
/// running in, the conversation it belongs to (if any), the identity/risk
/// context, and a deadline for cooperative cancellation.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    /// Input or output.
    pub stage: Stage,
    /// Conversation this call belongs to, if the caller is tracking one.
    pub conversation_id: Option<String>,
    /// Session identity and accumulated risk score.
    pub security: SecurityContext,
    /// Absolute deadline for the whole pipeline call, if any.
    deadline: Option<Instant>,
}

impl AnalysisContext {
    /// Build a context for a given stage with no deadline.
    #[must_use]
    pub fn new(stage: Stage, security: SecurityContext) -> Self {
        Self {
            stage,
            conversation_id: None,
            security,
            deadline: None,
        }
    }

    /// Attach a conversation id (builder style).
    #[must_use]
    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// Attach a deadline measured from now (builder style).
    #[must_use]
    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Tighten the deadline to at most `cap` from now, without loosening one
    /// the caller already set. Used by [`engine::PipelineEngine`] to apply a
    /// `PipelineSpec`'s pipeline-wide deadline on top of whatever deadline
    /// (if any) the caller attached to the context.
    #[must_use]
    pub(crate) fn capped_at(mut self, cap: Duration) -> Self {
        let candidate = Instant::now() + cap;
        self.deadline = Some(self.deadline.map_or(candidate, |d| d.min(candidate)));
        self
    }

    /// Time remaining until the deadline, or `None` if there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has already passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// A single composable content-inspection check.
///
/// Unlike [`GuardrailStage`](crate::pipeline::stage::GuardrailStage), which
/// returns a terminal [`StageOutcome`](crate::pipeline::outcome::StageOutcome),
/// a `Guardrail` always returns a descriptive [`GuardrailResult`] — the
/// engine, not the guardrail, decides what a blocking result *does* to the
/// pipeline (via the guardrail's declared [`Action`]).
#[async_trait]
pub trait Guardrail: Send + Sync {
    /// Stable instance name (matches the owning [`GuardrailSpec::name`]).
    fn name(&self) -> &str;

    /// Registry `type` tag (matches the owning [`GuardrailSpec::kind`]).
    fn kind(&self) -> &str;

    /// Analyze `content` and report a verdict.
    ///
    /// # Errors
    ///
    /// Returns [`GuardrailError`] if analysis could not complete. The engine
    /// consults the guardrail's configured [`OnError`] policy to decide how
    /// to fold the failure into the aggregate result.
    async fn analyze(
        &self,
        content: &Content,
        ctx: &AnalysisContext,
    ) -> Result<GuardrailResult, GuardrailError>;

    /// Declared latency band, used for opt-in ordering and performance tests.
    fn performance_class(&self) -> PerformanceClass {
        PerformanceClass::Fast
    }
}

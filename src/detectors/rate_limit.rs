//! Rate Limit guardrail — wraps [`ConversationStore::rate_check`] as a
//! `Guardrail`, so per-minute/per-hour budgets participate in the ordinary
//! pipeline dispatch, short-circuit, and audit flow like any other detector.

use async_trait::async_trait;

use crate::conversation::{ConversationStore, RateCheckOutcome};
use crate::guardrail::result::{GuardrailResult, RiskLevel};
use crate::guardrail::{AnalysisContext, Guardrail, GuardrailError, PerformanceClass};

/// Applies a shared [`ConversationStore`]'s rate limiter to the context's
/// `conversation_id`. A call with no conversation id always passes — rate
/// limiting is meaningless outside a tracked conversation.
pub struct RateLimitGuardrail {
    name: String,
    store: std::sync::Arc<ConversationStore>,
}

impl RateLimitGuardrail {
    /// Construct against a shared conversation store. The store, not this
    /// detector's `config`, owns the per-minute/per-hour capacities (they
    /// are set when a conversation is opened).
    #[must_use]
    pub fn new(name: impl Into<String>, store: std::sync::Arc<ConversationStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }
}

#[async_trait]
impl Guardrail for RateLimitGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "rate_limit"
    }

    async fn analyze(
        &self,
        _content: &crate::pipeline::content::Content,
        ctx: &AnalysisContext,
    ) -> Result<GuardrailResult, GuardrailError> {
        let Some(id) = ctx.conversation_id.as_deref() else {
            return Ok(GuardrailResult::clear(&self.name, self.kind()));
        };

        match self.store.rate_check(id) {
            Ok(RateCheckOutcome::Ok) => Ok(GuardrailResult::clear(&self.name, self.kind())),
            Ok(RateCheckOutcome::Throttled(reason)) => Ok(GuardrailResult::blocking(
                &self.name,
                self.kind(),
                1.0,
                RiskLevel::Medium,
                reason,
            )),
            Err(_) => {
                // Unknown conversation id: nothing to throttle against.
                Ok(GuardrailResult::clear(&self.name, self.kind()))
            }
        }
    }

    fn performance_class(&self) -> PerformanceClass {
        PerformanceClass::Instant
    }
}

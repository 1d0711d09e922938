//! Error type returned by a [`Guardrail`](super::Guardrail)'s `analyze` call.
//!
//! Distinct from a blocking [`GuardrailResult`](super::GuardrailResult) — this
//! means the guardrail *could not complete its analysis at all*.  The engine
//! consults the guardrail's declared `on_error` policy to decide how to
//! fold the failure into the aggregate result.

use thiserror::Error;

/// Failure modes for a single guardrail invocation.
#[derive(Debug, Error)]
pub enum GuardrailError {
    /// The guardrail's backing service (model provider, classifier) is unreachable.
    #[error("guardrail '{guardrail}' unavailable: {reason}")]
    Unavailable {
        /// Guardrail instance name.
        guardrail: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The content could not be analyzed in its current shape.
    #[error("guardrail '{guardrail}' received invalid content: {reason}")]
    InvalidContent {
        /// Guardrail instance name.
        guardrail: String,
        /// What was wrong.
        reason: String,
    },

    /// The call exceeded its timeout or the pipeline deadline.
    #[error("guardrail '{guardrail}' timed out after {elapsed_ms}ms")]
    Timeout {
        /// Guardrail instance name.
        guardrail: String,
        /// Elapsed time before the timeout fired.
        elapsed_ms: u64,
    },

    /// The circuit breaker for this guardrail's upstream is open.
    #[error("circuit open for guardrail '{guardrail}' upstream '{upstream}'")]
    CircuitOpen {
        /// Guardrail instance name.
        guardrail: String,
        /// Upstream identifier the breaker tracks.
        upstream: String,
    },

    /// Catch-all for unexpected failures.
    #[error("internal error in guardrail '{guardrail}': {source}")]
    Internal {
        /// Guardrail instance name.
        guardrail: String,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl GuardrailError {
    /// The guardrail name this error is attributed to, for log correlation.
    #[must_use]
    pub fn guardrail(&self) -> &str {
        match self {
            Self::Unavailable { guardrail, .. }
            | Self::InvalidContent { guardrail, .. }
            | Self::Timeout { guardrail, .. }
            | Self::CircuitOpen { guardrail, .. }
            | Self::Internal { guardrail, .. } => guardrail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guardrail_name_extracted_from_every_variant() {
        let err = GuardrailError::Timeout {
            guardrail: "model_pii".into(),
            elapsed_ms: 250,
        };
        assert_eq!(err.guardrail(), "model_pii");
    }

    #[test]
    fn display_includes_context() {
        let err = GuardrailError::CircuitOpen {
            guardrail: "model_toxicity".into(),
            upstream: "moderation-api".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("model_toxicity"));
        assert!(msg.contains("moderation-api"));
    }
}

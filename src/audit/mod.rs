//! The audit subsystem: non-blocking, PII-redacted, structured event logging
//! of every pipeline decision.
//!
//! The pipeline engine never blocks on audit I/O. [`AuditHandle::enqueue`]
//! pushes into a bounded in-memory buffer; a background consumer task drains
//! it, redacts PII, serializes to line-delimited JSON, and appends to a
//! [`sink::AuditSink`]. A full buffer drops the oldest event rather than the
//! newest, counted in [`AuditSubsystem::dropped_events`].

pub mod sink;
pub mod subsystem;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub use subsystem::{AuditHandle, AuditSubsystem};

/// Schema version stamped on every emitted event.
pub const SCHEMA_VERSION: &str = "audit.v1";

/// The kind of occurrence an [`AuditEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A user-supplied prompt entered the input pipeline.
    UserPrompt,
    /// A model-produced response entered the output pipeline.
    LlmResponse,
    /// A single guardrail reached a decision.
    GuardrailDecision,
    /// The active `PipelineSpec` was reloaded.
    ConfigChange,
    /// The audit subsystem itself was enabled or reconfigured.
    AuditEnabled,
}

/// An immutable, structured record of one pipeline-relevant occurrence.
///
/// Serializes to a line-delimited JSON shape; every field
/// beyond `schema`, `timestamp`, and `event_type` is optional because not
/// every event type populates every field (e.g. `user_prompt` events carry
/// no `decision`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Schema version — always [`SCHEMA_VERSION`] for events this crate emits.
    pub schema: String,
    /// Wall-clock time the event was produced (not when it was written).
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Conversation this event belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// What kind of occurrence this is.
    pub event_type: EventType,
    /// The guardrail instance name, for `guardrail_decision` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_name: Option<String>,
    /// `"block"`, `"warn"`, or `"allow"`, for `guardrail_decision` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    /// Short human-readable reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Confidence reported by the guardrail, if applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Matched indicators, if applicable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indicators: Vec<String>,
    /// PII-redacted projection of the inspected content, populated by the
    /// consumer at write time (never by the producer — see [`subsystem`]).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redacted_content: Option<String>,
    /// Freeform structured metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AuditEvent {
    /// Build a bare event of the given type, stamped with the current time
    /// and this crate's schema version. Callers attach the rest via the
    /// `with_*` builders.
    #[must_use]
    pub fn new(event_type: EventType) -> Self {
        Self {
            schema: SCHEMA_VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            conversation_id: None,
            event_type,
            filter_name: None,
            decision: None,
            reason: None,
            confidence: None,
            indicators: Vec::new(),
            redacted_content: None,
            metadata: HashMap::new(),
        }
    }

    /// Attach a conversation id (builder style).
    #[must_use]
    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// Attach a guardrail decision (builder style).
    #[must_use]
    pub fn with_decision(
        mut self,
        filter_name: impl Into<String>,
        decision: impl Into<String>,
        reason: impl Into<String>,
        confidence: f32,
        indicators: Vec<String>,
    ) -> Self {
        self.filter_name = Some(filter_name.into());
        self.decision = Some(decision.into());
        self.reason = Some(reason.into());
        self.confidence = Some(confidence);
        self.indicators = indicators;
        self
    }

    /// Attach the raw content that will be PII-redacted by the consumer.
    ///
    /// The producer stores it unredacted here; [`subsystem`] redacts it
    /// in-place before the event ever reaches a sink.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.redacted_content = Some(content.into());
        self
    }

    /// Attach a single metadata field (builder style).
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Errors the audit subsystem can surface. Sink errors are retried
/// internally and never propagated to the pipeline — this type exists
/// for [`sink::AuditSink`] implementations and for Health/Metrics reporting.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink could not accept an event after exhausting its retry budget.
    #[error("audit sink '{sink}' failed: {reason}")]
    SinkWrite {
        /// Sink identifier, for log correlation.
        sink: String,
        /// Underlying reason.
        reason: String,
    },
    /// An event could not be serialized (should not happen for well-formed
    /// [`AuditEvent`] values; surfaced defensively).
    #[error("failed to serialize audit event: {0}")]
    Serialize(#[from] serde_json::Error),
}

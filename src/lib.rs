//! ```text
//! PipelineSpec ─┬─► config::loader ──► schema + semantic validation
//!               │
//!               └─► guardrail::Registry ─► guardrail::PipelineEngine
//!                                            │
//!                                            ├─► detectors (pattern + model-assisted)
//!                                            ├─► conversation::ConversationStore (rate limits, history)
//!                                            ├─► resilience (timeout, retry, circuit breaker)
//!                                            ├─► audit::AuditSubsystem (async, PII-redacted)
//!                                            └─► health::HealthRegistry (counters, latency, breaker state)
//! ```
//!
//! # guardrail-engine
//!
//! **Configurable guardrail pipeline engine for LLM applications.**
//!
//! `guardrail-engine` assembles ordered input/output guardrail pipelines from
//! declarative [`PipelineSpec`](guardrail::spec::PipelineSpec) documents,
//! dispatches content through them with short-circuit and warn-and-continue
//! semantics, and wraps every guardrail in the same resilience and audit
//! machinery regardless of whether it is a local pattern match or a remote
//! model call.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use guardrail_engine::prelude::*;
//!
//! let spec = config::presets::basic();
//! let registry = Registry::default_with_builtins();
//! let engine = PipelineEngine::build(&spec, registry)?;
//!
//! let ctx = AnalysisContext::new(Stage::Input, SecurityContext::default());
//! let result = engine.check_input(&Content::Text("hello".into()), &ctx).await;
//! assert!(!result.blocked);
//! ```
//!
//! ## Key Features
//!
//! - **Ordered dispatch, short-circuit, aggregation** – [`guardrail::engine::PipelineEngine`]
//! - **Bundled detector library** – pattern-based and model-assisted, see [`detectors`]
//! - **Conversation state & rate limiting** – [`conversation::ConversationStore`]
//! - **Resilience** – per-upstream timeout, bounded retry, circuit breaker ([`resilience`])
//! - **Audit** – async, PII-redacted, structured event logging ([`audit`])
//! - **Health & Metrics** – per-detector counters, latency bands, breaker state ([`health`])
//! - **Config loading** – schema/semantic-validated YAML/TOML/JSON, named presets ([`config`])
//!
//! ## Modules
//!
//! - [`facade`] – [`facade::Pipeline`], the single entry point combining the
//!   engine with audit emission (`from_preset`/`from_config`/`check_input`/
//!   `check_output`/`update_guardrail`/`health`)
//! - [`guardrail`] – the `Guardrail` contract, spec types, registry, and pipeline engine
//! - [`detectors`] – bundled guardrail implementations
//! - [`conversation`] – per-conversation history and rate-limit state
//! - [`resilience`] – timeout, retry, and circuit-breaker wrapper
//! - [`audit`] – async audit event buffering and redaction
//! - [`health`] – runtime health and metrics snapshot
//! - [`config`] – policy/pipeline configuration, loading, and presets
//! - [`pipeline`] – lower-level content-inspection framework several detectors adapt
//! - `prompt` / `input` – heuristic pattern libraries detectors are built on

#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod audit;
pub mod config;
pub mod conversation;
pub mod detectors;
pub mod facade;
pub mod guardrail;
pub mod health;
pub mod pipeline;
pub mod resilience;

#[cfg(feature = "heuristics")]
pub mod input;
// `prompt` itself is unconditional: `prompt::refusal` has no heuristics
// dependency and is consumed directly by `guardrail::engine`. Its other
// submodules carry their own finer-grained `#[cfg(feature = ...)]` gates.
pub mod prompt;

/// Re-exports for convenient access to core types.
pub mod prelude {
    pub use crate::audit::{AuditEvent, AuditHandle, AuditSubsystem, EventType};
    pub use crate::config::{ConfigError, FailMode, PolicyBuilder, SecurityPolicy};
    pub use crate::conversation::{ConversationKind, ConversationStore, HistoryStrategy, RateCheckOutcome};
    pub use crate::facade::{Pipeline, PipelineBuildError};
    pub use crate::guardrail::engine::{AggregateResult, EngineError, GuardrailUpdate, PipelineEngine};
    pub use crate::guardrail::registry::Registry;
    pub use crate::guardrail::result::{GuardrailResult, RiskLevel};
    pub use crate::guardrail::spec::{Action, GuardrailSpec, OnError, PerformanceClass, PipelineSpec, Stage};
    pub use crate::guardrail::{AnalysisContext, Guardrail, GuardrailError};
    pub use crate::health::{HealthRegistry, HealthSnapshot};
    pub use crate::pipeline::content::{Content, Message, RetrievedChunk};
    pub use crate::prompt::refusal::{RefusalConfig, RefusalMode, RefusalPolicy};
    pub use crate::resilience::{CircuitBreaker, CircuitState, Resilient, RetryPolicy};

    // Lower-level content-inspection framework several bundled detectors
    // adapt into the `Guardrail` contract above.
    pub use crate::pipeline::executor::{ExecutorBuilder, PipelineExecutor, PipelineResult};
    pub use crate::pipeline::outcome::{Severity, StageError, StageOutcome};
    pub use crate::pipeline::stage::{GuardrailStage, SecurityContext};
}

//! Content-inspection substrate several bundled detectors are built on.
//!
//! This is one layer below the spec's actual pipeline engine
//! ([`crate::guardrail::engine::PipelineEngine`], which dispatches
//! [`crate::guardrail::Guardrail`] instances per declared [`crate::guardrail::spec::PipelineSpec`]).
//! [`content::Content`] is the structured payload every `Guardrail` and
//! `GuardrailStage` analyzes; [`stage::GuardrailStage`] and
//! [`outcome::StageOutcome`]/[`outcome::StageError`] are the terminal-outcome
//! contract the supplemental heuristic modules (`input::injection`,
//! `input::normalization`, `input::spotlight`, see [`crate::input`]) are
//! written against, and [`executor::PipelineExecutor`] composes them
//! standalone — e.g. normalization-then-injection-then-spotlight — ahead of
//! (or independent of) the declarative `Guardrail` pipeline. A couple of
//! bundled detector types (`heuristic_prompt_injection`, `rag_spotlight`)
//! adapt a single `GuardrailStage` into the richer `Guardrail` contract
//! instead of duplicating its pattern-matching logic (see
//! [`crate::detectors::support`]).

pub mod content;
pub mod executor;
pub mod outcome;
pub mod stage;

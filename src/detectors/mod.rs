//! Bundled guardrail implementations and the registry wiring that makes
//! each one reachable by its `type` tag in a [`crate::guardrail::spec::GuardrailSpec`].
//!
//! Pattern-based detectors (PII, toxicity, code generation, length, regex,
//! keyword, URL, topic filter, compound scoring) need nothing but their own
//! `config`. `heuristic_prompt_injection` and `rag_spotlight` adapt an
//! existing [`crate::pipeline::stage::GuardrailStage`] (see [`support`]).
//! `rate_limit` shares a [`crate::conversation::ConversationStore`] across
//! every instance registered against the same registry. Model-assisted
//! detectors (`moderation-remote` / `pii-presidio`) call out to a remote
//! classifier through the resilience layer.

pub mod code_gen;
pub mod compound;
#[cfg(feature = "heuristics")]
pub mod heuristic_injection;
#[cfg(any(feature = "moderation-remote", feature = "pii-presidio"))]
pub mod model_assisted;
pub mod keyword;
pub mod length;
pub mod pii;
#[cfg(feature = "heuristics")]
pub mod rag_spotlight;
pub mod rate_limit;
pub mod regex_rule;
pub mod support;
pub mod topic;
pub mod toxicity;
pub mod url;

use std::sync::Arc;

use crate::conversation::ConversationStore;
use crate::guardrail::registry::Registry;

use code_gen::PatternCodeGeneration;
use compound::CompoundScoring;
#[cfg(feature = "heuristics")]
use heuristic_injection::HeuristicInjectionGuardrail;
use keyword::KeywordGuardrail;
use length::LengthGuardrail;
use pii::PatternPii;
#[cfg(feature = "heuristics")]
use rag_spotlight::RagSpotlightGuardrail;
use rate_limit::RateLimitGuardrail;
use regex_rule::RegexGuardrail;
use topic::TopicFilter;
use toxicity::PatternToxicity;
use url::UrlGuardrail;

/// Default per-conversation rate-limit capacities for the [`ConversationStore`]
/// every `rate_limit` instance shares when it is wired up through
/// [`register_builtins`]. A pipeline wanting different capacities builds its
/// own [`ConversationStore`] and registers `rate_limit` directly.
const DEFAULT_PER_MINUTE_CAPACITY: u32 = 60;
const DEFAULT_PER_HOUR_CAPACITY: u32 = 1_000;

/// Register every bundled detector under its canonical `type` tag.
///
/// Called by [`Registry::default_with_builtins`]. `rate_limit` is backed by
/// a single [`ConversationStore`] created here and shared by every
/// `rate_limit` instance this registry builds, since rate limiting is only
/// meaningful against one shared view of conversation activity.
pub fn register_builtins(registry: &mut Registry) {
    registry.register("simple_pii_detection", |spec| {
        Ok(Arc::new(PatternPii::new(&spec.name, &spec.config)))
    });
    registry.register("simple_toxicity_detection", |spec| {
        Ok(Arc::new(PatternToxicity::new(&spec.name, &spec.config)))
    });
    registry.register("simple_code_generation", |spec| {
        Ok(Arc::new(PatternCodeGeneration::new(&spec.name, &spec.config)))
    });
    registry.register("length", |spec| Ok(Arc::new(LengthGuardrail::new(&spec.name, &spec.config))));
    registry.register("regex", |spec| Ok(Arc::new(RegexGuardrail::new(&spec.name, &spec.config))));
    registry.register("keyword_block", |spec| {
        Ok(Arc::new(KeywordGuardrail::new(&spec.name, &spec.config)))
    });
    registry.register("url", |spec| Ok(Arc::new(UrlGuardrail::new(&spec.name, &spec.config))));
    registry.register("topic_filter", |spec| Ok(Arc::new(TopicFilter::new(&spec.name, &spec.config))));
    registry.register("compound_scoring", |spec| {
        Ok(Arc::new(CompoundScoring::new(&spec.name, &spec.config)))
    });
    #[cfg(feature = "heuristics")]
    registry.register("heuristic_prompt_injection", |spec| {
        HeuristicInjectionGuardrail::new(&spec.name, &spec.config)
            .map(|g| Arc::new(g) as Arc<dyn crate::guardrail::Guardrail>)
            .map_err(|e| crate::config::ConfigError::Semantic { message: e.to_string() })
    });
    #[cfg(feature = "heuristics")]
    registry.register("rag_spotlight", |spec| {
        Ok(Arc::new(RagSpotlightGuardrail::new(&spec.name, &spec.config)))
    });

    let shared_store = Arc::new(ConversationStore::new(DEFAULT_PER_MINUTE_CAPACITY, DEFAULT_PER_HOUR_CAPACITY));
    registry.register("rate_limit", move |spec| {
        Ok(Arc::new(RateLimitGuardrail::new(&spec.name, Arc::clone(&shared_store))))
    });

    #[cfg(any(feature = "moderation-remote", feature = "pii-presidio"))]
    register_model_assisted(registry);
}

#[cfg(any(feature = "moderation-remote", feature = "pii-presidio"))]
fn register_model_assisted(registry: &mut Registry) {
    use model_assisted::{HttpModerationClient, ModelAssistedCategory, ModelAssistedGuardrail};

    for category in [
        ModelAssistedCategory::Pii,
        ModelAssistedCategory::Toxicity,
        ModelAssistedCategory::CodeGeneration,
        ModelAssistedCategory::PromptInjection,
        ModelAssistedCategory::ContentModeration,
    ] {
        registry.register(category.type_tag(), move |spec| {
            let client = HttpModerationClient::from_env(&spec.config)?;
            Ok(Arc::new(ModelAssistedGuardrail::new(&spec.name, &spec.config, category, Arc::new(client)))
                as Arc<dyn crate::guardrail::Guardrail>)
        });
    }
}

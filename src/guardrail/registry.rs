//! Maps a [`GuardrailSpec::kind`](super::spec::GuardrailSpec) `type` tag to a
//! factory that constructs the corresponding [`Guardrail`].
//!
//! There is no reflection or dynamic class loading — every detector module
//! registers itself explicitly via [`Registry::register`], and
//! [`Registry::default_with_builtins`] wires up every bundled detector in
//! [`crate::detectors`].

use std::collections::HashMap;
use std::sync::Arc;

use super::spec::GuardrailSpec;
use super::Guardrail;
use crate::config::ConfigError;

/// A constructor for one guardrail `type`.
///
/// Takes the owning [`GuardrailSpec`] (so the factory can read `config`,
/// `timeout_ms`, etc.) and returns a boxed, shareable guardrail instance.
pub type Factory = Arc<dyn Fn(&GuardrailSpec) -> Result<Arc<dyn Guardrail>, ConfigError> + Send + Sync>;

/// The set of known guardrail `type` tags and how to construct them.
#[derive(Default, Clone)]
pub struct Registry {
    factories: HashMap<String, Factory>,
}

impl Registry {
    /// An empty registry with no detector types known.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `type_tag`. Replaces any existing factory for
    /// the same tag (later registrations win, matching preset-overlay semantics).
    pub fn register(
        &mut self,
        type_tag: impl Into<String>,
        factory: impl Fn(&GuardrailSpec) -> Result<Arc<dyn Guardrail>, ConfigError> + Send + Sync + 'static,
    ) {
        self.factories.insert(type_tag.into(), Arc::new(factory));
    }

    /// Whether a `type` tag is known.
    #[must_use]
    pub fn contains(&self, type_tag: &str) -> bool {
        self.factories.contains_key(type_tag)
    }

    /// Construct a guardrail instance from a spec.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedFormat`] if `spec.kind` is not a
    /// registered `type` tag, or whatever error the factory itself returns
    /// (typically a config-shape or missing-credential problem).
    pub fn build(&self, spec: &GuardrailSpec) -> Result<Arc<dyn Guardrail>, ConfigError> {
        let factory = self.factories.get(spec.kind.as_str()).ok_or_else(|| {
            ConfigError::UnsupportedFormat {
                message: format!("unknown guardrail type '{}' for '{}'", spec.kind, spec.name),
            }
        })?;
        factory(spec)
    }

    /// A registry pre-populated with every bundled detector type.
    #[must_use]
    pub fn default_with_builtins() -> Self {
        let mut registry = Self::new();
        crate::detectors::register_builtins(&mut registry);
        registry
    }
}

//! Loads a [`PipelineSpec`] from a YAML/TOML/JSON document and runs it
//! through four validation levels: syntax, schema, semantic, and
//! an advisory runtime reachability pass.
//!
//! Schema validation is `validator`'s derive on [`PipelineSpec`]/[`GuardrailSpec`]
//! (required fields, enum values, numeric ranges). Semantic validation goes
//! one step further than `validator` can express: it actually builds every
//! declared guardrail against a [`Registry`] — an unknown `type` tag or a
//! detector that fails to construct (bad regex, missing credential) is
//! caught here, before the spec ever reaches [`crate::guardrail::engine::PipelineEngine`].

use std::path::Path;

use validator::Validate;

use super::ConfigError;
use crate::guardrail::registry::Registry;
use crate::guardrail::spec::PipelineSpec;
use crate::guardrail::{AnalysisContext, Stage};
use crate::pipeline::content::Content;
use crate::pipeline::stage::SecurityContext;

/// Document serialization format, selected by file extension or supplied
/// directly for an in-memory document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// `.yaml` / `.yml`
    Yaml,
    /// `.toml`
    Toml,
    /// `.json`
    Json,
}

impl DocumentFormat {
    /// Infer a format from a file extension.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedFormat`] for any other extension.
    pub fn from_extension(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat {
                message: "file extension must be .yaml, .yml, .toml, or .json".to_string(),
            }),
        }
    }
}

/// Level 1 — parse `content` into a [`PipelineSpec`] without validating it.
///
/// # Errors
///
/// Returns [`ConfigError::ParseError`] if `content` is not well-formed in
/// the given `format`.
pub fn parse_document(content: &str, format: DocumentFormat) -> Result<PipelineSpec, ConfigError> {
    match format {
        DocumentFormat::Yaml => serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            format: "YAML".to_string(),
            source: Box::new(e),
        }),
        DocumentFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::ParseError {
            format: "TOML".to_string(),
            source: Box::new(e),
        }),
        DocumentFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::ParseError {
            format: "JSON".to_string(),
            source: Box::new(e),
        }),
    }
}

/// Level 2 — required fields, allowed enum values, numeric ranges.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] if any constraint fails.
pub fn validate_schema(spec: &PipelineSpec) -> Result<(), ConfigError> {
    spec.validate()?;
    Ok(())
}

/// Level 3 — detector types resolve, and each one constructs successfully
/// against its declared `config` (bad regex, missing credential, unknown
/// `type` tag).
///
/// Constructing here and discarding the result is deliberate: it exercises
/// exactly the failure path [`crate::guardrail::engine::PipelineEngine::build`]
/// would hit, surfacing it as a load-time [`ConfigError`] instead.
///
/// # Errors
///
/// Returns the first [`ConfigError`] any declared guardrail's factory produces.
pub fn validate_semantic(spec: &PipelineSpec, registry: &Registry) -> Result<(), ConfigError> {
    for guardrail_spec in spec.input.iter().chain(spec.output.iter()) {
        registry.build(guardrail_spec)?;
    }
    Ok(())
}

/// One guardrail's reachability, as observed by [`validate_runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeCheck {
    /// The guardrail instance name this check ran against.
    pub guardrail: String,
    /// Whether a trial call completed without error.
    pub reachable: bool,
    /// Failure detail, if `reachable` is `false`.
    pub detail: Option<String>,
}

/// Level 4 — an advisory probe of every declared guardrail against an empty
/// input, to surface an unreachable provider before production traffic
/// does. Never fails the load: an unreachable provider is reported, not
/// rejected, since network reachability at load time says nothing about
/// reachability at request time.
pub async fn validate_runtime(spec: &PipelineSpec, registry: &Registry) -> Vec<RuntimeCheck> {
    let mut checks = Vec::new();
    for guardrail_spec in spec.input.iter().chain(spec.output.iter()) {
        let guardrail = match registry.build(guardrail_spec) {
            Ok(g) => g,
            Err(e) => {
                checks.push(RuntimeCheck {
                    guardrail: guardrail_spec.name.clone(),
                    reachable: false,
                    detail: Some(e.to_string()),
                });
                continue;
            }
        };
        let ctx = AnalysisContext::new(Stage::Input, SecurityContext::default());
        let outcome = guardrail.analyze(&Content::Text(String::new()), &ctx).await;
        checks.push(match outcome {
            Ok(_) => RuntimeCheck {
                guardrail: guardrail_spec.name.clone(),
                reachable: true,
                detail: None,
            },
            Err(e) => RuntimeCheck {
                guardrail: guardrail_spec.name.clone(),
                reachable: false,
                detail: Some(e.to_string()),
            },
        });
    }
    checks
}

/// Load and fully validate (levels 1-3) a [`PipelineSpec`] from a file on
/// disk. Level 4 is advisory and left to [`validate_runtime`], called
/// separately since it makes outbound calls.
///
/// # Errors
///
/// Returns [`ConfigError`] at whichever level first rejects the document.
pub fn load_file(path: impl AsRef<Path>, registry: &Registry) -> Result<PipelineSpec, ConfigError> {
    let path = path.as_ref();
    let format = DocumentFormat::from_extension(path)?;
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let spec = parse_document(&content, format)?;
    validate_schema(&spec)?;
    validate_semantic(&spec, registry)?;
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_yaml() -> &'static str {
        r#"
version: "1.0"
input:
  - name: len_check
    type: length
    stage: input
    config:
      max_chars: 4000
output: []
"#
    }

    #[test]
    fn parses_valid_yaml() {
        let spec = parse_document(minimal_yaml(), DocumentFormat::Yaml).unwrap();
        assert_eq!(spec.input.len(), 1);
        assert_eq!(spec.input[0].kind, "length");
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let result = parse_document("not: [valid", DocumentFormat::Yaml);
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn schema_validation_rejects_empty_name() {
        let mut spec = parse_document(minimal_yaml(), DocumentFormat::Yaml).unwrap();
        spec.input[0].name.clear();
        assert!(matches!(validate_schema(&spec), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn semantic_validation_rejects_unknown_type() {
        let mut spec = parse_document(minimal_yaml(), DocumentFormat::Yaml).unwrap();
        spec.input[0].kind = "does_not_exist".into();
        let registry = Registry::default_with_builtins();
        assert!(validate_semantic(&spec, &registry).is_err());
    }

    #[test]
    fn semantic_validation_accepts_known_builtin() {
        let spec = parse_document(minimal_yaml(), DocumentFormat::Yaml).unwrap();
        let registry = Registry::default_with_builtins();
        assert!(validate_semantic(&spec, &registry).is_ok());
    }

    #[test]
    fn load_file_reads_and_validates_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(minimal_yaml().as_bytes()).unwrap();
        let registry = Registry::default_with_builtins();
        let spec = load_file(file.path(), &registry).unwrap();
        assert_eq!(spec.input.len(), 1);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let result = DocumentFormat::from_extension(Path::new("policy.conf"));
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat { .. })));
    }

    #[tokio::test]
    async fn runtime_check_reports_reachable_for_local_detector() {
        let spec = parse_document(minimal_yaml(), DocumentFormat::Yaml).unwrap();
        let registry = Registry::default_with_builtins();
        let checks = validate_runtime(&spec, &registry).await;
        assert_eq!(checks.len(), 1);
        assert!(checks[0].reachable);
    }
}

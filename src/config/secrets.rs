//! Single accessor for credentials a model-assisted guardrail needs.
//!
//! Credentials are read from the process environment (optionally loaded
//! from a `.env` file via `dotenvy`, mirroring [`super::PolicyBuilder::with_env`])
//! and never logged, serialized into a [`super::ConfigError`] message, or
//! accepted as a command-line argument — a config document names the
//! *environment variable* to read (`api_key_env = "OPENAI_API_KEY"`), not
//! the secret itself.

use super::ConfigError;

/// Read a required credential from the named environment variable.
///
/// A missing variable is a semantic configuration failure,
/// not a runtime error raised on first use — a guardrail that depends on a
/// credential should fail to construct, not fail on its first request.
///
/// # Errors
///
/// Returns [`ConfigError::Semantic`] if `var` is unset or is not valid
/// Unicode. The variable name is echoed back for operator diagnosis; the
/// value, if any, never is.
pub fn require_env(var: &str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::Semantic {
        message: format!("missing required credential: environment variable '{var}' is not set"),
    })
}

/// Load a `.env` file into the process environment, if present.
///
/// Idempotent and silent on absence — mirrors
/// [`super::PolicyBuilder::build`]'s existing `dotenvy::dotenv().ok()` call,
/// shared here so config loading and model-assisted construction agree on
/// where credentials may come from.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

//! Model-assisted guardrails: detectors that call out to a classifier or
//! moderation API instead of evaluating patterns locally.
//!
//! Every outbound call goes through a shared [`Resilient`](crate::resilience::Resilient)
//! wrapper — timeout, bounded retry, and a per-upstream circuit breaker — the
//! same way [`crate::input::injection::InjectionStage`] wraps its heuristics,
//! just one layer further out. A missing credential is caught at
//! construction time as a [`ConfigError::Semantic`], never surfaced as a
//! first-request [`GuardrailError`] — see [`HttpModerationClient::from_env`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{secrets, ConfigError};
use crate::guardrail::result::{GuardrailResult, RiskLevel};
use crate::guardrail::{AnalysisContext, Guardrail, GuardrailError, PerformanceClass};
use crate::pipeline::content::Content;
use crate::resilience::{CircuitBreaker, Classify, FailureClass, Resilient, RetryPolicy, ResilienceError};

use super::support::{config_map, float_or, str_or, u64_or};

/// Which bundled model-assisted concern a [`ModelAssistedGuardrail`] instance
/// represents. Distinct instances of the same category (e.g. two different
/// moderation providers) are allowed to coexist in one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelAssistedCategory {
    /// Model-assisted PII detection (`model_assisted_pii_detection`).
    Pii,
    /// Model-assisted toxicity detection (`model_assisted_toxicity_detection`).
    Toxicity,
    /// Model-assisted unsafe code generation detection (`model_assisted_code_generation`).
    CodeGeneration,
    /// Model-assisted prompt injection detection (`model_assisted_prompt_injection`).
    PromptInjection,
    /// General content moderation (`model_assisted_content_moderation`).
    ContentModeration,
}

impl ModelAssistedCategory {
    /// The registry `type` tag this category is bundled under.
    #[must_use]
    pub fn type_tag(self) -> &'static str {
        match self {
            Self::Pii => "model_assisted_pii_detection",
            Self::Toxicity => "model_assisted_toxicity_detection",
            Self::CodeGeneration => "model_assisted_code_generation",
            Self::PromptInjection => "model_assisted_prompt_injection",
            Self::ContentModeration => "model_assisted_content_moderation",
        }
    }
}

/// A verdict from a classifier or moderation provider, already normalized to
/// the shape a [`ModelAssistedGuardrail`] needs regardless of which provider
/// produced it.
#[derive(Debug, Clone)]
pub struct ProviderVerdict {
    /// Whether the provider flagged the content.
    pub flagged: bool,
    /// Confidence or score in `[0.0, 1.0]`.
    pub confidence: f32,
    /// Provider-reported category label, if any (e.g. `"hate"`, `"ssn"`).
    pub category: Option<String>,
    /// Human-readable explanation surfaced in [`GuardrailResult::reason`].
    pub reason: String,
}

/// Failure producing a [`ProviderVerdict`] — distinct from
/// [`GuardrailError`], which is what [`ModelAssistedGuardrail::analyze`]
/// ultimately reports once [`Resilient::call`] has exhausted retries or
/// short-circuited on an open breaker.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The underlying transport failed (connection refused, DNS, TLS).
    #[error("transport error calling provider: {0}")]
    Transport(String),
    /// The provider returned a non-2xx status other than 401/403.
    #[error("provider returned {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated for logging.
        body: String,
    },
    /// The provider rejected the credential.
    #[error("provider rejected credential")]
    Unauthorized,
    /// The response body did not match the expected shape.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl Classify for ProviderError {
    fn classify(&self) -> FailureClass {
        match self {
            Self::Transport(_) | Self::MalformedResponse(_) => FailureClass::Transient,
            Self::Http { status, .. } => {
                if *status == 429 || *status >= 500 {
                    FailureClass::Transient
                } else {
                    FailureClass::Permanent
                }
            }
            Self::Unauthorized => FailureClass::Permanent,
        }
    }
}

/// A classifier or moderation backend a [`ModelAssistedGuardrail`] calls.
///
/// Implementors own their own transport; [`Resilient`] only ever sees
/// [`ProviderError`], so a local ONNX classifier and a remote HTTP API are
/// equally usable behind this trait.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Classify `text`, returning a normalized verdict.
    async fn classify(&self, text: &str) -> Result<ProviderVerdict, ProviderError>;

    /// Identifier used as the [`Resilient`] upstream name and in Health
    /// reporting (e.g. `"openai-moderation"`, `"local-onnx"`).
    fn upstream(&self) -> &str;
}

/// Generic model-assisted guardrail: wraps any [`ProviderClient`] with the
/// resilience layer and adapts its verdict into a [`GuardrailResult`].
pub struct ModelAssistedGuardrail {
    name: String,
    category: ModelAssistedCategory,
    client: Arc<dyn ProviderClient>,
    resilient: Resilient,
    call_timeout: Duration,
    block_at: f32,
    warn_at: f32,
}

impl ModelAssistedGuardrail {
    /// Build a guardrail around an already-constructed [`ProviderClient`].
    ///
    /// `raw_config` supplies timeout and retry/breaker tuning; the client
    /// itself (and any credential it needed) must already exist — credential
    /// failures are caught where the client is constructed
    /// (see [`HttpModerationClient::from_env`]), not here.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        raw_config: &serde_json::Value,
        category: ModelAssistedCategory,
        client: Arc<dyn ProviderClient>,
    ) -> Self {
        let config = config_map(raw_config);
        let timeout_ms = u64_or(config, "timeout_ms", 2_000);
        let max_retries = u64_or(config, "max_retries", 2) as u32;
        let failure_threshold = u64_or(config, "failure_threshold", 5) as u32;
        let recovery_secs = u64_or(config, "recovery_timeout_secs", 30);

        let breaker = Arc::new(CircuitBreaker::new(failure_threshold, Duration::from_secs(recovery_secs)));
        let retry = RetryPolicy::new(max_retries, Duration::from_millis(50), 2.0);
        let resilient = Resilient::new(client.upstream().to_string(), breaker, retry);

        Self {
            name: name.into(),
            category,
            client,
            resilient,
            call_timeout: Duration::from_millis(timeout_ms),
            block_at: float_or(config, "block_at", 0.8),
            warn_at: float_or(config, "warn_at", 0.5),
        }
    }

    /// A read-only handle to the shared breaker, for Health/Metrics reporting.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        self.resilient.breaker()
    }

    fn result_from_verdict(&self, verdict: ProviderVerdict) -> GuardrailResult {
        let risk_level = if verdict.confidence >= self.block_at {
            RiskLevel::High
        } else if verdict.confidence >= self.warn_at {
            RiskLevel::Medium
        } else if verdict.flagged {
            RiskLevel::Low
        } else {
            RiskLevel::None
        };

        if verdict.flagged && verdict.confidence >= self.block_at {
            let mut result =
                GuardrailResult::blocking(&self.name, self.category.type_tag(), verdict.confidence, risk_level, verdict.reason);
            if let Some(category) = verdict.category {
                result = result.with_indicators(vec![category]);
            }
            result
        } else {
            let mut result = GuardrailResult::clear(&self.name, self.category.type_tag());
            result.confidence = verdict.confidence;
            result.risk_level = risk_level;
            result.reason = verdict.reason;
            if let Some(category) = verdict.category {
                result.indicators.push(category);
            }
            result
        }
    }
}

#[async_trait]
impl Guardrail for ModelAssistedGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        self.category.type_tag()
    }

    async fn analyze(&self, content: &Content, ctx: &AnalysisContext) -> Result<GuardrailResult, GuardrailError> {
        let text = content.as_text().into_owned();
        let client = Arc::clone(&self.client);
        let outcome = self
            .resilient
            .call(self.call_timeout, ctx.remaining(), move || {
                let client = Arc::clone(&client);
                let text = text.clone();
                async move { client.classify(&text).await }
            })
            .await;

        match outcome {
            Ok(verdict) => Ok(self.result_from_verdict(verdict)),
            Err(ResilienceError::CircuitOpen { upstream }) => Err(GuardrailError::CircuitOpen {
                guardrail: self.name.clone(),
                upstream,
            }),
            Err(ResilienceError::Timeout { elapsed_ms, .. }) => Err(GuardrailError::Timeout {
                guardrail: self.name.clone(),
                elapsed_ms,
            }),
            Err(ResilienceError::Upstream { source, .. }) => Err(GuardrailError::Unavailable {
                guardrail: self.name.clone(),
                reason: source.to_string(),
            }),
        }
    }

    fn performance_class(&self) -> PerformanceClass {
        PerformanceClass::Slow
    }
}

/// A [`ProviderClient`] calling a remote moderation-style HTTP API, modeled
/// on the OpenAI moderation endpoint shape (`POST {base_url}/moderations`,
/// category/score maps in the response).
pub struct HttpModerationClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    upstream: String,
}

impl HttpModerationClient {
    /// Build a client, reading the API key from the environment variable
    /// named by `api_key_env` in `raw_config` (default `"OPENAI_API_KEY"`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Semantic`] if that environment variable is
    /// unset — a missing credential fails guardrail construction, never a
    /// later `analyze` call.
    pub fn from_env(raw_config: &serde_json::Value) -> Result<Self, ConfigError> {
        let config = config_map(raw_config);
        let api_key_env = str_or(config, "api_key_env", "OPENAI_API_KEY");
        let api_key = secrets::require_env(api_key_env)?;
        let base_url = str_or(config, "base_url", "https://api.openai.com/v1")
            .trim_end_matches('/')
            .to_string();
        let model = str_or(config, "model", "omni-moderation-latest").to_string();
        let upstream = str_or(config, "upstream", "moderation-api").to_string();

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            model,
            api_key,
            upstream,
        })
    }
}

#[async_trait]
impl ProviderClient for HttpModerationClient {
    async fn classify(&self, text: &str) -> Result<ProviderVerdict, ProviderError> {
        #[derive(Serialize)]
        struct Request<'a> {
            input: &'a str,
            model: &'a str,
        }

        #[derive(Deserialize)]
        struct Response {
            results: Vec<ResultEntry>,
        }

        #[derive(Deserialize)]
        struct ResultEntry {
            flagged: bool,
            categories: std::collections::HashMap<String, bool>,
            category_scores: std::collections::HashMap<String, f64>,
        }

        let url = format!("{}/moderations", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&Request { input: text, model: &self.model })
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Response = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let top = parsed
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("empty results array".into()))?;

        let (category, score) = top
            .category_scores
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(k, v)| (Some(k.clone()), *v as f32))
            .unwrap_or((None, 0.0));

        Ok(ProviderVerdict {
            flagged: top.flagged,
            confidence: score,
            category,
            reason: if top.flagged {
                format!("flagged by {}", self.upstream)
            } else {
                String::new()
            },
        })
    }

    fn upstream(&self) -> &str {
        &self.upstream
    }
}

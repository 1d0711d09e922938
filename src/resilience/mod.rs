//! The resilience layer: timeouts, bounded retry, and per-upstream circuit
//! breakers wrapped around every outbound call a guardrail makes.
//!
//! Grounded in the same shape as [`crate::guardrail::engine`]'s dispatch loop
//! — a single async `call` wrapper that a Model-Assisted detector holds
//! instead of a bare HTTP client. Failure classification (network error, 5xx,
//! malformed response, timeout) is uniform across breaker decisions; a 4xx
//! other than 429 is surfaced as a configuration error rather than tripping
//! the breaker.

pub mod breaker;
pub mod retry;

pub use breaker::{CircuitBreaker, CircuitState};
pub use retry::RetryPolicy;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure kinds the resilience layer reasons about, independent of whatever
/// error type a particular upstream call produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// A transient failure that should count toward the circuit breaker and
    /// be eligible for retry: network error, 5xx, malformed response, or a
    /// per-call timeout.
    Transient,
    /// A non-retryable failure that should surface immediately without
    /// tripping the breaker — e.g. a 4xx other than 429.
    Permanent,
}

/// A call outcome that knows how to classify itself for the resilience layer.
///
/// Implemented by whatever error type an upstream call's `Result::Err` holds,
/// so [`Resilient::call`] never has to special-case a particular transport.
pub trait Classify {
    /// How this failure should be treated by retry and circuit-breaker logic.
    fn classify(&self) -> FailureClass;
}

/// Errors produced by the resilience wrapper itself, distinct from whatever
/// error the wrapped call produces (folded in via [`ResilienceError::Upstream`]).
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// The circuit breaker for this upstream is open; the call was not attempted.
    #[error("circuit open for upstream '{upstream}'")]
    CircuitOpen {
        /// Upstream identifier the breaker tracks.
        upstream: String,
    },
    /// The call did not complete before its timeout.
    #[error("call to upstream '{upstream}' timed out after {elapsed_ms}ms")]
    Timeout {
        /// Upstream identifier.
        upstream: String,
        /// Elapsed time before the timeout fired.
        elapsed_ms: u64,
    },
    /// Retries were exhausted (or skipped because the deadline was within
    /// one backoff interval) and the last attempt still failed.
    #[error("upstream '{upstream}' failed: {source}")]
    Upstream {
        /// Upstream identifier.
        upstream: String,
        /// The error produced by the final attempt.
        #[source]
        source: E,
    },
}

/// Wraps a per-detector [`RetryPolicy`] and a shared [`CircuitBreaker`] around
/// a single async `call`.
///
/// A Model-Assisted detector holds one of these instead of a bare client
/// handle; every outbound request goes through [`Self::call`].
pub struct Resilient {
    upstream: String,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl Resilient {
    /// Build a resilient wrapper for `upstream`, sharing `breaker` with any
    /// other detector that calls the same dependency.
    #[must_use]
    pub fn new(upstream: impl Into<String>, breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self {
            upstream: upstream.into(),
            breaker,
            retry,
        }
    }

    /// The upstream identifier this wrapper tracks a breaker for.
    #[must_use]
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// A read-only handle to the shared breaker, for Health/Metrics reporting.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Invoke `f` (constructing a fresh future per attempt) subject to the
    /// breaker, per-call timeout, and bounded exponential backoff retry.
    ///
    /// `deadline` is the time remaining on the owning pipeline call, if any;
    /// retries are skipped once the deadline is within one backoff interval,
    /// and the per-call timeout is clamped to whichever of the
    /// detector's own timeout and the remaining deadline is shorter.
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::CircuitOpen`] without attempting the call if
    /// the breaker is open; [`ResilienceError::Timeout`] if every attempt
    /// exceeded its clamped timeout; [`ResilienceError::Upstream`] if the
    /// final attempt returned an error.
    pub async fn call<T, E, F, Fut>(
        &self,
        per_call_timeout: Duration,
        deadline: Option<Duration>,
        mut f: F,
    ) -> Result<T, ResilienceError<E>>
    where
        E: Classify,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.breaker.allow_request() {
            return Err(ResilienceError::CircuitOpen {
                upstream: self.upstream.clone(),
            });
        }

        let effective_timeout = match deadline {
            Some(d) if d < per_call_timeout => d,
            _ => per_call_timeout,
        };

        let mut attempt = 0u32;
        loop {
            let started = std::time::Instant::now();
            let outcome = tokio::time::timeout(effective_timeout, f()).await;

            match outcome {
                Ok(Ok(value)) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Ok(Err(err)) => match err.classify() {
                    FailureClass::Permanent => {
                        // Configuration-shaped errors surface immediately and
                        // never trip the breaker.
                        return Err(ResilienceError::Upstream {
                            upstream: self.upstream.clone(),
                            source: err,
                        });
                    }
                    FailureClass::Transient => {
                        self.breaker.record_failure();
                        if !self.retry.should_retry(attempt, deadline) {
                            return Err(ResilienceError::Upstream {
                                upstream: self.upstream.clone(),
                                source: err,
                            });
                        }
                    }
                },
                Err(_elapsed) => {
                    self.breaker.record_failure();
                    if !self.retry.should_retry(attempt, deadline) {
                        return Err(ResilienceError::Timeout {
                            upstream: self.upstream.clone(),
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                }
            }

            tokio::time::sleep(self.retry.backoff(attempt)).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky;
    impl Classify for Flaky {
        fn classify(&self) -> FailureClass {
            FailureClass::Transient
        }
    }

    #[derive(Debug)]
    struct BadRequest;
    impl Classify for BadRequest {
        fn classify(&self) -> FailureClass {
            FailureClass::Permanent
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let breaker = Arc::new(CircuitBreaker::new(3, Duration::from_secs(30)));
        let resilient = Resilient::new("svc", breaker, RetryPolicy::new(3, Duration::from_millis(1), 2.0));
        let result: Result<u32, Flaky> = resilient
            .call(Duration::from_millis(50), None, || async { Ok(7) })
            .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let breaker = Arc::new(CircuitBreaker::new(5, Duration::from_secs(30)));
        let resilient = Resilient::new("svc", breaker, RetryPolicy::new(3, Duration::from_millis(1), 2.0));
        let attempts = AtomicU32::new(0);
        let result: Result<u32, Flaky> = resilient
            .call(Duration::from_millis(50), None, || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Flaky)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_never_retries() {
        let breaker = Arc::new(CircuitBreaker::new(5, Duration::from_secs(30)));
        let resilient = Resilient::new("svc", breaker, RetryPolicy::new(3, Duration::from_millis(1), 2.0));
        let attempts = AtomicU32::new(0);
        let result: Result<u32, BadRequest> = resilient
            .call(Duration::from_millis(50), None, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(BadRequest) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_calling() {
        let breaker = Arc::new(CircuitBreaker::new(1, Duration::from_secs(30)));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        let resilient = Resilient::new("svc", breaker, RetryPolicy::new(3, Duration::from_millis(1), 2.0));
        let called = AtomicU32::new(0);
        let result: Result<u32, Flaky> = resilient
            .call(Duration::from_millis(50), None, || {
                called.fetch_add(1, Ordering::SeqCst);
                async { Ok(1) }
            })
            .await;
        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }
}

//! Per-(detector, upstream) circuit breaker state machine.
//!
//! `CLOSED` → `OPEN` after `failure_threshold` consecutive failures;
//! `OPEN` → `HALF_OPEN` after `recovery_timeout` elapses; `HALF_OPEN` →
//! `CLOSED` on the next success or back to `OPEN` on the next failure.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Observable state of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls are attempted normally.
    Closed,
    /// Calls are short-circuited to the detector's `on_error` policy.
    Open,
    /// One probe call is permitted to test recovery.
    HalfOpen,
}

/// Tracks consecutive failures for one (detector, upstream) pair and gates
/// whether a call should be attempted.
///
/// `allow_request` reserves the single half-open probe slot: concurrent
/// callers racing a half-open breaker will see at most one of them granted
/// the probe, the rest treated as still open.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    consecutive_failures: AtomicU32,
    opened_at_millis: AtomicU64,
    probe_in_flight: Mutex<bool>,
}

const NOT_OPEN: u64 = u64::MAX;

impl CircuitBreaker {
    /// Build a breaker that opens after `failure_threshold` consecutive
    /// failures and offers a half-open probe after `recovery_timeout`.
    #[must_use]
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            consecutive_failures: AtomicU32::new(0),
            opened_at_millis: AtomicU64::new(NOT_OPEN),
            probe_in_flight: Mutex::new(false),
        }
    }

    /// The breaker's current state, recomputing the `Open → HalfOpen`
    /// transition against the wall clock if the recovery timeout has elapsed.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let opened_at = self.opened_at_millis.load(Ordering::Acquire);
        if opened_at == NOT_OPEN {
            return CircuitState::Closed;
        }
        if epoch_millis().saturating_sub(opened_at) >= self.recovery_timeout.as_millis() as u64 {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    /// Whether a call should be attempted right now. Reserves the sole
    /// half-open probe slot when called in that state.
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                let mut in_flight = self.probe_in_flight.lock().expect("breaker probe lock poisoned");
                if *in_flight {
                    false
                } else {
                    *in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful call: closes the breaker and resets the failure count.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.opened_at_millis.store(NOT_OPEN, Ordering::Release);
        *self.probe_in_flight.lock().expect("breaker probe lock poisoned") = false;
    }

    /// Record a failed call: opens the breaker once `failure_threshold`
    /// consecutive failures accumulate, or immediately re-opens from half-open.
    pub fn record_failure(&self) {
        *self.probe_in_flight.lock().expect("breaker probe lock poisoned") = false;

        if self.state() == CircuitState::HalfOpen {
            self.opened_at_millis.store(epoch_millis(), Ordering::Release);
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.failure_threshold {
            self.opened_at_millis.store(epoch_millis(), Ordering::Release);
        }
    }
}

fn epoch_millis() -> u64 {
    static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let epoch = *EPOCH.get_or_init(Instant::now);
    Instant::now().saturating_duration_since(epoch).as_millis() as u64
}

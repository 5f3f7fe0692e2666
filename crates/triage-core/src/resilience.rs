//! Call protection for external dependencies: per-attempt timeout, retry with
//! exponential backoff, and a shared circuit breaker.
//!
//! The breaker is a three-state machine. Closed counts consecutive failures
//! and opens at the threshold. Open rejects calls outright until the reset
//! window elapses, then admits a single trial call (half-open); the trial's
//! outcome closes or reopens the breaker. A breaker-open rejection is never
//! retried — it is surfaced immediately so callers back off instead of
//! hammering a dependency that is already known to be down.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::ConnectorConfig;
use crate::error::{Result, TriageError};

// ---------------------------------------------------------------------------
// CallPolicy
// ---------------------------------------------------------------------------

/// Retry/timeout budget for one class of external calls.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Attempt errors failing this predicate are surfaced without retry.
    pub retry_on: fn(&TriageError) -> bool,
}

fn retry_all(_: &TriageError) -> bool {
    true
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            retry_on: retry_all,
        }
    }
}

impl From<&ConnectorConfig> for CallPolicy {
    fn from(config: &ConnectorConfig) -> Self {
        Self {
            timeout: config.timeout,
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            retry_on: retry_all,
        }
    }
}

// ---------------------------------------------------------------------------
// CircuitBreaker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Shared per-dependency failure accountant. One instance protects all calls
/// to a dependency; clones of the owning `Arc` share its state.
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self::new(config.breaker_fail_max, config.breaker_reset_timeout)
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    /// Gate one attempt. Open and inside the reset window rejects; open and
    /// past the window transitions to half-open and admits the trial call.
    fn before_call(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.reset_timeout {
                    inner.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(TriageError::BreakerOpen)
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            // A failed trial call reopens immediately.
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            _ => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// call
// ---------------------------------------------------------------------------

/// Run `op` under the full stability policy. Returns the first successful
/// attempt's value, `TriageError::BreakerOpen` untouched when the breaker
/// rejects, or one `TriageError::ExternalCall` wrapping the last cause once
/// the attempt budget is spent.
///
/// A timed-out attempt's future is dropped; whatever work it dispatched may
/// still complete downstream.
pub async fn call<T, F, Fut>(
    policy: &CallPolicy,
    breaker: &CircuitBreaker,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = policy.initial_backoff;
    let mut last_error: Option<TriageError> = None;
    let mut attempts_made = 0;

    for attempt in 1..=policy.max_attempts {
        attempts_made = attempt;
        breaker.before_call()?;

        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(TriageError::Timeout(policy.timeout)),
        };

        match outcome {
            Ok(value) => {
                breaker.record_success();
                tracing::debug!(attempt, "external call succeeded");
                return Ok(value);
            }
            Err(error) => {
                breaker.record_failure();
                tracing::debug!(attempt, error = %error, "external call attempt failed");
                let retryable = (policy.retry_on)(&error);
                last_error = Some(error);
                if !retryable {
                    break;
                }
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(policy.max_backoff);
        }
    }

    Err(TriageError::ExternalCall {
        attempts: attempts_made,
        source: Box::new(last_error.unwrap_or(TriageError::BreakerOpen)),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Guarded remote calls with an explicit fallback.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{BreakerRegistry, RemoteCallError, RetryPolicy};

/// Why a guarded call ended in its fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackCause {
    /// The breaker short-circuited; the primary action was not invoked.
    CircuitOpen { dependency: String },
    /// Every attempt failed with a transient error.
    Exhausted {
        attempts: u32,
        last_error: RemoteCallError,
    },
    /// The dependency answered with a business rejection; not retried.
    Rejected(RemoteCallError),
}

impl FallbackCause {
    fn outcome_label(&self) -> &'static str {
        match self {
            FallbackCause::CircuitOpen { .. } => "fallback_open",
            FallbackCause::Exhausted { .. } => "fallback_exhausted",
            FallbackCause::Rejected(_) => "fallback_rejected",
        }
    }
}

impl std::fmt::Display for FallbackCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackCause::CircuitOpen { dependency } => {
                write!(f, "circuit open for {dependency}")
            }
            FallbackCause::Exhausted {
                attempts,
                last_error,
            } => write!(f, "{last_error} (after {attempts} attempts)"),
            FallbackCause::Rejected(err) => write!(f, "{err}"),
        }
    }
}

/// Timeout and retry settings applied to every guarded call.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Bounded wait on each attempt of the primary action.
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

/// Wraps outbound calls in the circuit breaker of their dependency.
#[derive(Debug, Clone)]
pub struct RemoteCallGuard {
    registry: Arc<BreakerRegistry>,
    config: GuardConfig,
}

impl RemoteCallGuard {
    pub fn new(registry: Arc<BreakerRegistry>, config: GuardConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    /// Runs `primary` against `dependency`, or `fallback` if the circuit is
    /// open, the dependency rejected the call, or every attempt failed.
    ///
    /// `primary` is invoked once per attempt. Only transient errors are
    /// retried and counted against the breaker.
    #[tracing::instrument(skip(self, primary, fallback))]
    pub async fn guard<T, P, PFut, F, FFut>(&self, dependency: &str, mut primary: P, fallback: F) -> T
    where
        P: FnMut() -> PFut,
        PFut: Future<Output = Result<T, RemoteCallError>>,
        F: FnOnce(FallbackCause) -> FFut,
        FFut: Future<Output = T>,
    {
        let breaker = self.registry.breaker(dependency);
        let attempts = self.config.retry.attempts();

        let mut attempt = 0;
        let cause = loop {
            attempt += 1;

            let Some(permit) = breaker.try_acquire() else {
                break FallbackCause::CircuitOpen {
                    dependency: dependency.to_string(),
                };
            };

            let result = match tokio::time::timeout(self.config.call_timeout, primary()).await {
                Ok(result) => result,
                Err(_) => Err(RemoteCallError::Timeout {
                    dependency: dependency.to_string(),
                    after: self.config.call_timeout,
                }),
            };

            match result {
                Ok(value) => {
                    permit.success();
                    metrics::counter!(
                        "remote_guard_calls_total",
                        "dependency" => dependency.to_string(),
                        "outcome" => "success"
                    )
                    .increment(1);
                    tracing::debug!(attempt, "guarded call succeeded");
                    return value;
                }
                Err(error) if error.is_transient() => {
                    permit.failure();
                    if !self.config.retry.should_retry(attempt, &error) {
                        break FallbackCause::Exhausted {
                            attempts: attempt,
                            last_error: error,
                        };
                    }
                    tracing::debug!(attempt, %error, "transient failure, retrying");
                    if !self.config.retry.backoff.is_zero() {
                        tokio::time::sleep(self.config.retry.backoff).await;
                    }
                }
                Err(error) => {
                    // The dependency answered, so the breaker sees a healthy call.
                    permit.success();
                    break FallbackCause::Rejected(error);
                }
            }
        };

        tracing::warn!(attempts = attempt.min(attempts), cause = %cause, "guarded call fell back");
        metrics::counter!(
            "remote_guard_calls_total",
            "dependency" => dependency.to_string(),
            "outcome" => cause.outcome_label()
        )
        .increment(1);
        fallback(cause).await
    }
}

//! Circuit breaker for one remote dependency.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures inside `rolling_window` that open the circuit.
    pub failure_threshold: u32,
    /// Failures older than this no longer count towards the threshold.
    pub rolling_window: Duration,
    /// Time spent OPEN before trial calls are let through.
    pub cool_down: Duration,
    /// Trial calls allowed while HALF_OPEN; that many successes close it.
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            rolling_window: Duration::from_secs(60),
            cool_down: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

/// Point-in-time view of a breaker, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub recent_failures: usize,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// Bumped on every state change; outcomes from an older epoch are ignored.
    generation: u64,
    recent_failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trials_in_flight: u32,
    trial_successes: u32,
}

/// Per-dependency circuit breaker.
///
/// State lives behind a mutex that is never held across an `.await`.
/// Every transition to OPEN schedules a timer that moves the breaker to
/// HALF_OPEN once the cool-down has elapsed, and the same check runs
/// lazily on each [`try_acquire`](Self::try_acquire).
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_config(name, BreakerConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: BreakerConfig) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                generation: 0,
                recent_failures: VecDeque::new(),
                opened_at: None,
                trials_in_flight: 0,
                trial_successes: 0,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state as last recorded. Does not evaluate the cool-down.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            recent_failures: inner.recent_failures.len(),
        }
    }

    /// Asks to let one call through.
    ///
    /// Returns `None` when the call must short-circuit: the circuit is OPEN
    /// and the cool-down has not elapsed, or it is HALF_OPEN and every trial
    /// slot is taken.
    pub fn try_acquire(self: &Arc<Self>) -> Option<CallPermit> {
        let mut inner = self.lock();
        self.expire_cool_down(&mut inner, Instant::now());

        match inner.state {
            CircuitState::Closed => Some(CallPermit::new(self, inner.generation, false)),
            CircuitState::Open => None,
            CircuitState::HalfOpen => {
                if inner.trials_in_flight >= self.config.half_open_max_calls.max(1) {
                    return None;
                }
                inner.trials_in_flight += 1;
                Some(CallPermit::new(self, inner.generation, true))
            }
        }
    }

    fn on_success(self: &Arc<Self>, generation: u64, trial: bool) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        match inner.state {
            CircuitState::Closed => inner.recent_failures.clear(),
            CircuitState::HalfOpen if trial => {
                inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
                inner.trial_successes += 1;
                if inner.trial_successes >= self.config.half_open_max_calls.max(1) {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            _ => {}
        }
    }

    fn on_failure(self: &Arc<Self>, generation: u64, trial: bool) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        let now = Instant::now();
        match inner.state {
            CircuitState::Closed => {
                inner.recent_failures.push_back(now);
                let window = self.config.rolling_window;
                while inner
                    .recent_failures
                    .front()
                    .is_some_and(|at| now.duration_since(*at) > window)
                {
                    inner.recent_failures.pop_front();
                }
                let failures = inner.recent_failures.len();
                if failures >= self.config.failure_threshold.max(1) as usize {
                    warn!(circuit = %self.name, failures, "circuit opened");
                    self.open(&mut inner, now);
                }
            }
            CircuitState::HalfOpen if trial => {
                warn!(circuit = %self.name, "trial call failed, circuit reopened");
                self.open(&mut inner, now);
            }
            _ => {}
        }
    }

    /// Returns a trial slot whose call ended without an outcome.
    fn release_trial(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && inner.state == CircuitState::HalfOpen {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
    }

    fn open(self: &Arc<Self>, inner: &mut BreakerInner, now: Instant) {
        self.transition(inner, CircuitState::Open);
        inner.opened_at = Some(now);
        self.schedule_half_open(inner.generation, now + self.config.cool_down);
    }

    /// Forces the OPEN→HALF_OPEN check at `deadline`, counted from the
    /// moment the circuit opened.
    fn schedule_half_open(self: &Arc<Self>, generation: u64, deadline: Instant) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let breaker: Weak<Self> = Arc::downgrade(self);
        handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(breaker) = breaker.upgrade() {
                let mut inner = breaker.lock();
                if inner.generation == generation {
                    breaker.expire_cool_down(&mut inner, Instant::now());
                }
            }
        });
    }

    fn expire_cool_down(&self, inner: &mut BreakerInner, now: Instant) {
        if inner.state != CircuitState::Open {
            return;
        }
        let elapsed = inner
            .opened_at
            .map(|at| now.duration_since(at))
            .unwrap_or(Duration::MAX);
        if elapsed >= self.config.cool_down {
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.trials_in_flight = 0;
        inner.trial_successes = 0;
        if to != CircuitState::Open {
            inner.opened_at = None;
        }
        if to == CircuitState::Closed {
            inner.recent_failures.clear();
        }
        info!(circuit = %self.name, %from, %to, "circuit state changed");
        metrics::counter!(
            "circuit_breaker_transitions_total",
            "dependency" => self.name.clone(),
            "to" => to.as_str()
        )
        .increment(1);
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Permission to make one call through a breaker.
///
/// Report the outcome with [`success`](Self::success) or
/// [`failure`](Self::failure). A trial permit dropped without an outcome
/// gives its slot back so the breaker cannot stay HALF_OPEN with no trial
/// available.
#[derive(Debug)]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    trial: bool,
    reported: bool,
}

impl CallPermit {
    fn new(breaker: &Arc<CircuitBreaker>, generation: u64, trial: bool) -> Self {
        Self {
            breaker: Arc::clone(breaker),
            generation,
            trial,
            reported: false,
        }
    }

    /// True if this call is a HALF_OPEN trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.reported = true;
        self.breaker.on_success(self.generation, self.trial);
    }

    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.on_failure(self.generation, self.trial);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.reported && self.trial {
            self.breaker.release_trial(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: threshold,
            rolling_window: Duration::from_secs(60),
            cool_down: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }

    fn fail_times(breaker: &Arc<CircuitBreaker>, n: u32) {
        for _ in 0..n {
            breaker.try_acquire().expect("call allowed").failure();
        }
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_below_threshold() {
        let breaker = CircuitBreaker::with_config("user-service", config(3));
        fail_times(&breaker, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_short_circuits() {
        let breaker = CircuitBreaker::with_config("user-service", config(3));
        fail_times(&breaker, 3);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_failures() {
        let breaker = CircuitBreaker::with_config("user-service", config(3));
        fail_times(&breaker, 2);
        breaker.try_acquire().unwrap().success();
        fail_times(&breaker, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_do_not_count() {
        let breaker = CircuitBreaker::with_config("user-service", config(3));
        fail_times(&breaker, 2);
        tokio::time::advance(Duration::from_secs(61)).await;
        fail_times(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().recent_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_moves_open_to_half_open_without_calls() {
        let breaker = CircuitBreaker::with_config("job-service", config(1));
        fail_times(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(29)).await;
        settle().await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_one_trial_then_closes_on_success() {
        let breaker = CircuitBreaker::with_config("job-service", config(1));
        fail_times(&breaker, 1);
        tokio::time::advance(Duration::from_secs(30)).await;

        let trial = breaker.try_acquire().expect("trial allowed");
        assert!(trial.is_trial());
        assert!(breaker.try_acquire().is_none());

        trial.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let breaker = CircuitBreaker::with_config("job-service", config(1));
        fail_times(&breaker, 1);
        tokio::time::advance(Duration::from_secs(30)).await;

        breaker.try_acquire().unwrap().failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_permit_frees_slot() {
        let breaker = CircuitBreaker::with_config("notification-service", config(1));
        fail_times(&breaker, 1);
        tokio::time::advance(Duration::from_secs(30)).await;

        let trial = breaker.try_acquire().unwrap();
        drop(trial);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_outcome_is_ignored() {
        let breaker = CircuitBreaker::with_config("user-service", config(1));
        let slow_call = breaker.try_acquire().unwrap();
        fail_times(&breaker, 1);
        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;

        // A success from before the circuit opened must not close it.
        slow_call.success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_deadline_counts_from_open() {
        let breaker = CircuitBreaker::with_config("job-service", config(1));
        fail_times(&breaker, 1);

        // The timer task has not been polled yet when time moves on.
        tokio::time::advance(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_consistent_under_concurrent_calls() {
        let breaker = CircuitBreaker::with_config(
            "user-service",
            BreakerConfig {
                failure_threshold: 3,
                rolling_window: Duration::from_secs(60),
                cool_down: Duration::from_millis(20),
                half_open_max_calls: 2,
            },
        );

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let breaker = Arc::clone(&breaker);
            tasks.push(tokio::spawn(async move {
                for i in 0..300 {
                    if let Some(permit) = breaker.try_acquire() {
                        if i % 7 == 0 {
                            drop(permit);
                        } else {
                            permit.failure();
                        }
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // Dependency is healthy again: trial calls must get through and close it.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while breaker.state() != CircuitState::Closed {
            assert!(std::time::Instant::now() < deadline, "breaker never closed");
            if let Some(permit) = breaker.try_acquire() {
                permit.success();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let inner = breaker.lock();
        assert_eq!(inner.trials_in_flight, 0);
        assert!(inner.opened_at.is_none());
    }

    #[test]
    fn test_works_without_runtime() {
        let breaker = CircuitBreaker::with_config("user-service", config(1));
        fail_times(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }
}

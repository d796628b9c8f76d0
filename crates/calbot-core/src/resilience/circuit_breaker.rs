//! Circuit breaker to stop calling an operation that keeps failing.
//!
//! Once the failure threshold is reached the circuit opens and calls are
//! rejected without running the operation. After the recovery timeout a
//! single trial call is admitted; its outcome closes or re-opens the circuit.
//!
//! ```text
//! Closed ──[threshold failures]──> Open ──[timeout, next call]──> HalfOpen
//!   ▲                                ▲                               │
//!   └────────[trial succeeds]────────┼───────────────────────────────┤
//!                                    └────────[trial fails]──────────┘
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::observer::{ResilienceObserver, StateTransition, TracingObserver};
use crate::config::duration;
use crate::error::{CircuitOpenError, GuardError, Transient};

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Minimum time the circuit stays open before a trial call
    #[serde(with = "duration")]
    pub recovery_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Create a config with explicit values.
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
        }
    }

    /// Preset for text-generation and other AI backends.
    pub fn ai_service() -> Self {
        Self::new(5, Duration::from_secs(30))
    }

    /// Preset for database calls.
    pub fn database() -> Self {
        Self::new(3, Duration::from_secs(10))
    }

    /// Preset for slower third-party HTTP APIs.
    pub fn external_api() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::ai_service()
    }
}

/// State of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation
    Closed,

    /// Calls are rejected until the recovery timeout elapses
    Open,

    /// One trial call decides whether the circuit closes
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub operation: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Time since the last counted failure, if any
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    trial_in_flight: bool,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            trial_in_flight: false,
        }
    }

    /// Move to `to`, returning the previous state if it changed.
    fn move_to(&mut self, to: CircuitState) -> Option<CircuitState> {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        Some(from)
    }
}

/// Circuit breaker for a single guarded operation.
///
/// Share it behind an `Arc` between every concurrent caller of that
/// operation. State changes are serialized by an internal mutex that is
/// never held across an `.await`.
pub struct CircuitBreaker {
    operation: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    observer: Arc<dyn ResilienceObserver>,
}

impl CircuitBreaker {
    /// Create a breaker that reports transitions through `tracing`.
    pub fn new(operation: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_observer(operation, config, Arc::new(TracingObserver))
    }

    /// Create a breaker with a custom observer.
    pub fn with_observer(
        operation: impl Into<String>,
        config: CircuitBreakerConfig,
        observer: Arc<dyn ResilienceObserver>,
    ) -> Self {
        Self {
            operation: operation.into(),
            config,
            inner: Mutex::new(BreakerState::closed()),
            observer,
        }
    }

    /// Name of the guarded operation.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state.
    ///
    /// `Open` is reported until the next call notices the elapsed timeout.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Consecutive failures since the last success or reset.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            operation: self.operation.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            since_last_failure: inner.last_failure_at.map(|at| at.elapsed()),
        }
    }

    /// Run `operation` if the circuit allows it.
    ///
    /// Failures whose error is [`Transient`] count towards the threshold;
    /// other errors are returned without touching the breaker.
    pub async fn guard<F, Fut, T, E>(&self, operation: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient,
    {
        self.guard_with(operation, E::is_transient).await
    }

    /// Like [`guard`](Self::guard) with an explicit monitored-error predicate.
    pub async fn guard_with<F, Fut, T, E, C>(
        &self,
        operation: F,
        is_monitored: C,
    ) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
    {
        let permit = self.acquire()?;

        match operation().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(e) if is_monitored(&e) => {
                permit.fail();
                Err(GuardError::Inner(e))
            }
            Err(e) => {
                permit.release();
                Err(GuardError::Inner(e))
            }
        }
    }

    /// Force the circuit closed and forget recorded failures.
    pub fn reset(&self) {
        let (changed, failure_count) = {
            let mut inner = self.inner.lock();
            let failure_count = inner.failure_count;
            let changed = inner.move_to(CircuitState::Closed);
            *inner = BreakerState::closed();
            (changed, failure_count)
        };
        tracing::info!(operation = %self.operation, "Circuit manually reset");
        if let Some(from) = changed {
            self.emit(from, CircuitState::Closed, failure_count);
        }
    }

    fn acquire(&self) -> Result<CallPermit<'_>, CircuitOpenError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let mut changed = None;
        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(self.config.recovery_timeout);
                if elapsed < self.config.recovery_timeout {
                    tracing::debug!(operation = %self.operation, "Circuit open, call rejected");
                    return Err(self.open_error(self.config.recovery_timeout - elapsed));
                }
                if inner.trial_in_flight {
                    tracing::debug!(operation = %self.operation, "Earlier trial still running, call rejected");
                    return Err(self.open_error(Duration::ZERO));
                }
                changed = inner.move_to(CircuitState::HalfOpen);
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    tracing::debug!(operation = %self.operation, "Trial in flight, call rejected");
                    return Err(self.open_error(Duration::ZERO));
                }
                true
            }
        };

        if trial {
            inner.trial_in_flight = true;
        }
        let failure_count = inner.failure_count;
        drop(inner);

        if let Some(from) = changed {
            self.emit(from, CircuitState::HalfOpen, failure_count);
        }

        Ok(CallPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn record_success(&self, trial: bool) {
        let changed = {
            let mut inner = self.inner.lock();
            inner.failure_count = 0;
            inner.last_failure_at = None;
            // Only the trial itself frees the trial slot
            if trial {
                inner.trial_in_flight = false;
            }
            inner.move_to(CircuitState::Closed)
        };

        if let Some(from) = changed {
            self.emit(from, CircuitState::Closed, 0);
        }
    }

    fn record_failure(&self, trial: bool) {
        let (changed, failure_count) = {
            let mut inner = self.inner.lock();
            inner.failure_count = inner.failure_count.saturating_add(1);
            inner.last_failure_at = Some(Instant::now());
            if trial {
                inner.trial_in_flight = false;
            }

            // A late failure from a call admitted before the trip does not
            // decide the half-open trial
            let open = match inner.state {
                CircuitState::Closed => inner.failure_count >= self.config.failure_threshold,
                CircuitState::HalfOpen => trial,
                CircuitState::Open => false,
            };
            let changed = if open {
                inner.move_to(CircuitState::Open)
            } else {
                None
            };
            (changed, inner.failure_count)
        };

        tracing::debug!(
            operation = %self.operation,
            failure_count,
            threshold = self.config.failure_threshold,
            "Guarded call failed"
        );

        if let Some(from) = changed {
            self.emit(from, CircuitState::Open, failure_count);
        }
    }

    fn release(&self, trial: bool) {
        let state = {
            let mut inner = self.inner.lock();
            if trial {
                inner.trial_in_flight = false;
            }
            inner.state
        };
        tracing::debug!(
            operation = %self.operation,
            %state,
            trial,
            "Guarded call failed with unmonitored error"
        );
    }

    fn emit(&self, from: CircuitState, to: CircuitState, failure_count: u32) {
        self.observer.on_transition(&StateTransition {
            operation: self.operation.clone(),
            from,
            to,
            failure_count,
        });
    }

    fn open_error(&self, retry_in: Duration) -> CircuitOpenError {
        CircuitOpenError {
            operation: self.operation.clone(),
            retry_in,
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("operation", &self.operation)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

/// Admission ticket for one guarded call.
///
/// Dropping it unsettled (the call future was cancelled) counts as a failure.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CallPermit<'_> {
    fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }

    fn release(mut self) {
        self.settled = true;
        self.breaker.release(self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(
                operation = %self.breaker.operation,
                "Guarded call cancelled before completion"
            );
            self.breaker.record_failure(self.trial);
        }
    }
}

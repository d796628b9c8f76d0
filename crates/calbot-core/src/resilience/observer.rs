//! Structured events emitted by breakers and retries.
//!
//! Observers are for logging and metrics only; nothing they do feeds back
//! into control flow.

use std::time::Duration;

use super::circuit_breaker::CircuitState;

/// A breaker changed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    /// Guarded operation name
    pub operation: String,

    /// State before the transition
    pub from: CircuitState,

    /// State after the transition
    pub to: CircuitState,

    /// Consecutive failures at the time of the transition
    pub failure_count: u32,
}

/// A retried operation failed and may be attempted again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    /// Retried operation name
    pub operation: String,

    /// 1-based number of the attempt that just failed
    pub attempt: u32,

    /// Configured attempt limit
    pub max_attempts: u32,

    /// Delay before the next attempt, `None` if this was the last one
    pub next_delay: Option<Duration>,

    /// Rendered error of the failed attempt
    pub error: String,
}

/// Receives resilience events.
pub trait ResilienceObserver: Send + Sync {
    /// Called after every breaker state change.
    fn on_transition(&self, event: &StateTransition);

    /// Called after every failed retry attempt.
    fn on_retry(&self, _event: &RetryAttempt) {}
}

/// Default observer that writes `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ResilienceObserver for TracingObserver {
    fn on_transition(&self, event: &StateTransition) {
        match event.to {
            CircuitState::Open => tracing::warn!(
                operation = %event.operation,
                from = %event.from,
                failure_count = event.failure_count,
                "Circuit opened"
            ),
            CircuitState::HalfOpen => tracing::info!(
                operation = %event.operation,
                failure_count = event.failure_count,
                "Circuit half-open, admitting trial call"
            ),
            CircuitState::Closed => tracing::info!(
                operation = %event.operation,
                from = %event.from,
                "Circuit closed"
            ),
        }
    }

    fn on_retry(&self, event: &RetryAttempt) {
        match event.next_delay {
            Some(delay) => tracing::warn!(
                operation = %event.operation,
                attempt = event.attempt,
                max_attempts = event.max_attempts,
                delay = ?delay,
                error = %event.error,
                "Attempt failed, retrying"
            ),
            None => tracing::error!(
                operation = %event.operation,
                attempt = event.attempt,
                max_attempts = event.max_attempts,
                error = %event.error,
                "Attempt failed, retries exhausted"
            ),
        }
    }
}

/// Observer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ResilienceObserver for NoopObserver {
    fn on_transition(&self, _event: &StateTransition) {}
}

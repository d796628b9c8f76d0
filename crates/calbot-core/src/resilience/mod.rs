//! Resilience patterns for calbot.
//!
//! This module provides:
//! - Circuit breaker to stop calling failing operations
//! - Breaker registry owning one breaker per guarded operation
//! - Fixed-delay retry for idempotent operations
//! - Observer hook for breaker transitions and retry attempts

mod breakers;
mod circuit_breaker;
mod observer;
mod retry;

pub use breakers::BreakerRegistry;
pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use observer::{
    NoopObserver, ResilienceObserver, RetryAttempt, StateTransition, TracingObserver,
};
pub use retry::RetryPolicy;

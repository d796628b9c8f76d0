//! # calbot-core
//!
//! Failure handling for calbot's external dependencies.
//!
//! This crate keeps the bot answering when the services behind it do not:
//! - Circuit breakers stop hammering a dependency that keeps failing
//! - Fixed-delay retries absorb short glitches in idempotent storage calls
//! - A capability registry lists interchangeable providers in priority order
//! - The fallback orchestrator walks that list, one breaker per provider
//!
//! ## Key Guarantees
//!
//! 1. **Isolated**: One provider's failures never open another provider's breaker
//! 2. **Sequential**: Fallback candidates are tried one at a time, never raced
//! 3. **Single trial**: A recovering breaker admits exactly one call at a time
//! 4. **No HTTP**: Providers are plugged in through the [`Provider`] trait
//!
//! ## Example
//!
//! ```rust,ignore
//! use calbot_core::{Capability, CapabilityRegistry, FallbackOrchestrator, ResilienceConfig};
//!
//! let config = ResilienceConfig::from_yaml_file("calbot.yaml")?;
//! let mut registry = CapabilityRegistry::new();
//! registry.register(Capability::generate_text(), groq)?;
//! registry.register(Capability::generate_text(), gemini)?;
//!
//! let orchestrator = FallbackOrchestrator::new(
//!     Arc::new(registry),
//!     Arc::new(config.breaker_registry()),
//! );
//! let invocation = orchestrator
//!     .invoke_with_fallback(&Capability::generate_text(), &request, Some("gemini"))
//!     .await?;
//! println!("{} answered", invocation.provider);
//! ```

pub mod config;
pub mod error;
pub mod fallback;
pub mod provider;
pub mod resilience;

// Re-export main types at crate root
pub use config::{ConfigError, ResilienceConfig};
pub use error::{CircuitOpenError, GuardError, RetryError, Transient};
pub use fallback::{
    breaker_name, CallFailure, FallbackChain, FallbackError, FallbackOrchestrator, Invocation,
};
pub use provider::{
    Capability, CapabilityRegistry, Payload, Provider, ProviderError, Registration, RegistryError,
};
pub use resilience::{
    BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    NoopObserver, ResilienceObserver, RetryAttempt, RetryPolicy, StateTransition,
    TracingObserver,
};

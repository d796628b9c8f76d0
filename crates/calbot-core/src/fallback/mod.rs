//! Multi-provider fallback.
//!
//! A call names a capability and an optional preferred provider. The
//! orchestrator walks the resulting [`FallbackChain`], guarding every
//! provider call with that provider's own circuit breaker.

mod chain;
mod orchestrator;

pub use chain::FallbackChain;
pub use orchestrator::{
    breaker_name, CallFailure, FallbackError, FallbackOrchestrator, Invocation,
};

//! Ordered fallback across the providers of one capability.
//!
//! The orchestrator only decides ordering and aggregation. Failure memory
//! lives in one circuit breaker per (capability, provider) pair, so an
//! open provider is skipped without a network round trip and is retried
//! automatically once its own cooldown has passed.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::chain::FallbackChain;
use crate::error::{GuardError, Transient};
use crate::provider::{Capability, CapabilityRegistry, Payload, ProviderError};
use crate::resilience::{BreakerRegistry, CircuitBreaker};

/// Successful fallback call.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Provider that produced the response
    pub provider: String,

    /// Provider response
    pub response: Payload,

    /// Providers tried, in order, including the successful one
    pub attempted: Vec<String>,
}

/// The last failure seen during a fallback call.
#[derive(Debug)]
pub struct CallFailure {
    pub provider: String,
    pub cause: GuardError<ProviderError>,
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider '{}': {}", self.provider, self.cause)
    }
}

impl std::error::Error for CallFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Errors from the fallback orchestrator.
#[derive(Error, Debug)]
pub enum FallbackError {
    #[error("Unknown capability '{0}'")]
    UnknownCapability(Capability),

    #[error("Provider '{provider}' rejected the request: {source}")]
    Rejected {
        provider: String,
        source: ProviderError,
    },

    #[error("All providers failed for '{capability}'{}", describe_last(.last_error))]
    AllProvidersFailed {
        capability: Capability,
        attempted: Vec<String>,
        #[source]
        last_error: Option<CallFailure>,
    },
}

fn describe_last(last_error: &Option<CallFailure>) -> String {
    match last_error {
        Some(failure) => format!(", last error from {}", failure),
        None => ": no provider available".to_string(),
    }
}

/// Name of the breaker guarding `provider` for `capability`.
pub fn breaker_name(capability: &Capability, provider: &str) -> String {
    format!("{}:{}", capability, provider)
}

/// Tries a capability's providers in order until one succeeds.
#[derive(Debug, Clone)]
pub struct FallbackOrchestrator {
    registry: Arc<CapabilityRegistry>,
    breakers: Arc<BreakerRegistry>,
}

impl FallbackOrchestrator {
    pub fn new(registry: Arc<CapabilityRegistry>, breakers: Arc<BreakerRegistry>) -> Self {
        Self { registry, breakers }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Breaker guarding `provider` for `capability`.
    pub fn breaker_for(&self, capability: &Capability, provider: &str) -> Arc<CircuitBreaker> {
        self.breakers.breaker(&breaker_name(capability, provider))
    }

    /// Call `capability` with fallback.
    ///
    /// Candidates are tried strictly one after another. The first success
    /// wins. Transient failures and open circuits move on to the next
    /// candidate; a non-transient failure (bad request, missing
    /// configuration) stops the call and is returned as
    /// [`FallbackError::Rejected`].
    pub async fn invoke_with_fallback(
        &self,
        capability: &Capability,
        request: &Payload,
        preferred: Option<&str>,
    ) -> Result<Invocation, FallbackError> {
        if !self.registry.contains(capability) {
            return Err(FallbackError::UnknownCapability(capability.clone()));
        }

        let chain = FallbackChain::build(self.registry.get_providers(capability), preferred);
        let mut attempted = Vec::with_capacity(chain.len());
        let mut last_error = None;

        for registration in chain.iter() {
            let id = registration.id();
            let provider = registration.provider();
            let breaker = self.breaker_for(capability, id);
            attempted.push(id.to_string());

            match breaker.guard(|| provider.invoke(request)).await {
                Ok(response) => {
                    tracing::debug!(
                        capability = %capability,
                        provider = id,
                        attempts = attempted.len(),
                        "Provider succeeded"
                    );
                    return Ok(Invocation {
                        provider: id.to_string(),
                        response,
                        attempted,
                    });
                }
                Err(GuardError::Inner(e)) if !e.is_transient() => {
                    tracing::warn!(
                        capability = %capability,
                        provider = id,
                        error = %e,
                        "Provider rejected request, not falling back"
                    );
                    return Err(FallbackError::Rejected {
                        provider: id.to_string(),
                        source: e,
                    });
                }
                Err(e) => {
                    if e.is_open() {
                        tracing::info!(capability = %capability, provider = id, "Circuit open, skipping provider");
                    } else {
                        tracing::warn!(
                            capability = %capability,
                            provider = id,
                            error = %e,
                            "Provider failed, trying next candidate"
                        );
                    }
                    last_error = Some(CallFailure {
                        provider: id.to_string(),
                        cause: e,
                    });
                }
            }
        }

        tracing::error!(
            capability = %capability,
            attempted = ?attempted,
            "All providers failed"
        );
        Err(FallbackError::AllProvidersFailed {
            capability: capability.clone(),
            attempted,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use crate::resilience::{CircuitBreakerConfig, CircuitState};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Reject,
    }

    struct ScriptedProvider {
        id: &'static str,
        available: bool,
        behavior: Mutex<Behavior>,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn id(&self) -> &str {
            self.id
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn invoke(&self, request: &Payload) -> Result<Payload, ProviderError> {
            self.log.lock().push(self.id);
            let behavior = *self.behavior.lock();
            match behavior {
                Behavior::Succeed => Ok(json!({ "from": self.id, "echo": request })),
                Behavior::Fail => Err(ProviderError::HttpError(format!("{} is down", self.id))),
                Behavior::Reject => Err(ProviderError::InvalidRequest("missing prompt".into())),
            }
        }
    }

    struct Fixture {
        orchestrator: FallbackOrchestrator,
        providers: Vec<Arc<ScriptedProvider>>,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Fixture {
        fn new(specs: &[(&'static str, bool, Behavior)]) -> Self {
            Self::with_breaker(specs, CircuitBreakerConfig::new(5, Duration::from_secs(30)))
        }

        fn with_breaker(specs: &[(&'static str, bool, Behavior)], config: CircuitBreakerConfig) -> Self {
            let log = Arc::new(Mutex::new(Vec::new()));
            let mut registry = CapabilityRegistry::new();
            let mut providers = Vec::new();

            for &(id, available, behavior) in specs {
                let provider = Arc::new(ScriptedProvider {
                    id,
                    available,
                    behavior: Mutex::new(behavior),
                    log: log.clone(),
                });
                registry
                    .register(Capability::generate_text(), provider.clone())
                    .unwrap();
                providers.push(provider);
            }

            let orchestrator = FallbackOrchestrator::new(
                Arc::new(registry),
                Arc::new(BreakerRegistry::new(config)),
            );
            Self {
                orchestrator,
                providers,
                log,
            }
        }

        async fn call(&self, preferred: Option<&str>) -> Result<Invocation, FallbackError> {
            self.orchestrator
                .invoke_with_fallback(&Capability::generate_text(), &json!({"prompt": "hi"}), preferred)
                .await
        }

        fn calls(&self) -> Vec<&'static str> {
            self.log.lock().clone()
        }

        fn set(&self, index: usize, behavior: Behavior) {
            *self.providers[index].behavior.lock() = behavior;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_wins_in_order() {
        let fx = Fixture::new(&[
            ("a", true, Behavior::Fail),
            ("b", true, Behavior::Fail),
            ("c", true, Behavior::Succeed),
        ]);

        let invocation = fx.call(None).await.unwrap();

        assert_eq!(invocation.provider, "c");
        assert_eq!(invocation.response["from"], "c");
        assert_eq!(invocation.attempted, vec!["a", "b", "c"]);
        assert_eq!(fx.calls(), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_first_success() {
        let fx = Fixture::new(&[
            ("a", true, Behavior::Succeed),
            ("b", true, Behavior::Succeed),
        ]);

        let invocation = fx.call(None).await.unwrap();
        assert_eq!(invocation.provider, "a");
        assert_eq!(fx.calls(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preferred_provider_tried_first_without_repeat() {
        let fx = Fixture::new(&[
            ("a", true, Behavior::Fail),
            ("b", true, Behavior::Succeed),
            ("c", true, Behavior::Fail),
        ]);

        let invocation = fx.call(Some("c")).await.unwrap();

        assert_eq!(invocation.provider, "b");
        assert_eq!(fx.calls(), vec!["c", "a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_fail_carries_last_error() {
        let fx = Fixture::new(&[
            ("a", true, Behavior::Fail),
            ("b", true, Behavior::Fail),
            ("c", true, Behavior::Fail),
        ]);

        match fx.call(None).await {
            Err(FallbackError::AllProvidersFailed {
                attempted,
                last_error: Some(last),
                ..
            }) => {
                assert_eq!(attempted, vec!["a", "b", "c"]);
                assert_eq!(last.provider, "c");
                assert!(last.cause.to_string().contains("c is down"));
            }
            other => panic!("expected aggregated failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_providers_never_invoked() {
        let fx = Fixture::new(&[
            ("a", false, Behavior::Succeed),
            ("b", true, Behavior::Succeed),
        ]);

        let invocation = fx.call(Some("a")).await.unwrap();
        assert_eq!(invocation.provider, "b");
        assert_eq!(fx.calls(), vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_available_fails_without_cause() {
        let fx = Fixture::new(&[("a", false, Behavior::Succeed)]);

        let err = fx.call(None).await.unwrap_err();
        assert!(matches!(
            err,
            FallbackError::AllProvidersFailed { last_error: None, .. }
        ));
        assert!(err.to_string().contains("no provider available"));
        assert!(fx.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_provider_without_calling() {
        let fx = Fixture::with_breaker(
            &[("a", true, Behavior::Fail), ("b", true, Behavior::Succeed)],
            CircuitBreakerConfig::new(1, Duration::from_secs(30)),
        );

        assert_eq!(fx.call(None).await.unwrap().provider, "b");
        assert_eq!(fx.call(None).await.unwrap().provider, "b");

        // Second call skipped "a" at the breaker
        assert_eq!(fx.calls(), vec!["a", "b", "b"]);

        let capability = Capability::generate_text();
        let a = fx.orchestrator.breaker_for(&capability, "a");
        let b = fx.orchestrator.breaker_for(&capability, "b");
        assert_eq!(a.state(), CircuitState::Open);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_provider_recovers_after_cooldown() {
        let fx = Fixture::with_breaker(
            &[("a", true, Behavior::Fail), ("b", true, Behavior::Succeed)],
            CircuitBreakerConfig::new(1, Duration::from_secs(30)),
        );

        fx.call(None).await.unwrap();
        fx.set(0, Behavior::Succeed);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(fx.call(None).await.unwrap().provider, "b");

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(fx.call(None).await.unwrap().provider, "a");

        let a = fx.orchestrator.breaker_for(&Capability::generate_text(), "a");
        assert_eq!(a.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_stops_fallback() {
        let fx = Fixture::new(&[
            ("a", true, Behavior::Reject),
            ("b", true, Behavior::Succeed),
        ]);

        match fx.call(None).await {
            Err(FallbackError::Rejected { provider, source }) => {
                assert_eq!(provider, "a");
                assert!(matches!(source, ProviderError::InvalidRequest(_)));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(fx.calls(), vec!["a"]);

        let a = fx.orchestrator.breaker_for(&Capability::generate_text(), "a");
        assert_eq!(a.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_capability() {
        let fx = Fixture::new(&[("a", true, Behavior::Succeed)]);

        let result = fx
            .orchestrator
            .invoke_with_fallback(&Capability::from("price_quote"), &json!({}), None)
            .await;
        assert!(matches!(result, Err(FallbackError::UnknownCapability(_))));
    }

    #[test]
    fn test_breaker_name_format() {
        assert_eq!(
            breaker_name(&Capability::generate_text(), "groq"),
            "generate_text:groq"
        );
    }
}

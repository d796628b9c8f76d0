//! Owner of every circuit breaker in the process.
//!
//! Breakers are created on first use and live as long as the registry.
//! One operation name always maps to the same breaker instance.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
use super::observer::{ResilienceObserver, TracingObserver};

/// Container for per-operation circuit breakers.
pub struct BreakerRegistry {
    defaults: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    breakers: RwLock<BTreeMap<String, Arc<CircuitBreaker>>>,
    observer: Arc<dyn ResilienceObserver>,
}

impl BreakerRegistry {
    /// Create a registry with the given defaults and tracing observer.
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self::with_observer(defaults, Arc::new(TracingObserver))
    }

    pub fn with_observer(
        defaults: CircuitBreakerConfig,
        observer: Arc<dyn ResilienceObserver>,
    ) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            breakers: RwLock::new(BTreeMap::new()),
            observer,
        }
    }

    /// Use `config` for the named operation instead of the defaults.
    ///
    /// Only affects breakers created after the call.
    pub fn with_override(mut self, operation: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(operation.into(), config);
        self
    }

    /// Add several overrides at once.
    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, CircuitBreakerConfig)>,
    {
        self.overrides.extend(overrides);
        self
    }

    /// Configuration a breaker for `operation` would be created with.
    pub fn config_for(&self, operation: &str) -> &CircuitBreakerConfig {
        self.overrides.get(operation).unwrap_or(&self.defaults)
    }

    /// Get the breaker for `operation`, creating it on first use.
    pub fn breaker(&self, operation: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(operation) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write();
        breakers
            .entry(operation.to_string())
            .or_insert_with(|| {
                tracing::debug!(operation, "Creating circuit breaker");
                Arc::new(CircuitBreaker::with_observer(
                    operation,
                    self.config_for(operation).clone(),
                    self.observer.clone(),
                ))
            })
            .clone()
    }

    /// Breaker for `operation` if one was already created.
    pub fn get(&self, operation: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(operation).cloned()
    }

    /// Snapshots of all breakers, ordered by operation name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers
            .read()
            .values()
            .map(|breaker| breaker.snapshot())
            .collect()
    }

    /// Reset one breaker. Returns false if it was never created.
    pub fn reset(&self, operation: &str) -> bool {
        match self.get(operation) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Reset every breaker.
    pub fn reset_all(&self) {
        let breakers: Vec<_> = self.breakers.read().values().cloned().collect();
        for breaker in breakers {
            breaker.reset();
        }
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("defaults", &self.defaults)
            .field("overrides", &self.overrides)
            .field("breakers", &self.breakers.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Transient;
    use crate::resilience::CircuitState;
    use std::time::Duration;

    #[derive(Debug)]
    struct Down;

    impl Transient for Down {
        fn is_transient(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_same_operation_same_breaker() {
        let registry = BreakerRegistry::default();
        let a = registry.breaker("generate_text:groq");
        let b = registry.breaker("generate_text:groq");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_override_applies_to_named_operation() {
        let registry = BreakerRegistry::default()
            .with_override("database", CircuitBreakerConfig::database());

        assert_eq!(registry.breaker("database").config().failure_threshold, 3);
        assert_eq!(
            registry.breaker("generate_text:gemini").config().recovery_timeout,
            Duration::from_secs(30)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_breakers_are_independent() {
        let registry = BreakerRegistry::new(CircuitBreakerConfig::new(2, Duration::from_secs(30)));
        let a = registry.breaker("generate_text:a");
        let b = registry.breaker("generate_text:b");

        for _ in 0..2 {
            let _ = a.guard(|| async { Err::<(), _>(Down) }).await;
        }

        // A is open, but B is closed
        assert_eq!(a.state(), CircuitState::Open);
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_and_reset() {
        let registry = BreakerRegistry::new(CircuitBreakerConfig::new(1, Duration::from_secs(30)));
        let b = registry.breaker("b");
        registry.breaker("a");
        let _ = b.guard(|| async { Err::<(), _>(Down) }).await;

        let snapshots = registry.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].operation, "a");
        assert_eq!(snapshots[1].state, CircuitState::Open);

        assert!(registry.reset("b"));
        assert!(!registry.reset("missing"));
        assert_eq!(b.state(), CircuitState::Closed);
    }
}

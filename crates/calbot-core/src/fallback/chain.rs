//! Per-call candidate ordering.

use crate::provider::Registration;

/// Providers to try for one call, in order.
///
/// Built from a capability's registrations: the preferred provider (if
/// named and available) goes first, the rest follow in registry order.
/// Unavailable providers and repeated ids are dropped.
#[derive(Debug)]
pub struct FallbackChain<'a> {
    candidates: Vec<&'a Registration>,
}

impl<'a> FallbackChain<'a> {
    pub fn build(registrations: &'a [Registration], preferred: Option<&str>) -> Self {
        let mut candidates: Vec<&'a Registration> = Vec::with_capacity(registrations.len());

        if let Some(preferred) = preferred {
            match registrations.iter().find(|r| r.id() == preferred) {
                Some(r) if r.is_available() => candidates.push(r),
                Some(_) => {
                    tracing::debug!(provider = preferred, "Preferred provider unavailable, skipping")
                }
                None => tracing::warn!(
                    provider = preferred,
                    "Preferred provider not registered, using priority order"
                ),
            }
        }

        for registration in registrations {
            if !registration.is_available() {
                continue;
            }
            if candidates.iter().any(|c| c.id() == registration.id()) {
                continue;
            }
            candidates.push(registration);
        }

        Self { candidates }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Registration> + '_ {
        self.candidates.iter().copied()
    }

    pub fn ids(&self) -> Vec<&'a str> {
        self.candidates.iter().map(|r| r.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CapabilityRegistry, Capability, Payload, Provider, ProviderError};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Named(&'static str, bool);

    #[async_trait]
    impl Provider for Named {
        fn id(&self) -> &str {
            self.0
        }

        fn is_available(&self) -> bool {
            self.1
        }

        async fn invoke(&self, _request: &Payload) -> Result<Payload, ProviderError> {
            Ok(Payload::Null)
        }
    }

    fn registry(providers: &[(&'static str, bool)]) -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        for &(id, available) in providers {
            registry
                .register("generate_text", Arc::new(Named(id, available)))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_registry_order_without_preference() {
        let registry = registry(&[("a", true), ("b", true), ("c", true)]);
        let chain = FallbackChain::build(registry.get_providers(&Capability::generate_text()), None);
        assert_eq!(chain.ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_preferred_moves_to_front_once() {
        let registry = registry(&[("a", true), ("b", true), ("c", true)]);
        let chain =
            FallbackChain::build(registry.get_providers(&Capability::generate_text()), Some("c"));
        assert_eq!(chain.ids(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_unavailable_providers_are_dropped() {
        let registry = registry(&[("a", false), ("b", true), ("c", false)]);
        let chain =
            FallbackChain::build(registry.get_providers(&Capability::generate_text()), Some("c"));
        assert_eq!(chain.ids(), vec!["b"]);
    }

    #[test]
    fn test_unknown_preferred_falls_back_to_priority_order() {
        let registry = registry(&[("a", true), ("b", true)]);
        let chain =
            FallbackChain::build(registry.get_providers(&Capability::generate_text()), Some("z"));
        assert_eq!(chain.ids(), vec!["a", "b"]);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_empty_when_nothing_available() {
        let registry = registry(&[("a", false)]);
        let chain = FallbackChain::build(registry.get_providers(&Capability::generate_text()), None);
        assert!(chain.is_empty());
    }
}

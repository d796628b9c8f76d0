//! Capability registry: fixed-priority provider lists per capability.
//!
//! Lists are built once at startup. After that the registry is shared
//! read-only; the only runtime mutation is the per-registration enabled
//! flag, which is an atomic and safe to flip while other tasks read.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use super::{Capability, Provider};

/// Errors from registry construction and administration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Provider '{provider}' registered twice for capability '{capability}'")]
    DuplicateProvider {
        capability: Capability,
        provider: String,
    },

    #[error("Provider '{provider}' is not registered for capability '{capability}'")]
    UnknownProvider {
        capability: Capability,
        provider: String,
    },
}

/// A provider's slot in a capability's priority list.
pub struct Registration {
    provider: Arc<dyn Provider>,
    enabled: AtomicBool,
}

impl Registration {
    fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            enabled: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> &str {
        self.provider.id()
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Administrative switch, independent of the provider's own configuration.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enabled here and configured on the provider side.
    pub fn is_available(&self) -> bool {
        self.is_enabled() && self.provider.is_available()
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Ordered providers for each capability.
#[derive(Default)]
pub struct CapabilityRegistry {
    chains: BTreeMap<Capability, Vec<Registration>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `provider` to the end of `capability`'s priority list.
    pub fn register(
        &mut self,
        capability: impl Into<Capability>,
        provider: Arc<dyn Provider>,
    ) -> Result<(), RegistryError> {
        let capability = capability.into();
        let chain = self.chains.entry(capability.clone()).or_default();

        if chain.iter().any(|r| r.id() == provider.id()) {
            return Err(RegistryError::DuplicateProvider {
                capability,
                provider: provider.id().to_string(),
            });
        }

        tracing::debug!(
            capability = %capability,
            provider = provider.id(),
            priority = chain.len(),
            available = provider.is_available(),
            "Registered provider"
        );
        chain.push(Registration::new(provider));
        Ok(())
    }

    /// Providers for `capability` in priority order; empty if unknown.
    pub fn get_providers(&self, capability: &Capability) -> &[Registration] {
        self.chains
            .get(capability)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, capability: &Capability) -> bool {
        self.chains.contains_key(capability)
    }

    /// Registered capabilities in name order.
    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.chains.keys()
    }

    /// Enable or disable one provider for one capability.
    pub fn set_enabled(
        &self,
        capability: &Capability,
        provider: &str,
        enabled: bool,
    ) -> Result<(), RegistryError> {
        let registration = self
            .get_providers(capability)
            .iter()
            .find(|r| r.id() == provider)
            .ok_or_else(|| RegistryError::UnknownProvider {
                capability: capability.clone(),
                provider: provider.to_string(),
            })?;

        registration.enabled.store(enabled, Ordering::Release);
        tracing::info!(capability = %capability, provider, enabled, "Provider availability changed");
        Ok(())
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let chains: BTreeMap<_, Vec<_>> = self
            .chains
            .iter()
            .map(|(cap, chain)| (cap.as_str(), chain.iter().map(|r| r.id()).collect()))
            .collect();
        f.debug_struct("CapabilityRegistry")
            .field("chains", &chains)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Payload, ProviderError};
    use async_trait::async_trait;

    struct StaticProvider {
        id: &'static str,
        configured: bool,
    }

    #[async_trait]
    impl Provider for StaticProvider {
        fn id(&self) -> &str {
            self.id
        }

        fn is_available(&self) -> bool {
            self.configured
        }

        async fn invoke(&self, request: &Payload) -> Result<Payload, ProviderError> {
            Ok(request.clone())
        }
    }

    fn provider(id: &'static str, configured: bool) -> Arc<dyn Provider> {
        Arc::new(StaticProvider { id, configured })
    }

    #[test]
    fn test_registration_order_is_priority_order() {
        let mut registry = CapabilityRegistry::new();
        registry.register("generate_text", provider("cerebras", true)).unwrap();
        registry.register("generate_text", provider("groq", true)).unwrap();
        registry.register("generate_text", provider("gemini", false)).unwrap();

        let ids: Vec<_> = registry
            .get_providers(&Capability::generate_text())
            .iter()
            .map(|r| r.id())
            .collect();
        assert_eq!(ids, vec!["cerebras", "groq", "gemini"]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = CapabilityRegistry::new();
        registry.register("generate_text", provider("groq", true)).unwrap();

        let result = registry.register("generate_text", provider("groq", true));
        assert!(matches!(result, Err(RegistryError::DuplicateProvider { .. })));

        // Same id under a different capability is fine
        assert!(registry.register("summarize", provider("groq", true)).is_ok());
    }

    #[test]
    fn test_unknown_capability_is_empty() {
        let registry = CapabilityRegistry::new();
        assert!(registry.get_providers(&Capability::from("price_quote")).is_empty());
        assert!(!registry.contains(&Capability::from("price_quote")));
    }

    #[test]
    fn test_availability_combines_flag_and_provider() {
        let mut registry = CapabilityRegistry::new();
        registry.register("generate_text", provider("groq", true)).unwrap();
        registry.register("generate_text", provider("gemini", false)).unwrap();
        let cap = Capability::generate_text();

        let chain = registry.get_providers(&cap);
        assert!(chain[0].is_available());
        assert!(!chain[1].is_available());

        registry.set_enabled(&cap, "groq", false).unwrap();
        assert!(!registry.get_providers(&cap)[0].is_available());

        assert!(registry.set_enabled(&cap, "azure", true).is_err());
    }
}

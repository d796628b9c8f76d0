//! Runtime container: builds providers, registries and the orchestrator
//! from one [`RuntimeConfig`].

use std::collections::BTreeMap;
use std::sync::Arc;

use calbot_core::{
    BreakerRegistry, Capability, CapabilityRegistry, FallbackOrchestrator, Provider, RetryPolicy,
};

use crate::config::RuntimeConfig;
use crate::providers::ProviderCatalog;
use crate::text::TextGenerator;
use crate::RuntimeError;

/// Wired-up resilience stack, ready to serve calls.
#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    orchestrator: FallbackOrchestrator,
}

impl Runtime {
    /// Validate `config`, create every referenced provider, and register
    /// them per capability in configured order.
    ///
    /// A provider listed under several capabilities is created once and
    /// shared; its breakers are still separate per capability.
    pub fn from_config(config: RuntimeConfig, catalog: &ProviderCatalog) -> Result<Self, RuntimeError> {
        config.validate()?;

        let mut created: BTreeMap<&str, Arc<dyn Provider>> = BTreeMap::new();
        let mut registry = CapabilityRegistry::new();

        for (capability, ids) in &config.resilience.capabilities {
            for id in ids {
                let provider = match created.get(id.as_str()) {
                    Some(provider) => provider.clone(),
                    None => {
                        let provider = build_provider(&config, catalog, id)?;
                        created.insert(id.as_str(), provider.clone());
                        provider
                    }
                };
                registry.register(Capability::new(capability.as_str()), provider)?;
            }

            tracing::info!(
                capability = capability.as_str(),
                providers = ?ids,
                "Capability configured"
            );
        }

        let breakers = config.resilience.breaker_registry();
        let orchestrator = FallbackOrchestrator::new(Arc::new(registry), Arc::new(breakers));

        Ok(Self {
            config,
            orchestrator,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        self.orchestrator.registry()
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        self.orchestrator.breakers()
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator {
        &self.orchestrator
    }

    /// Retry policy for idempotent storage calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.resilience.retry
    }

    pub fn text_generator(&self) -> TextGenerator {
        TextGenerator::new(self.orchestrator.clone())
    }
}

fn build_provider(
    config: &RuntimeConfig,
    catalog: &ProviderCatalog,
    id: &str,
) -> Result<Arc<dyn Provider>, RuntimeError> {
    let provider_type = config.provider_type(id);
    let options = config
        .providers
        .get(id)
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    let provider = catalog
        .validate(provider_type, &options)
        .and_then(|()| catalog.create(provider_type, id, &options))
        .map_err(|source| RuntimeError::Provider {
            id: id.to_string(),
            source,
        })?;

    if !provider.is_available() {
        tracing::warn!(provider = id, provider_type, "Provider not configured, will be skipped");
    }
    Ok(provider)
}

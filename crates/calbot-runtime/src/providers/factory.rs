//! Provider factories, keyed by provider type.
//!
//! Each entry in the `providers` section of the config names a type
//! (`groq`, `anthropic`, ...). The catalog maps that type to a factory
//! which builds the adapter from the entry's remaining options.

use std::collections::BTreeMap;
use std::sync::Arc;

use calbot_core::{Provider, ProviderError};
use serde_json::Value as JsonValue;

use super::{AnthropicProviderFactory, GeminiProviderFactory, OpenAiCompatFactory};

/// Builds providers of one type from configuration.
pub trait ProviderFactory: Send + Sync {
    /// Type name used in configuration, e.g. `"groq"`.
    fn provider_type(&self) -> &'static str;

    /// Build a provider registered under `id`.
    ///
    /// A missing API key is not an error; the provider is created and
    /// reports itself unavailable.
    fn create(&self, id: &str, config: &JsonValue) -> Result<Arc<dyn Provider>, ProviderError>;

    /// Check option types without building anything.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;

    fn description(&self) -> &'static str {
        "Text generation provider"
    }
}

/// Known provider types.
#[derive(Default)]
pub struct ProviderCatalog {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in adapter.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.register(Arc::new(OpenAiCompatFactory::cerebras()));
        catalog.register(Arc::new(OpenAiCompatFactory::groq()));
        catalog.register(Arc::new(AnthropicProviderFactory));
        catalog.register(Arc::new(OpenAiCompatFactory::azure()));
        catalog.register(Arc::new(GeminiProviderFactory));
        catalog
    }

    /// Register a factory, replacing any previous one of the same type.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    pub fn create(
        &self,
        provider_type: &str,
        id: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        self.factory(provider_type)?.create(id, config)
    }

    pub fn validate(&self, provider_type: &str, config: &JsonValue) -> Result<(), ProviderError> {
        self.factory(provider_type)?.validate_config(config)
    }

    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    fn factory(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider type: '{}'. Available: {:?}",
                provider_type,
                self.available_types()
            ))
        })
    }
}

impl std::fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCatalog")
            .field("providers", &self.available_types())
            .finish()
    }
}

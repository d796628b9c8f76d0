//! Runtime configuration: resilience settings plus provider definitions.
//!
//! ```yaml
//! breaker:
//!   failure_threshold: 5
//!   recovery_timeout: 30s
//! capabilities:
//!   generate_text: [groq, gemini]
//! providers:
//!   groq:
//!     type: groq
//!     model: llama-3.1-70b-versatile
//!   gemini:
//!     type: gemini
//!     timeout: 20s
//! ```
//!
//! Provider entries are passed to their factory as-is; `type` defaults to
//! the entry's id.

use calbot_core::{Capability, ConfigError, ResilienceConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Default `generate_text` priority order.
pub const DEFAULT_TEXT_PROVIDERS: [(&str, &str); 5] = [
    ("cerebras", "cerebras"),
    ("groq", "groq"),
    ("anthropic", "anthropic"),
    ("azure", "azure_openai"),
    ("gemini", "gemini"),
];

/// Everything needed to build a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(flatten)]
    pub resilience: ResilienceConfig,

    /// Provider options by provider id
    #[serde(default)]
    pub providers: BTreeMap<String, JsonValue>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let mut resilience = ResilienceConfig::default();
        resilience.capabilities.insert(
            Capability::GENERATE_TEXT.to_string(),
            DEFAULT_TEXT_PROVIDERS
                .iter()
                .map(|(id, _)| id.to_string())
                .collect(),
        );

        let providers = DEFAULT_TEXT_PROVIDERS
            .iter()
            .map(|(id, provider_type)| (id.to_string(), serde_json::json!({ "type": provider_type })))
            .collect();

        Self {
            resilience,
            providers,
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Resilience checks plus provider references.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resilience.validate()?;

        for (id, options) in &self.providers {
            if !options.is_object() {
                return Err(ConfigError::Validation(format!(
                    "providers.{} must be a mapping",
                    id
                )));
            }
            if !matches!(options["type"], JsonValue::Null | JsonValue::String(_)) {
                return Err(ConfigError::Validation(format!(
                    "providers.{}.type must be a string",
                    id
                )));
            }
        }

        for (capability, ids) in &self.resilience.capabilities {
            if let Some(missing) = ids.iter().find(|id| !self.providers.contains_key(*id)) {
                return Err(ConfigError::Validation(format!(
                    "capability '{}' lists provider '{}' which has no entry under providers",
                    capability, missing
                )));
            }
        }

        Ok(())
    }

    /// Apply environment overrides to the resilience settings.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.resilience.apply_env()
    }

    /// Provider type for `id`: its `type` option, else the id itself.
    pub fn provider_type<'a>(&'a self, id: &'a str) -> &'a str {
        self.providers
            .get(id)
            .and_then(|options| options["type"].as_str())
            .unwrap_or(id)
    }
}

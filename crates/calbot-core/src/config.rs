//! Resilience configuration.
//!
//! Loaded from YAML, then adjusted by environment overrides:
//!
//! ```yaml
//! breaker:
//!   failure_threshold: 5
//!   recovery_timeout: 30s
//! breakers:
//!   "generate_text:gemini":
//!     failure_threshold: 2
//!     recovery_timeout: 2m
//! retry:
//!   max_attempts: 3
//!   delay: 1s
//! capabilities:
//!   generate_text: [cerebras, groq, anthropic, azure, gemini]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::{BreakerRegistry, CircuitBreakerConfig, RetryPolicy};

pub const ENV_FAIL_THRESHOLD: &str = "CIRCUIT_BREAKER_FAIL_THRESHOLD";
pub const ENV_RECOVERY_TIMEOUT: &str = "CIRCUIT_BREAKER_RECOVERY_TIMEOUT";
pub const ENV_MAX_RETRIES: &str = "DB_MAX_RETRIES";
pub const ENV_RETRY_DELAY: &str = "DB_RETRY_DELAY";

const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {0}")]
    Validation(String),

    #[error("Invalid value for {variable}: '{value}'")]
    InvalidOverride { variable: String, value: String },
}

/// Durations as humantime strings (`"30s"`, `"1m 30s"`) or whole seconds.
pub mod duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom),
        }
    }
}

/// Breaker, retry and provider-order settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Breaker settings for any operation without an override
    pub breaker: CircuitBreakerConfig,

    /// Per-operation breaker settings, keyed by breaker name
    pub breakers: BTreeMap<String, CircuitBreakerConfig>,

    /// Retry policy for idempotent storage operations
    pub retry: RetryPolicy,

    /// Provider ids per capability, in priority order
    pub capabilities: BTreeMap<String, Vec<String>>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            breaker: CircuitBreakerConfig::ai_service(),
            breakers: BTreeMap::new(),
            retry: RetryPolicy::default(),
            capabilities: BTreeMap::new(),
        }
    }
}

impl ResilienceConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: ResilienceConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_breaker("breaker", &self.breaker)?;
        for (operation, breaker) in &self.breakers {
            validate_breaker(&format!("breakers.{}", operation), breaker)?;
        }

        if !(1..=MAX_RETRY_ATTEMPTS).contains(&self.retry.max_attempts) {
            return Err(ConfigError::Validation(format!(
                "retry.max_attempts must be between 1 and {}, got {}",
                MAX_RETRY_ATTEMPTS, self.retry.max_attempts
            )));
        }

        for (capability, providers) in &self.capabilities {
            let mut seen = std::collections::HashSet::new();
            for provider in providers {
                if !seen.insert(provider) {
                    return Err(ConfigError::Validation(format!(
                        "provider '{}' listed twice for capability '{}'",
                        provider, capability
                    )));
                }
            }
        }

        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, then re-validate.
    ///
    /// Breaker overrides change the default breaker only; per-operation
    /// entries in `breakers` keep their explicit values.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(threshold) = parse_override::<u32>(&lookup, ENV_FAIL_THRESHOLD)? {
            self.breaker.failure_threshold = threshold;
        }
        if let Some(secs) = parse_override::<u64>(&lookup, ENV_RECOVERY_TIMEOUT)? {
            self.breaker.recovery_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_override::<u32>(&lookup, ENV_MAX_RETRIES)? {
            self.retry.max_attempts = attempts;
        }
        if let Some(secs) = parse_override::<u64>(&lookup, ENV_RETRY_DELAY)? {
            self.retry.delay = Duration::from_secs(secs);
        }
        self.validate()
    }

    /// Breaker registry using these defaults and overrides.
    pub fn breaker_registry(&self) -> BreakerRegistry {
        BreakerRegistry::new(self.breaker.clone()).with_overrides(self.breakers.clone())
    }
}

fn validate_breaker(name: &str, config: &CircuitBreakerConfig) -> Result<(), ConfigError> {
    if config.failure_threshold == 0 {
        return Err(ConfigError::Validation(format!(
            "{}.failure_threshold must be at least 1",
            name
        )));
    }
    if config.recovery_timeout.is_zero() {
        return Err(ConfigError::Validation(format!(
            "{}.recovery_timeout must be positive",
            name
        )));
    }
    Ok(())
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    variable: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(variable) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidOverride {
                variable: variable.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
breaker:
  failure_threshold: 3
  recovery_timeout: 45s
breakers:
  "generate_text:gemini":
    failure_threshold: 2
    recovery_timeout: 2m
retry:
  max_attempts: 4
  delay: 500ms
capabilities:
  generate_text: [cerebras, groq, gemini]
"#;
        let config = ResilienceConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.recovery_timeout, Duration::from_secs(45));
        assert_eq!(
            config.breakers["generate_text:gemini"].recovery_timeout,
            Duration::from_secs(120)
        );
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.delay, Duration::from_millis(500));
        assert_eq!(
            config.capabilities["generate_text"],
            vec!["cerebras", "groq", "gemini"]
        );
    }

    #[test]
    fn test_integer_seconds_and_defaults() {
        let config = ResilienceConfig::from_yaml("breaker:\n  failure_threshold: 2\n  recovery_timeout: 10\n").unwrap();

        assert_eq!(config.breaker.recovery_timeout, Duration::from_secs(10));
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.capabilities.is_empty());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ResilienceConfig::from_yaml("{}").unwrap();
        assert_eq!(config, ResilienceConfig::default());
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.recovery_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_threshold = "breaker:\n  failure_threshold: 0\n  recovery_timeout: 30s\n";
        assert!(matches!(
            ResilienceConfig::from_yaml(zero_threshold),
            Err(ConfigError::Validation(_))
        ));

        let zero_timeout = "breaker:\n  failure_threshold: 1\n  recovery_timeout: 0s\n";
        assert!(matches!(
            ResilienceConfig::from_yaml(zero_timeout),
            Err(ConfigError::Validation(_))
        ));

        let too_many = "retry:\n  max_attempts: 11\n  delay: 1s\n";
        assert!(matches!(
            ResilienceConfig::from_yaml(too_many),
            Err(ConfigError::Validation(_))
        ));

        let duplicate = "capabilities:\n  generate_text: [groq, groq]\n";
        assert!(matches!(
            ResilienceConfig::from_yaml(duplicate),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = ResilienceConfig::default();
        config
            .apply_overrides(env(&[
                (ENV_FAIL_THRESHOLD, "2"),
                (ENV_RECOVERY_TIMEOUT, "90"),
                (ENV_MAX_RETRIES, "5"),
                (ENV_RETRY_DELAY, " 2 "),
            ]))
            .unwrap();

        assert_eq!(config.breaker, CircuitBreakerConfig::new(2, Duration::from_secs(90)));
        assert_eq!(config.retry, RetryPolicy::new(5, Duration::from_secs(2)));
    }

    #[test]
    fn test_bad_override_is_reported() {
        let mut config = ResilienceConfig::default();
        let err = config
            .apply_overrides(env(&[(ENV_FAIL_THRESHOLD, "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { ref variable, .. } if variable == ENV_FAIL_THRESHOLD));

        // Parses, but fails validation
        let err = config
            .apply_overrides(env(&[(ENV_FAIL_THRESHOLD, "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_breaker_registry_applies_overrides() {
        let config = ResilienceConfig::from_yaml(
            "breakers:\n  \"generate_text:gemini\":\n    failure_threshold: 1\n    recovery_timeout: 5s\n",
        )
        .unwrap();
        let registry = config.breaker_registry();

        assert_eq!(registry.config_for("generate_text:gemini").failure_threshold, 1);
        assert_eq!(registry.config_for("generate_text:groq").failure_threshold, 5);
    }

    #[test]
    fn test_durations_serialize_as_text() {
        let yaml = serde_yaml::to_string(&ResilienceConfig::default()).unwrap();
        assert!(yaml.contains("recovery_timeout: 30s"));
        assert!(yaml.contains("delay: 1s"));
    }
}

//! API keys for provider adapters.
//!
//! Keys are wrapped in [`secrecy::SecretString`] as soon as they are read
//! and only exposed when an HTTP header is built. A key that is missing
//! is not an error here: the adapter is still registered and simply
//! reports itself unavailable, so the fallback chain skips it.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `providers.<id>.<key>` in the configuration file
    Config,
    /// Process environment
    Environment,
    /// Passed in by code
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A provider API key that never shows up in logs.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Look up `config_key` in the provider's config, then `env_var`.
    ///
    /// Blank values count as absent.
    pub fn resolve(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Option<Self> {
        Self::resolve_with(config, config_key, env_var, name, |var| std::env::var(var).ok())
    }

    /// [`resolve`](Self::resolve) with an explicit environment lookup.
    pub fn resolve_with(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Option<Self> {
        if let Some(value) = config[config_key].as_str().filter(|v| !v.trim().is_empty()) {
            return Some(Self::new(value, CredentialSource::Config, name));
        }

        match env(env_var) {
            Some(value) if !value.trim().is_empty() => {
                Some(Self::new(value, CredentialSource::Environment, name))
            }
            _ => {
                tracing::debug!(credential = name, env_var, "Credential not configured");
                None
            }
        }
    }

    /// The raw value, for building a request header or URL.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

//! Provider abstraction for interchangeable capability backends.
//!
//! A capability ("generate_text", "price_quote", ...) is served by one or
//! more providers. Each provider takes an opaque JSON payload and returns
//! an opaque JSON payload; typed request/response structs live with the
//! callers and adapters that agree on them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

mod registry;

pub use registry::{CapabilityRegistry, Registration, RegistryError};

use crate::error::Transient;

/// Opaque request/response body passed through the orchestrator.
pub type Payload = serde_json::Value;

/// Name of a capability.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    pub const GENERATE_TEXT: &'static str = "generate_text";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Free-form text generation.
    pub fn generate_text() -> Self {
        Self::new(Self::GENERATE_TEXT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Capability {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Capability {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Errors from capability providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Response parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl Transient for ProviderError {
    /// Configuration and request errors are the caller's problem, not the
    /// provider's availability; everything else counts against the provider.
    fn is_transient(&self) -> bool {
        !matches!(
            self,
            ProviderError::NotConfigured(_) | ProviderError::InvalidRequest(_)
        )
    }
}

/// A backend implementing one capability.
///
/// Implementations must be cheap to query for availability and must not
/// retry internally; the orchestrator decides what happens after a failure.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, used in configuration and breaker names.
    fn id(&self) -> &str;

    /// Whether the provider is configured well enough to be called.
    fn is_available(&self) -> bool;

    /// Execute one request.
    async fn invoke(&self, request: &Payload) -> Result<Payload, ProviderError>;
}

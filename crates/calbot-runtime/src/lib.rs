//! # calbot-runtime
//!
//! Concrete providers and wiring for `calbot-core`.
//!
//! This crate turns a [`RuntimeConfig`] into a running resilience stack:
//! - HTTP adapters for Cerebras, Groq, Anthropic, Azure OpenAI and Gemini
//! - A [`ProviderCatalog`] mapping config `type` names to adapter factories
//! - A [`Runtime`] holding the capability registry, breakers and orchestrator
//! - A typed [`TextGenerator`] for the `generate_text` capability
//! - A retrying wrapper for idempotent event-store writes
//!
//! ## Example
//!
//! ```rust,ignore
//! use calbot_runtime::{GenerateTextRequest, ProviderCatalog, Runtime, RuntimeConfig};
//!
//! let mut config = RuntimeConfig::from_yaml_file("calbot.yaml")?;
//! config.apply_env()?;
//!
//! let runtime = Runtime::from_config(config, &ProviderCatalog::with_defaults())?;
//! let answer = runtime
//!     .text_generator()
//!     .generate(&GenerateTextRequest::new("What's on Friday?"), None)
//!     .await?;
//! println!("{} ({})", answer.content, answer.provider);
//! ```

use calbot_core::{ConfigError, FallbackError, ProviderError, RegistryError};
use thiserror::Error;

pub mod config;
pub mod providers;
pub mod runtime;
pub mod storage;
pub mod text;

pub use config::RuntimeConfig;
pub use providers::{
    ApiCredential, CredentialSource, GenerateTextRequest, GenerateTextResponse, ProviderCatalog,
    ProviderFactory,
};
pub use runtime::Runtime;
pub use storage::{Event, EventStore, InMemoryEventStore, RetryingEventStore, StoreError};
pub use text::TextGenerator;

/// Errors from building or using the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Failed to set up provider '{id}': {source}")]
    Provider {
        id: String,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Fallback(#[from] FallbackError),

    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Provider '{provider}' returned an unexpected payload: {source}")]
    Decode {
        provider: String,
        #[source]
        source: serde_json::Error,
    },
}

//! Text-generation providers for the `generate_text` capability.
//!
//! Every adapter speaks the same payload shapes, [`GenerateTextRequest`]
//! in and [`GenerateTextResponse`] out, so the orchestrator can swap one
//! for another without knowing which vendor is behind it.
//!
//! ## Security
//!
//! All adapters load their keys through [`ApiCredential`]. See the
//! [`secrets`] module.

use calbot_core::{Payload, ProviderError};
use serde::{Deserialize, Serialize};

mod anthropic;
mod factory;
mod gemini;
mod http;
mod openai_compat;
pub mod secrets;

pub use anthropic::{AnthropicProvider, AnthropicProviderFactory};
pub use factory::{ProviderCatalog, ProviderFactory};
pub use gemini::{GeminiProvider, GeminiProviderFactory};
pub use openai_compat::{OpenAiCompatFactory, OpenAiCompatProvider};
pub use secrets::{ApiCredential, CredentialSource};

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default completion length.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Request payload for `generate_text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateTextRequest {
    /// User prompt
    pub prompt: String,

    /// Optional system instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl GenerateTextRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Decode a payload handed to a provider.
    ///
    /// Malformed payloads are the caller's fault and come back as
    /// [`ProviderError::InvalidRequest`], which never trips a breaker.
    pub fn from_payload(payload: &Payload) -> Result<Self, ProviderError> {
        let request: Self = serde_json::from_value(payload.clone())
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;

        if request.prompt.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("prompt is empty".to_string()));
        }
        if !(0.0..=2.0).contains(&request.temperature) {
            return Err(ProviderError::InvalidRequest(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                request.temperature
            )));
        }
        if request.max_tokens == 0 {
            return Err(ProviderError::InvalidRequest(
                "max_tokens must be positive".to_string(),
            ));
        }
        Ok(request)
    }

    pub fn to_payload(&self) -> Result<Payload, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Response payload for `generate_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateTextResponse {
    /// Generated text
    pub content: String,

    /// Model that produced it
    pub model: String,

    /// Provider id that produced it
    pub provider: String,
}

impl GenerateTextResponse {
    pub(crate) fn into_payload(self) -> Result<Payload, ProviderError> {
        serde_json::to_value(self).map_err(|e| ProviderError::ParseError(e.to_string()))
    }
}

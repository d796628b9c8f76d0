//! OpenAI-compatible chat completions: Cerebras, Groq and Azure OpenAI.
//!
//! The three vendors share the request and response shapes and differ in
//! URL layout and auth header.

use super::{
    factory::ProviderFactory,
    http::{
        build_client, check_string_option, check_url_option, duration_option, send_json,
        string_option,
    },
    secrets::ApiCredential,
    GenerateTextRequest, GenerateTextResponse,
};
use async_trait::async_trait;
use calbot_core::{Payload, Provider, ProviderError};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

pub const CEREBRAS_API_KEY_ENV: &str = "CEREBRAS_API_KEY";
pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";
pub const AZURE_OPENAI_API_KEY_ENV: &str = "AZURE_OPENAI_API_KEY";
pub const AZURE_OPENAI_ENDPOINT_ENV: &str = "AZURE_OPENAI_ENDPOINT";

const AZURE_API_VERSION: &str = "2024-02-15-preview";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Vendor-specific settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Preset {
    Cerebras,
    Groq,
    Azure,
}

impl Preset {
    fn provider_type(self) -> &'static str {
        match self {
            Preset::Cerebras => "cerebras",
            Preset::Groq => "groq",
            Preset::Azure => "azure_openai",
        }
    }

    fn key_env(self) -> &'static str {
        match self {
            Preset::Cerebras => CEREBRAS_API_KEY_ENV,
            Preset::Groq => GROQ_API_KEY_ENV,
            Preset::Azure => AZURE_OPENAI_API_KEY_ENV,
        }
    }

    fn key_name(self) -> &'static str {
        match self {
            Preset::Cerebras => "Cerebras API key",
            Preset::Groq => "Groq API key",
            Preset::Azure => "Azure OpenAI API key",
        }
    }

    /// Base URL when none is configured. Azure has no public default.
    fn default_base_url(self) -> Option<&'static str> {
        match self {
            Preset::Cerebras => Some("https://api.cerebras.ai/v1"),
            Preset::Groq => Some("https://api.groq.com/openai/v1"),
            Preset::Azure => None,
        }
    }

    /// Model, or deployment name for Azure.
    fn default_model(self) -> &'static str {
        match self {
            Preset::Cerebras => "llama-3.3-70b",
            Preset::Groq => "llama-3.1-70b-versatile",
            Preset::Azure => "gpt-4",
        }
    }
}

/// Chat-completions provider for one of the OpenAI-compatible vendors.
pub struct OpenAiCompatProvider {
    id: String,
    preset: Preset,
    credential: Option<ApiCredential>,
    base_url: Option<String>,
    model: String,
    api_version: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("id", &self.id)
            .field("type", &self.preset.provider_type())
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiCompatProvider {
    fn from_config(
        preset: Preset,
        id: impl Into<String>,
        config: &JsonValue,
    ) -> Result<Self, ProviderError> {
        let timeout = duration_option(config, "timeout", DEFAULT_TIMEOUT)?;

        let base_url = match preset {
            Preset::Azure => config["endpoint"]
                .as_str()
                .map(str::to_owned)
                .or_else(|| std::env::var(AZURE_OPENAI_ENDPOINT_ENV).ok())
                .filter(|url| !url.trim().is_empty()),
            _ => Some(string_option(
                config,
                "base_url",
                preset.default_base_url().unwrap_or_default(),
            )),
        }
        .map(|url| url.trim_end_matches('/').to_string());

        let model_key = if preset == Preset::Azure { "deployment" } else { "model" };

        Ok(Self {
            id: id.into(),
            preset,
            credential: ApiCredential::resolve(config, "api_key", preset.key_env(), preset.key_name()),
            base_url,
            model: string_option(config, model_key, preset.default_model()),
            api_version: string_option(config, "api_version", AZURE_API_VERSION),
            timeout,
            client: build_client(timeout)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> Option<String> {
        let base = self.base_url.as_deref()?;
        Some(match self.preset {
            Preset::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base, self.model, self.api_version
            ),
            _ => format!("{}/chat/completions", base),
        })
    }

    fn request_body(&self, request: &GenerateTextRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        ChatRequest {
            // Azure routes by deployment in the URL
            model: (self.preset != Preset::Azure).then(|| self.model.clone()),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }

    fn into_response(&self, body: ChatResponse) -> Result<GenerateTextResponse, ProviderError> {
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::ParseError("response contained no choices".to_string()))?;

        Ok(GenerateTextResponse {
            content,
            model: body.model.unwrap_or_else(|| self.model.clone()),
            provider: self.id.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        self.credential.is_some() && self.base_url.is_some()
    }

    async fn invoke(&self, request: &Payload) -> Result<Payload, ProviderError> {
        let request = GenerateTextRequest::from_payload(request)?;
        let credential = self.credential.as_ref().ok_or_else(|| {
            ProviderError::NotConfigured(format!("{} is not set", self.preset.key_env()))
        })?;
        let endpoint = self.endpoint().ok_or_else(|| {
            ProviderError::NotConfigured(format!("{} is not set", AZURE_OPENAI_ENDPOINT_ENV))
        })?;

        let http = self.client.post(endpoint).json(&self.request_body(&request));
        let http = match self.preset {
            Preset::Azure => http.header("api-key", credential.expose()),
            _ => http.bearer_auth(credential.expose()),
        };

        let body: ChatResponse = send_json(http, self.timeout).await?;
        self.into_response(body)?.into_payload()
    }
}

/// Factory for `type: cerebras`, `type: groq` and `type: azure_openai`.
pub struct OpenAiCompatFactory {
    preset: Preset,
}

impl OpenAiCompatFactory {
    pub fn cerebras() -> Self {
        Self {
            preset: Preset::Cerebras,
        }
    }

    pub fn groq() -> Self {
        Self {
            preset: Preset::Groq,
        }
    }

    pub fn azure() -> Self {
        Self {
            preset: Preset::Azure,
        }
    }
}

impl ProviderFactory for OpenAiCompatFactory {
    fn provider_type(&self) -> &'static str {
        self.preset.provider_type()
    }

    fn create(&self, id: &str, config: &JsonValue) -> Result<Arc<dyn Provider>, ProviderError> {
        Ok(Arc::new(OpenAiCompatProvider::from_config(self.preset, id, config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        check_url_option(config, "base_url")?;
        check_url_option(config, "endpoint")?;
        check_string_option(config, "model")?;
        check_string_option(config, "deployment")?;
        check_string_option(config, "api_version")?;
        duration_option(config, "timeout", DEFAULT_TIMEOUT)?;
        Ok(())
    }

    fn description(&self) -> &'static str {
        match self.preset {
            Preset::Cerebras => "Cerebras inference (OpenAI-compatible)",
            Preset::Groq => "Groq inference (OpenAI-compatible)",
            Preset::Azure => "Azure OpenAI deployment",
        }
    }
}

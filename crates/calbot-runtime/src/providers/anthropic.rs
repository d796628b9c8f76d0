//! Anthropic Messages API adapter.

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

/// Environment variable name for Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    id: String,
    credential: Option<ApiCredential>,
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("id", &self.id)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicProvider {
    /// Build from a `providers` entry.
    ///
    /// Options: `api_key` (else `ANTHROPIC_API_KEY`), `base_url`, `model`,
    /// `timeout`.
    pub fn from_config(id: impl Into<String>, config: &JsonValue) -> Result<Self, ProviderError> {
        let timeout = duration_option(config, "timeout", DEFAULT_TIMEOUT)?;
        Ok(Self {
            id: id.into(),
            credential: ApiCredential::resolve(
                config,
                "api_key",
                ANTHROPIC_API_KEY_ENV,
                "Anthropic API key",
            ),
            base_url: string_option(config, "base_url", DEFAULT_BASE_URL),
            model: string_option(config, "model", DEFAULT_MODEL),
            timeout,
            client: build_client(timeout)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &GenerateTextRequest) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system_prompt.clone(),
            messages: vec![AnthropicMessage {
                role: "user",
                content: request.prompt.clone(),
            }],
            temperature: request.temperature,
        }
    }

    fn into_response(&self, body: AnthropicResponse) -> Result<GenerateTextResponse, ProviderError> {
        let content = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(ProviderError::ParseError(
                "response contained no text blocks".to_string(),
            ));
        }

        Ok(GenerateTextResponse {
            content,
            model: body.model,
            provider: self.id.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        self.credential.is_some()
    }

    async fn invoke(&self, request: &Payload) -> Result<Payload, ProviderError> {
        let request = GenerateTextRequest::from_payload(request)?;
        let credential = self.credential.as_ref().ok_or_else(|| {
            ProviderError::NotConfigured(format!("{} is not set", ANTHROPIC_API_KEY_ENV))
        })?;

        let http = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", credential.expose())
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(&request));

        let body: AnthropicResponse = send_json(http, self.timeout).await?;
        self.into_response(body)?.into_payload()
    }
}

/// Factory for `type: anthropic`.
pub struct AnthropicProviderFactory;

impl ProviderFactory for AnthropicProviderFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, id: &str, config: &JsonValue) -> Result<Arc<dyn Provider>, ProviderError> {
        Ok(Arc::new(AnthropicProvider::from_config(id, config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        check_url_option(config, "base_url")?;
        check_string_option(config, "model")?;
        duration_option(config, "timeout", DEFAULT_TIMEOUT)?;
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Anthropic Claude (Messages API)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::from_config("anthropic", &json!({ "api_key": "sk-ant-test" })).unwrap()
    }

    #[test]
    fn test_defaults() {
        let provider = provider();
        assert_eq!(provider.id(), "anthropic");
        assert_eq!(provider.model(), "claude-3-5-sonnet-20241022");
        assert!(provider.is_available());
        assert!(!format!("{:?}", provider).contains("sk-ant-test"));
    }

    #[test]
    fn test_request_body_carries_system_prompt_separately() {
        let request = GenerateTextRequest::new("When is the meeting?")
            .with_system_prompt("You are a calendar assistant.")
            .with_max_tokens(256);

        let body = serde_json::to_value(provider().request_body(&request)).unwrap();
        assert_eq!(body["system"], "You are a calendar assistant.");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "When is the meeting?");

        let body = serde_json::to_value(provider().request_body(&GenerateTextRequest::new("Hi"))).unwrap();
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_response_joins_text_blocks() {
        let body: AnthropicResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "model": "claude-3-5-sonnet-20241022",
            "content": [
                { "type": "text", "text": "Tomorrow " },
                { "type": "text", "text": "at 10am." }
            ]
        }))
        .unwrap();

        let response = provider().into_response(body).unwrap();
        assert_eq!(response.content, "Tomorrow at 10am.");
        assert_eq!(response.provider, "anthropic");
    }

    #[test]
    fn test_empty_response_is_parse_error() {
        let body: AnthropicResponse =
            serde_json::from_value(json!({ "model": "m", "content": [] })).unwrap();
        assert!(matches!(
            provider().into_response(body),
            Err(ProviderError::ParseError(_))
        ));
    }
}

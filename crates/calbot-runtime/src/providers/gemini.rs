//! Google Gemini `generateContent` adapter.

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

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Gemini provider.
///
/// The system prompt is folded into the user turn rather than sent as a
/// separate instruction.
pub struct GeminiProvider {
    id: String,
    credential: Option<ApiCredential>,
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("id", &self.id)
            .field("credential", &self.credential)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiProvider {
    pub fn from_config(id: impl Into<String>, config: &JsonValue) -> Result<Self, ProviderError> {
        let timeout = duration_option(config, "timeout", DEFAULT_TIMEOUT)?;
        Ok(Self {
            id: id.into(),
            credential: ApiCredential::resolve(config, "api_key", GEMINI_API_KEY_ENV, "Gemini API key"),
            base_url: string_option(config, "base_url", DEFAULT_BASE_URL),
            model: string_option(config, "model", DEFAULT_MODEL),
            timeout,
            client: build_client(timeout)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &GenerateTextRequest) -> GeminiRequest {
        let text = match &request.system_prompt {
            Some(system) => format!("{}\n\n{}", system, request.prompt),
            None => request.prompt.clone(),
        };

        GeminiRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text: Some(text) }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }

    fn into_response(&self, body: GeminiResponse) -> Result<GenerateTextResponse, ProviderError> {
        let content = body
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ProviderError::ParseError("response contained no candidates".to_string()))?;

        Ok(GenerateTextResponse {
            content,
            model: body.model_version.unwrap_or_else(|| self.model.clone()),
            provider: self.id.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[async_trait]
impl Provider for GeminiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        self.credential.is_some()
    }

    async fn invoke(&self, request: &Payload) -> Result<Payload, ProviderError> {
        let request = GenerateTextRequest::from_payload(request)?;
        let credential = self.credential.as_ref().ok_or_else(|| {
            ProviderError::NotConfigured(format!("{} is not set", GEMINI_API_KEY_ENV))
        })?;

        let http = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", credential.expose())
            .json(&self.request_body(&request));

        let body: GeminiResponse = send_json(http, self.timeout).await?;
        self.into_response(body)?.into_payload()
    }
}

/// Factory for `type: gemini`.
pub struct GeminiProviderFactory;

impl ProviderFactory for GeminiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "gemini"
    }

    fn create(&self, id: &str, config: &JsonValue) -> Result<Arc<dyn Provider>, ProviderError> {
        Ok(Arc::new(GeminiProvider::from_config(id, config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        check_url_option(config, "base_url")?;
        check_string_option(config, "model")?;
        duration_option(config, "timeout", DEFAULT_TIMEOUT)?;
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Google Gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> GeminiProvider {
        GeminiProvider::from_config("gemini", &json!({ "api_key": "AIza-test" })).unwrap()
    }

    #[test]
    fn test_system_prompt_prepended() {
        let request = GenerateTextRequest::new("What's on today?")
            .with_system_prompt("You manage a shared calendar.")
            .with_max_tokens(100);

        let body = serde_json::to_value(provider().request_body(&request)).unwrap();
        assert_eq!(
            body["contents"][0]["parts"][0]["text"],
            "You manage a shared calendar.\n\nWhat's on today?"
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 100);
    }

    #[test]
    fn test_response_parsing() {
        let body: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Nothing " }, { "text": "scheduled." }] },
                "finishReason": "STOP"
            }],
            "modelVersion": "gemini-2.0-flash-exp"
        }))
        .unwrap();

        let response = provider().into_response(body).unwrap();
        assert_eq!(response.content, "Nothing scheduled.");
        assert_eq!(response.model, "gemini-2.0-flash-exp");
    }

    #[test]
    fn test_blocked_response_is_parse_error() {
        let body: GeminiResponse =
            serde_json::from_value(json!({ "promptFeedback": { "blockReason": "SAFETY" } })).unwrap();
        assert!(matches!(
            provider().into_response(body),
            Err(ProviderError::ParseError(_))
        ));
    }
}

//! Shared HTTP plumbing for the adapters.

use calbot_core::ProviderError;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;

const MAX_ERROR_MESSAGE: usize = 300;

pub(crate) fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::HttpError(format!("failed to build HTTP client: {}", e)))
}

/// Send `request` and decode a successful JSON body.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    timeout: Duration,
) -> Result<T, ProviderError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::Timeout(timeout)
        } else {
            ProviderError::HttpError(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status.as_u16(), retry_after.as_deref(), &body));
    }

    response.json::<T>().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::Timeout(timeout)
        } else {
            ProviderError::ParseError(e.to_string())
        }
    })
}

/// Map a non-success response to a provider error.
pub(crate) fn status_error(status: u16, retry_after: Option<&str>, body: &str) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        401 | 403 => ProviderError::AuthError,
        _ => ProviderError::ApiError {
            status,
            message: error_message(body),
        },
    }
}

/// Pull a readable message out of a vendor error body.
///
/// Handles `{"error": {"message": ..}}`, `{"error": ".."}` and
/// `{"message": ..}`, falling back to the raw (truncated) body.
fn error_message(body: &str) -> String {
    let parsed: Option<JsonValue> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|json| {
        json["error"]["message"]
            .as_str()
            .or_else(|| json["error"].as_str())
            .or_else(|| json["message"].as_str())
            .map(str::to_owned)
    });

    match message {
        Some(message) => message,
        None => body.trim().chars().take(MAX_ERROR_MESSAGE).collect(),
    }
}

/// Read an optional duration option (`"30s"` or whole seconds).
pub(crate) fn duration_option(
    config: &JsonValue,
    key: &str,
    default: Duration,
) -> Result<Duration, ProviderError> {
    match &config[key] {
        JsonValue::Null => Ok(default),
        JsonValue::Number(n) => n
            .as_u64()
            .map(Duration::from_secs)
            .ok_or_else(|| ProviderError::NotConfigured(format!("'{}' must be whole seconds", key))),
        JsonValue::String(s) => humantime::parse_duration(s.trim())
            .map_err(|e| ProviderError::NotConfigured(format!("'{}': {}", key, e))),
        _ => Err(ProviderError::NotConfigured(format!(
            "'{}' must be a duration such as \"30s\"",
            key
        ))),
    }
}

/// Check that an optional URL option looks like an HTTP(S) URL.
pub(crate) fn check_url_option(config: &JsonValue, key: &str) -> Result<(), ProviderError> {
    match &config[key] {
        JsonValue::Null => Ok(()),
        JsonValue::String(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
        _ => Err(ProviderError::NotConfigured(format!(
            "'{}' must start with http:// or https://",
            key
        ))),
    }
}

pub(crate) fn check_string_option(config: &JsonValue, key: &str) -> Result<(), ProviderError> {
    match &config[key] {
        JsonValue::Null | JsonValue::String(_) => Ok(()),
        _ => Err(ProviderError::NotConfigured(format!("'{}' must be a string", key))),
    }
}

/// String option or `default`.
pub(crate) fn string_option(config: &JsonValue, key: &str, default: &str) -> String {
    config[key].as_str().unwrap_or(default).to_string()
}

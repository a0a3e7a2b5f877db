//! `ContentGenerator` trait and the `GeminiClient` REST implementation.
//!
//! `GeminiClient` calls `{base_url}/v1beta/models/{model}:generateContent`.
//! All connection details come from [`GeminiConfig`]; the API key travels in
//! the `x-goog-api-key` header.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::GeminiConfig;
use crate::gemini::types::{GenerateContentRequest, GenerateContentResponse};

// ---------------------------------------------------------------------------
// GeminiError
// ---------------------------------------------------------------------------

/// Errors that can occur while talking to the Gemini REST API.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// No API key in the config file or the environment.
    #[error("no Gemini API key configured (set GEMINI_API_KEY)")]
    MissingApiKey,

    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("Gemini request timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("Gemini returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not the expected JSON.
    #[error("failed to parse Gemini response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for GeminiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GeminiError::Timeout
        } else {
            GeminiError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ContentGenerator trait
// ---------------------------------------------------------------------------

/// One-shot content generation against a named model.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn ContentGenerator>`.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError>;
}

// ---------------------------------------------------------------------------
// GeminiClient
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    /// Build a client from application config.
    ///
    /// Fails with [`GeminiError::MissingApiKey`] when no key can be resolved.
    pub fn from_config(config: &GeminiConfig) -> Result<Self, GeminiError> {
        let api_key = config.resolve_api_key().ok_or(GeminiError::MissingApiKey)?;
        Ok(Self::with_api_key(config, api_key))
    }

    /// Build a client with an explicit key, ignoring the environment.
    pub fn with_api_key(config: &GeminiConfig, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let url = self.endpoint(model);
        log::debug!("gemini: POST {url}");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| GeminiError::Parse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> GeminiConfig {
        GeminiConfig {
            base_url: "https://generativelanguage.googleapis.com/".into(),
            ..GeminiConfig::default()
        }
    }

    fn make_client() -> GeminiClient {
        GeminiClient::with_api_key(&make_config(), "k-123")
    }

    #[test]
    fn explicit_key_is_used_verbatim() {
        assert_eq!(make_client().api_key, "k-123");
    }

    #[test]
    fn endpoint_joins_base_url_and_model() {
        let client = make_client();
        assert_eq!(
            client.endpoint("gemini-3-flash-preview"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-flash-preview:generateContent"
        );
        assert_eq!(
            client.endpoint("models/gemini-3-pro-preview"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-pro-preview:generateContent"
        );
    }

    /// Verify that `GeminiClient` is object-safe (usable as `dyn ContentGenerator`).
    #[test]
    fn client_is_object_safe() {
        let client: Box<dyn ContentGenerator> = Box::new(make_client());
        drop(client);
    }
}

//! OpenAI-compatible chat completion adapter.
//!
//! Works against any endpoint speaking the `chat/completions` protocol
//! (Groq, OpenAI, local gateways). The base URL comes from [`ProviderConfig`].

use super::{CapabilityProvider, GenerationRequest};
use crate::config::ProviderConfig;
use crate::errors::{ConfigError, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Capability provider backed by an OpenAI-compatible HTTP API.
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: ProviderConfig,
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleProvider {
    /// Creates the adapter from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::invalid("http_client", e.to_string()))?;

        Ok(Self { client, config })
    }

    fn api_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn parse_error_response(status: reqwest::StatusCode, body: &str) -> ProviderError {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.chars().take(200).collect());

        ProviderError::Http {
            status: status.as_u16(),
            message,
        }
    }

    fn map_send_error(&self, e: &reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                timeout_ms: u64::try_from(self.config.timeout().as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl CapabilityProvider for OpenAiCompatibleProvider {
    #[instrument(skip(self, request), fields(model = %self.config.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            stream: false,
        };

        debug!(prompt_chars = request.prompt.len(), "Sending chat completion request");

        let response = self
            .client
            .post(self.api_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send request to provider: {}", e);
                self.map_send_error(&e)
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            error!("Failed to read provider response: {}", e);
            self.map_send_error(&e)
        })?;

        if !status.is_success() {
            return Err(Self::parse_error_response(status, &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::EmptyResponse("no choices returned".to_string()))?;

        let content = choice.message.content.unwrap_or_default().trim().to_string();
        if content.is_empty() {
            return Err(ProviderError::EmptyResponse("completion text was empty".to_string()));
        }

        debug!(
            chars = content.len(),
            finish_reason = ?choice.finish_reason,
            "Received completion"
        );

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig::new("llama-3.3-70b-versatile", "test-key")
            .with_base_url("https://api.example.com/v1/")
    }

    #[test]
    fn test_api_url_trims_trailing_slash() {
        let provider = OpenAiCompatibleProvider::new(config()).unwrap();
        assert_eq!(provider.api_url(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_debug_hides_api_key() {
        let provider = OpenAiCompatibleProvider::new(config()).unwrap();
        assert!(!format!("{provider:?}").contains("test-key"));
    }

    #[test]
    fn test_parse_error_response() {
        let err = OpenAiCompatibleProvider::parse_error_response(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error": {"message": "rate limited"}}"#,
        );
        assert_eq!(
            err,
            ProviderError::Http {
                status: 429,
                message: "rate limited".to_string()
            }
        );
        assert!(err.is_transient());

        let err = OpenAiCompatibleProvider::parse_error_response(
            reqwest::StatusCode::UNAUTHORIZED,
            "not json",
        );
        assert!(matches!(err, ProviderError::Http { status: 401, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_request_serialization() {
        let body = ChatRequest {
            model: "m",
            messages: vec![
                ChatMessage { role: "system", content: "chef" },
                ChatMessage { role: "user", content: "hi" },
            ],
            temperature: 0.5,
            max_tokens: 200,
            stream: false,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["max_tokens"], 200);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = config().with_temperature(2.0);
        assert!(OpenAiCompatibleProvider::new(bad).is_err());
    }
}

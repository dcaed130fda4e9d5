//! Capability provider adapters.
//!
//! A capability provider turns a prompt into generated text. Stages only see
//! the [`CapabilityProvider`] trait; the HTTP adapter and the retry/timeout
//! wrapper live behind it.

#[cfg(feature = "http-provider")]
mod openai;
mod retry;

#[cfg(feature = "http-provider")]
pub use openai::OpenAiCompatibleProvider;
pub use retry::{JitterStrategy, RetryConfig, RetryingProvider};

use crate::errors::{ConfigError, ProviderError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Generation parameters for a single provider call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            temperature: 0.7,
        }
    }
}

impl GenerationParams {
    /// Creates new generation parameters.
    #[must_use]
    pub fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
        }
    }

    /// Sets the token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `max_tokens` is zero or the
    /// temperature is outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens == 0 {
            return Err(ConfigError::invalid("max_tokens", "must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::invalid(
                "temperature",
                format!("{} is outside [0, 1]", self.temperature),
            ));
        }
        Ok(())
    }
}

/// A single generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The user prompt.
    pub prompt: String,
    /// Optional role description sent ahead of the prompt.
    pub system: Option<String>,
    /// Generation parameters.
    pub params: GenerationParams,
}

impl GenerationRequest {
    /// Creates a new request.
    #[must_use]
    pub fn new(prompt: impl Into<String>, params: GenerationParams) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            params,
        }
    }

    /// Sets the role description.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// External text-generation capability.
///
/// Implementations are fallible, possibly slow and not deterministic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Generates text for the request.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}

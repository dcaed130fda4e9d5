//! Configuration for the provider adapter and the recipe pipeline.
//!
//! Configuration is read from the environment once at startup. A missing
//! credential or model identifier is a fatal [`ConfigError`].

use crate::errors::ConfigError;
use crate::provider::{GenerationParams, RetryConfig};
use crate::stages::FetchPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Groq API key.
pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";
/// Groq model identifier.
pub const GROQ_MODEL_ENV: &str = "GROQ_MODEL_NAME";
/// Misspelt Groq model variable still found in older `.env` files.
pub const GROQ_MODEL_LEGACY_ENV: &str = "GROG_MODEL_NAME";
/// OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// OpenAI model identifier.
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL_NAME";

const BASE_URL_ENV: &str = "RECIPEFLOW_BASE_URL";
const MAX_TOKENS_ENV: &str = "RECIPEFLOW_MAX_TOKENS";
const TEMPERATURE_ENV: &str = "RECIPEFLOW_TEMPERATURE";
const TIMEOUT_ENV: &str = "RECIPEFLOW_TIMEOUT_SECS";
const MAX_RETRIES_ENV: &str = "RECIPEFLOW_MAX_RETRIES";
const MAX_RESULTS_ENV: &str = "RECIPEFLOW_MAX_RESULTS";
const FETCH_CONCURRENCY_ENV: &str = "RECIPEFLOW_FETCH_CONCURRENCY";
const FETCH_POLICY_ENV: &str = "RECIPEFLOW_FETCH_POLICY";

/// Groq's OpenAI-compatible endpoint.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
/// OpenAI's endpoint.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for the capability provider adapter.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Model identifier.
    pub model: String,
    /// API credential.
    #[serde(skip_serializing, default)]
    pub api_key: String,
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Default token limit per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Default sampling temperature in `[0, 1]`.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Retry policy for transient provider errors.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_base_url() -> String {
    GROQ_BASE_URL.to_string()
}

fn default_max_tokens() -> u32 {
    GenerationParams::default().max_tokens
}

fn default_temperature() -> f32 {
    GenerationParams::default().temperature
}

fn default_timeout() -> f64 {
    60.0
}

/// Largest accepted per-call timeout, in seconds.
pub const MAX_TIMEOUT_SECONDS: f64 = 3600.0;

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ProviderConfig {
    /// Creates a configuration with defaults for everything but the model and key.
    #[must_use]
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the default token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the default temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Gets the timeout as a `Duration`, clamped to [`MAX_TIMEOUT_SECONDS`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds.clamp(0.0, MAX_TIMEOUT_SECONDS))
            .unwrap_or_default()
    }

    /// Default generation parameters derived from this configuration.
    #[must_use]
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams::new(self.max_tokens, self.temperature)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for an empty model or key, bad
    /// generation parameters or a timeout outside `(0, MAX_TIMEOUT_SECONDS]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("model", "must not be empty"));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::invalid("api_key", "must not be empty"));
        }
        if !(self.timeout_seconds.is_finite() && self.timeout_seconds > 0.0) {
            return Err(ConfigError::invalid("timeout_seconds", "must be positive"));
        }
        if self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(ConfigError::invalid(
                "timeout_seconds",
                format!("must be at most {MAX_TIMEOUT_SECONDS} seconds"),
            ));
        }
        self.generation_params().validate()
    }
}

/// Settings for the recipe pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Maximum number of recipe ids kept from the search stage.
    #[serde(default = "default_max_results")]
    pub max_search_results: usize,
    /// What the fetch stage does when one recipe id fails.
    #[serde(default)]
    pub fetch_policy: FetchPolicy,
    /// Number of detail fetches in flight at once. `1` is sequential.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

fn default_max_results() -> usize {
    5
}

fn default_fetch_concurrency() -> usize {
    1
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_search_results: default_max_results(),
            fetch_policy: FetchPolicy::default(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

impl PipelineSettings {
    /// Creates default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of search results.
    #[must_use]
    pub fn with_max_search_results(mut self, max: usize) -> Self {
        self.max_search_results = max.max(1);
        self
    }

    /// Sets the fetch policy.
    #[must_use]
    pub fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    /// Sets the fetch concurrency.
    #[must_use]
    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency.max(1);
        self
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider adapter configuration.
    pub provider: ProviderConfig,
    /// Pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

impl AppConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the credential or model is missing, or any
    /// optional variable is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through an arbitrary variable lookup.
    ///
    /// Groq variables take precedence; OpenAI variables are the fallback and
    /// switch the default base URL to OpenAI's.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let (api_key, model_candidates, default_url) = if let Some(key) = get(GROQ_API_KEY_ENV) {
            (key, [GROQ_MODEL_ENV, GROQ_MODEL_LEGACY_ENV], GROQ_BASE_URL)
        } else if let Some(key) = get(OPENAI_API_KEY_ENV) {
            (key, [OPENAI_MODEL_ENV, OPENAI_MODEL_ENV], OPENAI_BASE_URL)
        } else {
            return Err(ConfigError::MissingVar {
                candidates: vec![GROQ_API_KEY_ENV.to_string(), OPENAI_API_KEY_ENV.to_string()],
            });
        };

        let model = model_candidates
            .iter()
            .find_map(|k| get(*k))
            .ok_or_else(|| ConfigError::MissingVar {
                candidates: {
                    let mut names: Vec<String> =
                        model_candidates.iter().map(|s| (*s).to_string()).collect();
                    names.dedup();
                    names
                },
            })?;

        let mut provider = ProviderConfig::new(model, api_key)
            .with_base_url(get(BASE_URL_ENV).unwrap_or_else(|| default_url.to_string()));

        if let Some(v) = get(MAX_TOKENS_ENV) {
            provider.max_tokens = parse(MAX_TOKENS_ENV, &v)?;
        }
        if let Some(v) = get(TEMPERATURE_ENV) {
            provider.temperature = parse(TEMPERATURE_ENV, &v)?;
        }
        if let Some(v) = get(TIMEOUT_ENV) {
            provider.timeout_seconds = parse(TIMEOUT_ENV, &v)?;
        }
        if let Some(v) = get(MAX_RETRIES_ENV) {
            let retries: usize = parse(MAX_RETRIES_ENV, &v)?;
            provider.retry = provider.retry.with_max_attempts(retries + 1);
        }
        provider.validate()?;

        let mut pipeline = PipelineSettings::default();
        if let Some(v) = get(MAX_RESULTS_ENV) {
            pipeline = pipeline.with_max_search_results(parse(MAX_RESULTS_ENV, &v)?);
        }
        if let Some(v) = get(FETCH_CONCURRENCY_ENV) {
            pipeline = pipeline.with_fetch_concurrency(parse(FETCH_CONCURRENCY_ENV, &v)?);
        }
        if let Some(v) = get(FETCH_POLICY_ENV) {
            pipeline = pipeline.with_fetch_policy(v.parse().map_err(|e: String| {
                ConfigError::invalid(FETCH_POLICY_ENV, e)
            })?);
        }

        Ok(Self { provider, pipeline })
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, format!("'{value}': {e}")))
}

/// Reads a JSON object of caller preferences from a file.
///
/// # Errors
///
/// Returns `ConfigError::Io` or `ConfigError::Parse` if the file cannot be
/// read or is not a JSON object.
pub fn load_preferences_file(
    path: impl AsRef<Path>,
) -> Result<serde_json::Map<String, serde_json::Value>, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;

    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_groq_config() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GROQ_API_KEY", "gsk-123"),
            ("GROQ_MODEL_NAME", "llama-3.3-70b-versatile"),
        ]))
        .unwrap();

        assert_eq!(config.provider.model, "llama-3.3-70b-versatile");
        assert_eq!(config.provider.base_url, GROQ_BASE_URL);
        assert_eq!(config.pipeline, PipelineSettings::default());
    }

    #[test]
    fn test_legacy_model_variable() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GROQ_API_KEY", "gsk-123"),
            ("GROG_MODEL_NAME", "mixtral-8x7b-32768"),
        ]))
        .unwrap();

        assert_eq!(config.provider.model, "mixtral-8x7b-32768");
    }

    #[test]
    fn test_openai_fallback() {
        let config = AppConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-123"),
            ("OPENAI_MODEL_NAME", "gpt-4-0125-preview"),
        ]))
        .unwrap();

        assert_eq!(config.provider.base_url, OPENAI_BASE_URL);
    }

    #[test]
    fn test_missing_credential_is_fatal() {
        let err = AppConfig::from_lookup(lookup(&[("GROQ_MODEL_NAME", "m")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { .. }));
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    fn test_missing_model_is_fatal() {
        let err = AppConfig::from_lookup(lookup(&[("GROQ_API_KEY", "k")])).unwrap_err();
        assert!(err.to_string().contains("GROQ_MODEL_NAME"));
    }

    #[test]
    fn test_optional_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GROQ_API_KEY", "k"),
            ("GROQ_MODEL_NAME", "m"),
            ("RECIPEFLOW_BASE_URL", "http://localhost:8080/v1"),
            ("RECIPEFLOW_MAX_TOKENS", "300"),
            ("RECIPEFLOW_TEMPERATURE", "0.2"),
            ("RECIPEFLOW_TIMEOUT_SECS", "5"),
            ("RECIPEFLOW_MAX_RETRIES", "0"),
            ("RECIPEFLOW_MAX_RESULTS", "3"),
            ("RECIPEFLOW_FETCH_CONCURRENCY", "4"),
            ("RECIPEFLOW_FETCH_POLICY", "fail_fast"),
        ]))
        .unwrap();

        assert_eq!(config.provider.base_url, "http://localhost:8080/v1");
        assert_eq!(config.provider.max_tokens, 300);
        assert_eq!(config.provider.timeout(), Duration::from_secs(5));
        assert_eq!(config.provider.retry.max_attempts, 1);
        assert_eq!(config.pipeline.max_search_results, 3);
        assert_eq!(config.pipeline.fetch_concurrency, 4);
        assert_eq!(config.pipeline.fetch_policy, FetchPolicy::FailFast);
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        for (key, value) in [
            ("RECIPEFLOW_TEMPERATURE", "1.5"),
            ("RECIPEFLOW_MAX_TOKENS", "0"),
            ("RECIPEFLOW_TIMEOUT_SECS", "-1"),
            ("RECIPEFLOW_TIMEOUT_SECS", "1e20"),
            ("RECIPEFLOW_TIMEOUT_SECS", "NaN"),
            ("RECIPEFLOW_MAX_TOKENS", "lots"),
            ("RECIPEFLOW_FETCH_POLICY", "sometimes"),
        ] {
            let result = AppConfig::from_lookup(lookup(&[
                ("GROQ_API_KEY", "k"),
                ("GROQ_MODEL_NAME", "m"),
                (key, value),
            ]));
            assert!(result.is_err(), "{key}={value} should be rejected");
        }
    }

    #[test]
    fn test_oversized_timeout_is_clamped() {
        let config = ProviderConfig::new("m", "k").with_timeout(1e20);
        assert!(config.validate().is_err());
        assert_eq!(config.timeout(), Duration::from_secs(3600));

        let config = ProviderConfig::new("m", "k").with_timeout(f64::NAN);
        assert_eq!(config.timeout(), Duration::ZERO);
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ProviderConfig::new("m", "super-secret");
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn test_load_preferences_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"dietary_restrictions": "vegetarian", "preferred_cuisine": "Italian"}}"#
        )
        .unwrap();

        let prefs = load_preferences_file(file.path()).unwrap();
        assert_eq!(prefs["preferred_cuisine"], "Italian");
    }

    #[test]
    fn test_load_preferences_file_errors() {
        assert!(matches!(
            load_preferences_file("/definitely/not/here.json"),
            Err(ConfigError::Io { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2, 3]").unwrap();
        assert!(matches!(
            load_preferences_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}

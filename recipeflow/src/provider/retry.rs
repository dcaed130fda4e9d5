//! Retry and timeout handling for provider calls.
//!
//! Retries happen here, at the adapter, and only for transient provider
//! errors. The pipeline itself never retries.

use super::{CapabilityProvider, GenerationRequest};
use crate::errors::ProviderError;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Jitter applied to the exponential backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
}

/// Configuration for retry behavior.
///
/// Delays grow as `base * 2^(attempt - 1)`, capped at `max_delay_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, including the initial one. `1` disables retries.
    pub max_attempts: usize,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that makes exactly one attempt.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Delay before the attempt after `failed_attempts` failures.
    fn delay_after(&self, failed_attempts: usize) -> Duration {
        let exponent = u32::try_from(failed_attempts.saturating_sub(1)).unwrap_or(u32::MAX);
        let delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_delay_ms);

        let jittered = match self.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full if delay == 0 => 0,
            JitterStrategy::Full => rand::thread_rng().gen_range(0..=delay),
        };
        Duration::from_millis(jittered)
    }
}

/// Executes an operation, retrying errors for which `is_retryable` holds.
async fn with_retry<T, E, F, Fut, P>(
    config: &RetryConfig,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt >= config.max_attempts || !is_retryable(&e) => return Err(e),
            Err(e) => {
                let delay = config.delay_after(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Retrying provider call"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Wraps a provider with a per-call timeout and transient-error retries.
///
/// A call that outlives the timeout is reported as `ProviderError::Timeout`,
/// the same shape as any other provider failure.
pub struct RetryingProvider {
    inner: Arc<dyn CapabilityProvider>,
    retry: RetryConfig,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for RetryingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingProvider")
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RetryingProvider {
    /// Wraps `inner` with the given retry policy and no timeout.
    #[must_use]
    pub fn new(inner: Arc<dyn CapabilityProvider>, retry: RetryConfig) -> Self {
        Self {
            inner,
            retry,
            timeout: None,
        }
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.generate(request))
                .await
                .map_err(|_| ProviderError::Timeout {
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })?,
            None => self.inner.generate(request).await,
        }
    }
}

#[async_trait]
impl CapabilityProvider for RetryingProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        with_retry(&self.retry, ProviderError::is_transient, || self.attempt(request)).await
    }
}

//! Deterministic capability provider for tests and benchmarks.

use crate::errors::ProviderError;
use crate::provider::{CapabilityProvider, GenerationRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone)]
enum DefaultResponse {
    Echo,
    Fixed(String),
}

/// A provider that answers from a script instead of a model.
///
/// Every call is recorded before any scripted failure is applied, so call
/// counts include failed calls. Call numbers start at 1.
#[derive(Debug)]
pub struct ScriptedProvider {
    default: DefaultResponse,
    rules: Vec<(String, String)>,
    fail_on_calls: HashSet<usize>,
    fail_patterns: Vec<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProvider {
    fn with_default(default: DefaultResponse) -> Self {
        Self {
            default,
            rules: Vec::new(),
            fail_on_calls: HashSet::new(),
            fail_patterns: Vec::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with its own prompt.
    #[must_use]
    pub fn echo() -> Self {
        Self::with_default(DefaultResponse::Echo)
    }

    /// Answers every call with `response`.
    #[must_use]
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::with_default(DefaultResponse::Fixed(response.into()))
    }

    /// Answers each of the four recipe stages with a plausible fixture.
    #[must_use]
    pub fn recipe_fixture() -> Self {
        Self::echo()
            .respond_when("Task: search recipes", super::fixtures::SEARCH_RESPONSE)
            .respond_when("Task: fetch recipe details", super::fixtures::DETAIL_RESPONSE)
            .respond_when("Task: create custom recipe", super::fixtures::CUSTOM_RESPONSE)
            .respond_when("Task: format recipe", super::fixtures::FORMAT_RESPONSE)
    }

    /// Answers prompts containing `pattern` with `response`.
    ///
    /// Rules are checked in the order they were added.
    #[must_use]
    pub fn respond_when(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((pattern.into(), response.into()));
        self
    }

    /// Fails the `n`th call with `ProviderError::Unavailable`.
    #[must_use]
    pub fn fail_on_call(mut self, n: usize) -> Self {
        self.fail_on_calls.insert(n);
        self
    }

    /// Fails every call whose prompt contains `pattern`.
    #[must_use]
    pub fn fail_when_prompt_contains(mut self, pattern: impl Into<String>) -> Self {
        self.fail_patterns.push(pattern.into());
        self
    }

    /// Sleeps before answering each call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns every prompt received, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|r| r.prompt.clone()).collect()
    }

    /// Returns every request received, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CapabilityProvider for ScriptedProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let call = {
            let mut calls = self.calls.lock();
            calls.push(request.clone());
            calls.len()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_on_calls.contains(&call) {
            return Err(ProviderError::Unavailable(format!("scripted failure on call {call}")));
        }
        if let Some(pattern) = self.fail_patterns.iter().find(|p| request.prompt.contains(p.as_str())) {
            return Err(ProviderError::Unavailable(format!(
                "scripted failure for prompt matching '{pattern}'"
            )));
        }

        let response = self
            .rules
            .iter()
            .find(|(pattern, _)| request.prompt.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| match &self.default {
                DefaultResponse::Echo => request.prompt.clone(),
                DefaultResponse::Fixed(text) => text.clone(),
            });

        Ok(response)
    }
}

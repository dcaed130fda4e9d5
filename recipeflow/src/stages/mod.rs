//! Stage trait and implementations.
//!
//! Stages are the units of work in a recipe pipeline. Each stage declares
//! the context keys it reads and the keys it writes; the pipeline enforces
//! both sides of that contract.

mod fetch_details;
mod format;
mod generate_custom;
pub mod prompts;
mod result;
mod search;

pub use fetch_details::{DetailRecord, FetchDetailsStage, FetchPolicy};
pub use format::{normalize_headings, FormatStage};
pub use generate_custom::GenerateCustomStage;
pub use result::{StageRecord, StageStatus};
pub use search::{parse_recipe_ids, SearchStage};

use crate::config::PipelineSettings;
use crate::context::{StageData, StageInputs};
use crate::errors::{RunError, StageFailure, CODE_INVALID_CONTRACT};
use crate::provider::{CapabilityProvider, GenerationParams};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

/// What a stage returns: its outputs, or the reason it failed.
pub type StageResult = Result<StageData, StageFailure>;

/// The declared interface of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageContract {
    /// Stage name, unique within a pipeline.
    pub name: String,
    /// Keys that must be in the run context before the stage runs.
    pub required_inputs: Vec<String>,
    /// Keys the stage writes on success.
    pub produced_outputs: Vec<String>,
}

impl StageContract {
    /// Creates a contract with no inputs or outputs.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required_inputs: Vec::new(),
            produced_outputs: Vec::new(),
        }
    }

    /// Adds required input keys.
    #[must_use]
    pub fn requires<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_inputs.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Adds produced output keys.
    #[must_use]
    pub fn produces<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produced_outputs.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Validates the contract on its own.
    ///
    /// # Errors
    ///
    /// Returns `RunError::ContractViolation` for an empty name, a key listed
    /// twice, or a key that is both read and written.
    pub fn validate(&self) -> Result<(), RunError> {
        let invalid = |key: Option<&String>, message: String| {
            RunError::contract_violation(&self.name, key.cloned(), message, CODE_INVALID_CONTRACT)
        };

        if self.name.trim().is_empty() {
            return Err(invalid(None, "stage name must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for key in &self.required_inputs {
            if !seen.insert(key) {
                return Err(invalid(Some(key), format!("input '{key}' is declared twice")));
            }
        }

        let mut outputs = HashSet::new();
        for key in &self.produced_outputs {
            if !outputs.insert(key) {
                return Err(invalid(Some(key), format!("output '{key}' is declared twice")));
            }
            if seen.contains(key) {
                return Err(invalid(
                    Some(key),
                    format!("'{key}' is declared as both input and output"),
                ));
            }
        }

        Ok(())
    }
}

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the stage contract.
    fn contract(&self) -> &StageContract;

    /// Returns the name of the stage.
    fn name(&self) -> &str {
        &self.contract().name
    }

    /// Executes the stage.
    ///
    /// `inputs` holds exactly the declared required keys. On success the
    /// returned data must hold exactly the declared outputs.
    async fn execute(&self, inputs: &StageInputs) -> StageResult;
}

/// A synchronous function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageInputs) -> StageResult + Send + Sync,
{
    contract: StageContract,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageInputs) -> StageResult + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(contract: StageContract, func: F) -> Self {
        Self { contract, func }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageInputs) -> StageResult + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.contract.name)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageInputs) -> StageResult + Send + Sync,
{
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, inputs: &StageInputs) -> StageResult {
        (self.func)(inputs)
    }
}

/// A stage that writes a placeholder string for every declared output.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    contract: StageContract,
}

impl NoOpStage {
    /// Creates a no-op stage from its contract.
    #[must_use]
    pub fn new(contract: StageContract) -> Self {
        Self { contract }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, _inputs: &StageInputs) -> StageResult {
        Ok(self
            .contract
            .produced_outputs
            .iter()
            .map(|key| (key.clone(), serde_json::json!(format!("{}:{key}", self.contract.name))))
            .collect())
    }
}

/// Builds the four recipe stages in execution order.
///
/// `params` is the default for the creative stages; search and detail calls
/// use their own smaller token limits at the same temperature.
#[must_use]
pub fn recipe_stages(
    provider: &Arc<dyn CapabilityProvider>,
    settings: &PipelineSettings,
    params: GenerationParams,
) -> Vec<Arc<dyn Stage>> {
    let search_stage: Arc<dyn Stage> = Arc::new(
        SearchStage::new(Arc::clone(provider))
            .with_max_results(settings.max_search_results)
            .with_params(params.with_max_tokens(search::SEARCH_MAX_TOKENS)),
    );
    let fetch_stage: Arc<dyn Stage> = Arc::new(
        FetchDetailsStage::new(Arc::clone(provider))
            .with_policy(settings.fetch_policy)
            .with_concurrency(settings.fetch_concurrency)
            .with_params(params.with_max_tokens(fetch_details::FETCH_MAX_TOKENS)),
    );
    let custom_stage: Arc<dyn Stage> =
        Arc::new(GenerateCustomStage::new(Arc::clone(provider)).with_params(params));
    let format_stage: Arc<dyn Stage> = Arc::new(FormatStage::new(Arc::clone(provider)).with_params(params));

    vec![search_stage, fetch_stage, custom_stage, format_stage]
}

//! Custom recipe generation stage.

use super::prompts::{self, RECIPE_CREATOR};
use super::{Stage, StageContract, StageResult};
use crate::context::{keys, StageData, StageInputs};
use crate::provider::{CapabilityProvider, GenerationParams, GenerationRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Asks the provider for an original recipe built from the caller's ingredients.
pub struct GenerateCustomStage {
    contract: StageContract,
    provider: Arc<dyn CapabilityProvider>,
    params: GenerationParams,
}

impl std::fmt::Debug for GenerateCustomStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerateCustomStage")
            .field("name", &self.contract.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl GenerateCustomStage {
    /// Stage name.
    pub const NAME: &'static str = "generate_custom_recipe";

    /// Creates the stage with default parameters.
    #[must_use]
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            contract: StageContract::new(Self::NAME)
                .requires([keys::PREFERENCES, keys::INGREDIENT_FILTERS])
                .produces([keys::CUSTOM_RECIPE]),
            provider,
            params: GenerationParams::default(),
        }
    }

    /// Sets the generation parameters.
    #[must_use]
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

#[async_trait]
impl Stage for GenerateCustomStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, inputs: &StageInputs) -> StageResult {
        let prompt = prompts::custom_prompt(
            inputs.get_object(keys::PREFERENCES)?,
            &inputs.get_string_list(keys::INGREDIENT_FILTERS)?,
        );

        let request = GenerationRequest::new(prompt, self.params).with_system(RECIPE_CREATOR);
        let recipe = self.provider.generate(&request).await?;
        debug!(chars = recipe.len(), "Generated custom recipe");

        let mut output = StageData::new();
        output.insert(keys::CUSTOM_RECIPE.to_string(), serde_json::json!(recipe));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageFailure;
    use crate::provider::MockCapabilityProvider;
    use serde_json::json;
    use std::collections::HashMap;

    fn inputs() -> StageInputs {
        StageInputs::new(
            GenerateCustomStage::NAME,
            HashMap::from([
                (
                    keys::PREFERENCES.to_string(),
                    json!({"preferred_cuisine": "Italian", "servings": 2}),
                ),
                (keys::INGREDIENT_FILTERS.to_string(), json!(["tomato", "basil"])),
            ]),
        )
    }

    #[tokio::test]
    async fn test_generates_with_creator_role() {
        let mut mock = MockCapabilityProvider::new();
        mock.expect_generate()
            .withf(|req| {
                req.prompt.contains("tomato, basil")
                    && req.prompt.contains("Servings: 2")
                    && req.system.as_deref() == Some(RECIPE_CREATOR)
                    && req.params.max_tokens == 300
            })
            .times(1)
            .returning(|_| Ok("Tomato basil bruschetta".to_string()));

        let stage = GenerateCustomStage::new(Arc::new(mock))
            .with_params(GenerationParams::default().with_max_tokens(300));

        let output = stage.execute(&inputs()).await.unwrap();
        assert_eq!(output[keys::CUSTOM_RECIPE], "Tomato basil bruschetta");
    }

    #[tokio::test]
    async fn test_preferences_must_be_a_mapping() {
        let stage = GenerateCustomStage::new(Arc::new(MockCapabilityProvider::new()));
        let inputs = StageInputs::new(
            GenerateCustomStage::NAME,
            HashMap::from([
                (keys::PREFERENCES.to_string(), json!("vegetarian")),
                (keys::INGREDIENT_FILTERS.to_string(), json!([])),
            ]),
        );

        assert!(matches!(
            stage.execute(&inputs).await,
            Err(StageFailure::InvalidInput { .. })
        ));
    }
}

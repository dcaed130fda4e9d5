//! Run coordination: preferences in, formatted recipe out.

use crate::config::PipelineSettings;
use crate::context::{keys, PreferenceSet, RunContext};
use crate::errors::{RunError, CODE_MISSING_OUTPUT};
use crate::events::EventSink;
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::provider::{CapabilityProvider, GenerationParams};
use crate::stages::{recipe_stages, StageRecord};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[cfg(feature = "http-provider")]
use crate::config::AppConfig;
#[cfg(feature = "http-provider")]
use crate::errors::ConfigError;

/// Name of the pipeline assembled by [`RecipeCoordinator::from_provider`].
pub const RECIPE_PIPELINE: &str = "recipe";

/// What a run looked like, for callers that want more than the text.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// One record per attempted stage.
    pub stages: Vec<StageRecord>,
    /// Keys in the final context, in insertion order. Empty on failure.
    pub context_keys: Vec<String>,
    /// The formatted recipe, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_recipe: Option<String>,
    /// The error that stopped the run.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "error_dict")]
    pub error: Option<RunError>,
}

fn error_dict<S: Serializer>(error: &Option<RunError>, serializer: S) -> Result<S::Ok, S::Error> {
    error.as_ref().map(RunError::to_dict).serialize(serializer)
}

impl RunReport {
    /// Whether the run produced a recipe.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        u64::try_from((self.finished_at - self.started_at).num_milliseconds()).unwrap_or(0)
    }

    /// Serializes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Validates preferences, seeds a context and runs the recipe pipeline.
#[derive(Debug)]
pub struct RecipeCoordinator {
    pipeline: Pipeline,
}

impl RecipeCoordinator {
    /// Wraps an already-built pipeline.
    ///
    /// The pipeline's last stage is expected to produce `formatted_recipe`.
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Assembles the four recipe stages over `provider`.
    ///
    /// # Errors
    ///
    /// Returns `RunError::ContractViolation` if the stages cannot be assembled.
    pub fn from_provider(
        provider: Arc<dyn CapabilityProvider>,
        settings: &PipelineSettings,
        params: GenerationParams,
        event_sink: Arc<dyn EventSink>,
    ) -> Result<Self, RunError> {
        let pipeline = PipelineBuilder::new(RECIPE_PIPELINE)
            .stages(recipe_stages(&provider, settings, params))?
            .with_event_sink(event_sink)
            .build()?;
        Ok(Self::new(pipeline))
    }

    /// Builds the HTTP provider, wraps it in retries and a per-call timeout,
    /// and assembles the recipe pipeline over it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the provider configuration is invalid.
    #[cfg(feature = "http-provider")]
    pub fn from_config(config: &AppConfig, event_sink: Arc<dyn EventSink>) -> Result<Self, ConfigError> {
        use crate::provider::{OpenAiCompatibleProvider, RetryingProvider};

        let http = OpenAiCompatibleProvider::new(config.provider.clone())?;
        let provider: Arc<dyn CapabilityProvider> = Arc::new(
            RetryingProvider::new(Arc::new(http), config.provider.retry.clone())
                .with_timeout(config.provider.timeout()),
        );

        Self::from_provider(
            provider,
            &config.pipeline,
            config.provider.generation_params(),
            event_sink,
        )
        .map_err(|e| ConfigError::invalid("pipeline", e.to_string()))
    }

    /// Returns the underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Runs the pipeline for a raw preference mapping.
    ///
    /// Preferences are validated before any provider call.
    ///
    /// # Errors
    ///
    /// Returns `RunError::InvalidPreferences` for a bad mapping, otherwise the
    /// error of the failing stage.
    pub async fn run(&self, preferences: &serde_json::Map<String, serde_json::Value>) -> Result<String, RunError> {
        let prefs = PreferenceSet::from_mapping(preferences)?;
        self.run_preferences(&prefs).await
    }

    /// Runs the pipeline for validated preferences.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing stage.
    pub async fn run_preferences(&self, preferences: &PreferenceSet) -> Result<String, RunError> {
        let report = self.execute(Uuid::new_v4(), preferences).await;
        match (report.formatted_recipe, report.error) {
            (_, Some(err)) => Err(err),
            (Some(text), None) => Ok(text),
            (None, None) => Err(self.missing_recipe()),
        }
    }

    /// Runs the pipeline and returns the full report instead of a `Result`.
    pub async fn run_report(&self, preferences: &serde_json::Map<String, serde_json::Value>) -> RunReport {
        match PreferenceSet::from_mapping(preferences) {
            Ok(prefs) => self.execute(Uuid::new_v4(), &prefs).await,
            Err(err) => {
                let now = Utc::now();
                warn!(error = %err, "Rejected preferences");
                RunReport {
                    run_id: Uuid::new_v4(),
                    pipeline: self.pipeline.name().to_string(),
                    started_at: now,
                    finished_at: now,
                    stages: Vec::new(),
                    context_keys: Vec::new(),
                    formatted_recipe: None,
                    error: Some(err),
                }
            }
        }
    }

    #[instrument(skip_all, fields(run_id = %run_id, pipeline = %self.pipeline.name()))]
    async fn execute(&self, run_id: Uuid, preferences: &PreferenceSet) -> RunReport {
        let started_at = Utc::now();
        info!(cuisine = preferences.preferred_cuisine(), "Run started");

        let execution = self.pipeline.execute(RunContext::from_seed(preferences.to_seed())).await;

        let (context_keys, formatted_recipe, error) = match execution.outcome {
            Ok(ctx) => match ctx.get_str(keys::FORMATTED_RECIPE) {
                Some(text) => (ctx.keys().to_vec(), Some(text.to_string()), None),
                None => (ctx.keys().to_vec(), None, Some(self.missing_recipe())),
            },
            Err(err) => (Vec::new(), None, Some(err)),
        };

        match &error {
            None => info!(duration_ms = execution.duration_ms, "Run completed"),
            Some(err) => warn!(stage = ?err.stage(), kind = %err.kind(), "Run failed"),
        }

        RunReport {
            run_id,
            pipeline: self.pipeline.name().to_string(),
            started_at,
            finished_at: Utc::now(),
            stages: execution.records,
            context_keys,
            formatted_recipe,
            error,
        }
    }

    fn missing_recipe(&self) -> RunError {
        let stage = self.pipeline.stage_names().last().copied().unwrap_or(self.pipeline.name());
        RunError::contract_violation(
            stage,
            Some(keys::FORMATTED_RECIPE.to_string()),
            format!("run finished without a string '{}'", keys::FORMATTED_RECIPE),
            CODE_MISSING_OUTPUT,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::events::{CollectingEventSink, NoOpEventSink};
    use crate::provider::MockCapabilityProvider;
    use crate::stages::{FormatStage, GenerateCustomStage, NoOpStage, StageContract, StageStatus};
    use crate::testing::{
        assert_failed_at, assert_in_order, sample_preference_set, sample_preferences, ScriptedProvider,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn coordinator(provider: Arc<ScriptedProvider>) -> RecipeCoordinator {
        RecipeCoordinator::from_provider(
            provider,
            &PipelineSettings::default(),
            GenerationParams::default(),
            Arc::new(NoOpEventSink),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_reference_scenario() {
        let provider = Arc::new(ScriptedProvider::recipe_fixture());
        let text = coordinator(provider.clone()).run(&sample_preferences()).await.unwrap();

        assert_in_order(&text, &["Name", "Ingredients", "Cooking Time", "Servings"]);
        assert_eq!(provider.call_count(), 6);
    }

    #[tokio::test]
    async fn test_missing_preference_makes_no_provider_call() {
        for key in [
            keys::DIETARY_RESTRICTIONS,
            keys::PREFERRED_CUISINE,
            keys::AVOID_INGREDIENTS,
            keys::INGREDIENT_FILTERS,
        ] {
            let provider = Arc::new(ScriptedProvider::recipe_fixture());
            let mut prefs = sample_preferences();
            prefs.remove(key);

            let err = coordinator(provider.clone()).run(&prefs).await.unwrap_err();

            assert!(
                matches!(err, RunError::InvalidPreferences { key: ref k, .. } if k == key),
                "removing '{key}' gave {err:?}"
            );
            assert_eq!(provider.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_malformed_preference_never_reaches_provider() {
        let mut mock = MockCapabilityProvider::new();
        mock.expect_generate().never();
        let coordinator = RecipeCoordinator::from_provider(
            Arc::new(mock),
            &PipelineSettings::default(),
            GenerationParams::default(),
            Arc::new(NoOpEventSink),
        )
        .unwrap();

        let mut prefs = sample_preferences();
        prefs.insert(keys::PREFERRED_CUISINE.to_string(), json!(42));

        let err = coordinator.run(&prefs).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPreferences);
    }

    #[tokio::test]
    async fn test_required_ingredients_alias() {
        let provider = Arc::new(ScriptedProvider::recipe_fixture());
        let mut prefs = sample_preferences();
        let include = prefs.remove(keys::INGREDIENT_FILTERS).unwrap();
        prefs.insert(keys::REQUIRED_INGREDIENTS.to_string(), include);

        assert!(coordinator(provider).run(&prefs).await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_names_the_stage() {
        let provider = Arc::new(ScriptedProvider::recipe_fixture().fail_on_call(5));
        let result = coordinator(provider.clone()).run_preferences(&sample_preference_set()).await;

        assert_failed_at(&result, GenerateCustomStage::NAME, ErrorKind::ProviderError);
        assert_eq!(provider.call_count(), 5);
    }

    #[tokio::test]
    async fn test_report_on_success() {
        let sink = Arc::new(CollectingEventSink::new());
        let coordinator = RecipeCoordinator::from_provider(
            Arc::new(ScriptedProvider::recipe_fixture()),
            &PipelineSettings::default(),
            GenerationParams::default(),
            sink.clone(),
        )
        .unwrap();

        let report = coordinator.run_report(&sample_preferences()).await;

        assert!(report.is_success());
        assert_eq!(report.pipeline, RECIPE_PIPELINE);
        assert_eq!(report.stages.len(), 4);
        assert!(report.stages.iter().all(|r| r.status == StageStatus::Completed));
        assert_eq!(report.context_keys.last().map(String::as_str), Some(keys::FORMATTED_RECIPE));
        assert!(report.formatted_recipe.as_deref().is_some_and(|text| text.contains("Name:")));
        assert!(report.finished_at >= report.started_at);
        assert_eq!(sink.event_types().last(), Some(&"pipeline.completed"));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["run_id"], json!(report.run_id.to_string()));
        assert!(json.get("error").is_none());
        assert_eq!(json["stages"][3]["name"], FormatStage::NAME);
    }

    #[tokio::test]
    async fn test_report_on_failure() {
        let provider = Arc::new(ScriptedProvider::recipe_fixture().fail_on_call(6));
        let report = coordinator(provider).run_report(&sample_preferences()).await;

        assert!(!report.is_success());
        assert!(report.formatted_recipe.is_none());
        assert!(report.context_keys.is_empty());
        assert_eq!(report.stages.len(), 4);
        assert_eq!(report.stages[3].status, StageStatus::Failed);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["error"]["stage"], FormatStage::NAME);
    }

    #[tokio::test]
    async fn test_report_on_rejected_preferences() {
        let provider = Arc::new(ScriptedProvider::recipe_fixture());
        let report = coordinator(provider.clone()).run_report(&serde_json::Map::new()).await;

        assert!(report.stages.is_empty());
        assert_eq!(report.error.as_ref().map(RunError::kind), Some(ErrorKind::InvalidPreferences));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_without_recipe_output() {
        let pipeline = PipelineBuilder::new("bare")
            .stage(Arc::new(NoOpStage::new(StageContract::new("noop").produces(["other"]))))
            .unwrap()
            .build()
            .unwrap();

        let err = RecipeCoordinator::new(pipeline)
            .run_preferences(&sample_preference_set())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some("noop"));
        assert_eq!(err.code(), Some(CODE_MISSING_OUTPUT));
    }
}

//! Recipe detail stage.

use super::prompts::{self, RECIPE_EXPERT};
use super::{Stage, StageContract, StageResult};
use crate::context::{keys, StageData, StageInputs};
use crate::errors::ProviderError;
use crate::provider::{CapabilityProvider, GenerationParams, GenerationRequest};
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Token limit for detail calls.
pub const FETCH_MAX_TOKENS: u32 = 150;

/// What to do when fetching one recipe fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPolicy {
    /// Record the failure in-band and keep going.
    #[default]
    DegradeAndContinue,
    /// Fail the stage with the first failure, in id order.
    FailFast,
}

impl std::fmt::Display for FetchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DegradeAndContinue => write!(f, "degrade_and_continue"),
            Self::FailFast => write!(f, "fail_fast"),
        }
    }
}

impl std::str::FromStr for FetchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "degrade_and_continue" | "degrade" => Ok(Self::DegradeAndContinue),
            "fail_fast" => Ok(Self::FailFast),
            other => Err(format!(
                "unknown fetch policy '{other}', expected 'degrade_and_continue' or 'fail_fast'"
            )),
        }
    }
}

/// One entry of `recipe_details`.
///
/// A failed fetch is kept as data so later stages still see every id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DetailRecord {
    /// The provider described the recipe.
    Ok {
        /// Recipe id.
        id: String,
        /// Provider text.
        detail: String,
    },
    /// The provider call failed.
    Error {
        /// Recipe id.
        id: String,
        /// Failure description.
        error: String,
    },
}

impl DetailRecord {
    /// Returns the recipe id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Ok { id, .. } | Self::Error { id, .. } => id,
        }
    }

    /// Returns the detail text of a successful fetch.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Ok { detail, .. } => Some(detail),
            Self::Error { .. } => None,
        }
    }
}

/// Fetches a description for each recipe id.
pub struct FetchDetailsStage {
    contract: StageContract,
    provider: Arc<dyn CapabilityProvider>,
    params: GenerationParams,
    policy: FetchPolicy,
    concurrency: usize,
}

impl std::fmt::Debug for FetchDetailsStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchDetailsStage")
            .field("name", &self.contract.name)
            .field("params", &self.params)
            .field("policy", &self.policy)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl FetchDetailsStage {
    /// Stage name.
    pub const NAME: &'static str = "fetch_recipe_details";

    /// Creates the stage: sequential, degrading on per-id failures.
    #[must_use]
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            contract: StageContract::new(Self::NAME)
                .requires([keys::RECIPE_IDS])
                .produces([keys::RECIPE_DETAILS]),
            provider,
            params: GenerationParams::default().with_max_tokens(FETCH_MAX_TOKENS),
            policy: FetchPolicy::default(),
            concurrency: 1,
        }
    }

    /// Sets the generation parameters.
    #[must_use]
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Sets the per-id failure policy.
    #[must_use]
    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets how many fetches may be in flight at once.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn fetch_one(&self, id: &str) -> Result<String, ProviderError> {
        let request =
            GenerationRequest::new(prompts::fetch_prompt(id), self.params).with_system(RECIPE_EXPERT);
        self.provider.generate(&request).await
    }
}

#[async_trait]
impl Stage for FetchDetailsStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, inputs: &StageInputs) -> StageResult {
        let ids = inputs.get_string_list(keys::RECIPE_IDS)?;
        debug!(count = ids.len(), concurrency = self.concurrency, "Fetching recipe details");

        // `buffered` yields in input order. Under FailFast the first failure
        // stops new ids from being pulled; fetches already started still finish.
        let stop = AtomicBool::new(false);
        let fail_fast = self.policy == FetchPolicy::FailFast;
        let mut results = pin!(stream::iter(ids)
            .take_while(|_| future::ready(!stop.load(Ordering::SeqCst)))
            .map(|id| async move {
                let result = self.fetch_one(&id).await;
                (id, result)
            })
            .buffered(self.concurrency));

        let mut records = Vec::new();
        let mut first_error = None;
        while let Some((id, result)) = results.next().await {
            match result {
                Ok(detail) => records.push(DetailRecord::Ok { id, detail }),
                Err(e) if fail_fast => {
                    stop.store(true, Ordering::SeqCst);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    warn!(recipe_id = %id, error = %e, "Fetching recipe details failed");
                    records.push(DetailRecord::Error {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }

        let failed = records.iter().filter(|r| r.detail().is_none()).count();
        info!(total = records.len(), failed, "Fetched recipe details");

        let mut output = StageData::new();
        output.insert(keys::RECIPE_DETAILS.to_string(), serde_json::json!(records));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageFailure;
    use crate::testing::ScriptedProvider;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    fn ids_input(ids: &[&str]) -> StageInputs {
        StageInputs::new(
            FetchDetailsStage::NAME,
            HashMap::from([(keys::RECIPE_IDS.to_string(), json!(ids))]),
        )
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("fail_fast".parse::<FetchPolicy>(), Ok(FetchPolicy::FailFast));
        assert_eq!("Fail-Fast".parse::<FetchPolicy>(), Ok(FetchPolicy::FailFast));
        assert_eq!("degrade".parse::<FetchPolicy>(), Ok(FetchPolicy::DegradeAndContinue));
        assert!("never".parse::<FetchPolicy>().is_err());
        assert_eq!(FetchPolicy::default().to_string(), "degrade_and_continue");
    }

    #[test]
    fn test_record_shape() {
        let ok = DetailRecord::Ok {
            id: "r1".to_string(),
            detail: "Caprese".to_string(),
        };
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"id": "r1", "status": "ok", "detail": "Caprese"}));

        let err = DetailRecord::Error {
            id: "r2".to_string(),
            error: "down".to_string(),
        };
        assert_eq!(serde_json::to_value(&err).unwrap(), json!({"id": "r2", "status": "error", "error": "down"}));
        assert_eq!(err.id(), "r2");
        assert_eq!(err.detail(), None);
    }

    #[tokio::test]
    async fn test_failure_on_one_id_is_recorded_in_band() {
        let provider = Arc::new(ScriptedProvider::echo().fail_when_prompt_contains("ID: r2."));
        let stage = FetchDetailsStage::new(provider.clone());

        let output = stage.execute(&ids_input(&["r1", "r2", "r3"])).await.unwrap();
        let records: Vec<DetailRecord> =
            serde_json::from_value(output[keys::RECIPE_DETAILS].clone()).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(
            records.iter().map(DetailRecord::id).collect::<Vec<_>>(),
            vec!["r1", "r2", "r3"]
        );
        assert!(records[0].detail().is_some());
        assert!(matches!(records[1], DetailRecord::Error { .. }));
        assert!(records[2].detail().is_some());
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fail_fast_policy() {
        let provider = Arc::new(ScriptedProvider::echo().fail_when_prompt_contains("ID: r2."));
        let stage = FetchDetailsStage::new(provider).with_policy(FetchPolicy::FailFast);

        let err = stage.execute(&ids_input(&["r1", "r2", "r3"])).await.unwrap_err();
        assert!(matches!(err, StageFailure::Provider(ProviderError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_fail_fast_stops_pulling_ids() {
        let provider = Arc::new(ScriptedProvider::echo().fail_when_prompt_contains("ID: r2."));
        let stage = FetchDetailsStage::new(provider.clone()).with_policy(FetchPolicy::FailFast);

        let result = stage.execute(&ids_input(&["r1", "r2", "r3", "r4", "r5"])).await;

        assert!(result.is_err());
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_fail_fast_lets_started_fetches_finish() {
        let provider = Arc::new(
            ScriptedProvider::echo()
                .fail_when_prompt_contains("ID: r1.")
                .with_delay(Duration::from_millis(5)),
        );
        let stage = FetchDetailsStage::new(provider.clone())
            .with_policy(FetchPolicy::FailFast)
            .with_concurrency(2);

        let result = stage.execute(&ids_input(&["r1", "r2", "r3", "r4"])).await;

        assert!(result.is_err());
        // r1 and r2 were in flight together; nothing after them started.
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_fetch_preserves_order() {
        let provider = Arc::new(ScriptedProvider::echo().with_delay(Duration::from_millis(5)));
        let stage = FetchDetailsStage::new(provider.clone()).with_concurrency(3);

        let output = stage
            .execute(&ids_input(&["r1", "r2", "r3", "r4"]))
            .await
            .unwrap();
        let records: Vec<DetailRecord> =
            serde_json::from_value(output[keys::RECIPE_DETAILS].clone()).unwrap();

        assert_eq!(
            records.iter().map(DetailRecord::id).collect::<Vec<_>>(),
            vec!["r1", "r2", "r3", "r4"]
        );
        for record in &records {
            assert!(record.detail().unwrap_or_default().contains(record.id()));
        }
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn test_empty_ids() {
        let stage = FetchDetailsStage::new(Arc::new(ScriptedProvider::echo()));

        let output = stage.execute(&ids_input(&[])).await.unwrap();
        assert_eq!(output[keys::RECIPE_DETAILS], json!([]));
    }

    #[tokio::test]
    async fn test_wrong_input_shape() {
        let stage = FetchDetailsStage::new(Arc::new(ScriptedProvider::echo()));
        let inputs = StageInputs::new(
            FetchDetailsStage::NAME,
            HashMap::from([(keys::RECIPE_IDS.to_string(), json!({"not": "a list"}))]),
        );

        assert!(matches!(
            stage.execute(&inputs).await,
            Err(StageFailure::InvalidInput { .. })
        ));
    }
}

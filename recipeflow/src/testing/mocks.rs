//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::context::{StageData, StageInputs};
use crate::errors::{ProviderError, StageFailure};
use crate::stages::{Stage, StageContract, StageResult};

/// A stage that records the inputs it was given and writes placeholder outputs.
#[derive(Debug)]
pub struct RecordingStage {
    contract: StageContract,
    executions: Mutex<Vec<BTreeMap<String, serde_json::Value>>>,
    order_log: Option<Arc<Mutex<Vec<String>>>>,
}

impl RecordingStage {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new(contract: StageContract) -> Self {
        Self {
            contract,
            executions: Mutex::new(Vec::new()),
            order_log: None,
        }
    }

    /// Appends the stage name to `log` on every execution.
    #[must_use]
    pub fn with_order_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.order_log = Some(log);
        self
    }

    /// Returns the inputs of every execution, keys sorted.
    #[must_use]
    pub fn executions(&self) -> Vec<BTreeMap<String, serde_json::Value>> {
        self.executions.lock().clone()
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.executions.lock().len()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, inputs: &StageInputs) -> StageResult {
        let mut seen = BTreeMap::new();
        for key in inputs.keys() {
            seen.insert(key.clone(), inputs.get(key)?.clone());
        }
        self.executions.lock().push(seen);
        if let Some(ref log) = self.order_log {
            log.lock().push(self.contract.name.clone());
        }

        Ok(self
            .contract
            .produced_outputs
            .iter()
            .map(|key| (key.clone(), serde_json::json!(format!("{}:{key}", self.contract.name))))
            .collect())
    }
}

/// A stage that always fails with a provider error.
#[derive(Debug)]
pub struct FailingStage {
    contract: StageContract,
    error: ProviderError,
    calls: AtomicUsize,
}

impl FailingStage {
    /// Creates a failing stage.
    #[must_use]
    pub fn new(contract: StageContract, error: ProviderError) -> Self {
        Self {
            contract,
            error,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, _inputs: &StageInputs) -> StageResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StageFailure::Provider(self.error.clone()))
    }
}

/// A stage that returns fixed data regardless of its contract.
///
/// Used to provoke output contract violations.
#[derive(Debug)]
pub struct FixedOutputStage {
    contract: StageContract,
    output: StageData,
}

impl FixedOutputStage {
    /// Creates a stage returning `output` on every execution.
    #[must_use]
    pub fn new(contract: StageContract, output: StageData) -> Self {
        Self { contract, output }
    }
}

#[async_trait]
impl Stage for FixedOutputStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, _inputs: &StageInputs) -> StageResult {
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_recording_stage() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stage = RecordingStage::new(StageContract::new("record").requires(["a"]).produces(["b"]))
            .with_order_log(log.clone());
        let inputs = StageInputs::new("record", HashMap::from([("a".to_string(), serde_json::json!(1))]));

        let output = stage.execute(&inputs).await.unwrap();
        stage.execute(&inputs).await.unwrap();

        assert_eq!(output["b"], "record:b");
        assert_eq!(stage.execution_count(), 2);
        assert_eq!(stage.executions()[0]["a"], 1);
        assert_eq!(*log.lock(), vec!["record", "record"]);
    }

    #[tokio::test]
    async fn test_failing_stage() {
        let stage = FailingStage::new(
            StageContract::new("fail"),
            ProviderError::Unavailable("down".to_string()),
        );

        let result = stage.execute(&StageInputs::new("fail", HashMap::new())).await;
        assert!(matches!(result, Err(StageFailure::Provider(_))));
        assert_eq!(stage.call_count(), 1);
    }
}

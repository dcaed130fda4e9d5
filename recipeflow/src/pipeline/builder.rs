//! Pipeline builder with assembly-time validation.

use super::Pipeline;
use crate::errors::{RunError, CODE_DUPLICATE_STAGE, CODE_EMPTY, CODE_OUTPUT_CONFLICT};
use crate::events::{EventSink, NoOpEventSink};
use crate::stages::Stage;
use std::collections::HashMap;
use std::sync::Arc;

/// Builder for creating validated pipelines.
///
/// Stages run in the order they are added. Every context key has exactly one
/// writer: a stage declaring an output another stage already declares is
/// rejected here, before anything runs.
pub struct PipelineBuilder {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    /// Output key to the stage that produces it.
    producers: HashMap<String, String>,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            producers: HashMap::new(),
            event_sink: None,
        }
    }

    /// Appends a stage.
    ///
    /// # Errors
    ///
    /// Returns `RunError::ContractViolation` if the stage contract is
    /// malformed, its name is taken, or it declares an output another stage
    /// already produces.
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Result<Self, RunError> {
        let contract = stage.contract();
        contract.validate()?;

        if self.stages.iter().any(|s| s.name() == contract.name) {
            return Err(RunError::contract_violation(
                &contract.name,
                None,
                format!("a stage named '{}' is already in pipeline '{}'", contract.name, self.name),
                CODE_DUPLICATE_STAGE,
            ));
        }

        for key in &contract.produced_outputs {
            if let Some(owner) = self.producers.get(key) {
                return Err(RunError::contract_violation(
                    &contract.name,
                    Some(key.clone()),
                    format!("output '{key}' is already produced by stage '{owner}'"),
                    CODE_OUTPUT_CONFLICT,
                ));
            }
        }

        for key in &contract.produced_outputs {
            self.producers.insert(key.clone(), contract.name.clone());
        }
        self.stages.push(stage);
        Ok(self)
    }

    /// Appends several stages in order.
    ///
    /// # Errors
    ///
    /// Returns the first error [`Self::stage`] reports.
    pub fn stages<I>(self, stages: I) -> Result<Self, RunError>
    where
        I: IntoIterator<Item = Arc<dyn Stage>>,
    {
        stages.into_iter().try_fold(self, Self::stage)
    }

    /// Sets the sink receiving lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `RunError::ContractViolation` if no stage was added.
    pub fn build(self) -> Result<Pipeline, RunError> {
        if self.stages.is_empty() {
            return Err(RunError::contract_violation(
                &self.name,
                None,
                "cannot build an empty pipeline",
                CODE_EMPTY,
            ));
        }

        let sink = self.event_sink.unwrap_or_else(|| Arc::new(NoOpEventSink));
        Ok(Pipeline::new(self.name, self.stages, sink))
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage names added so far.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, CODE_INVALID_CONTRACT};
    use crate::stages::{NoOpStage, StageContract};

    fn noop(name: &str, outputs: &[&str]) -> Arc<dyn Stage> {
        Arc::new(NoOpStage::new(StageContract::new(name).produces(outputs.iter().copied())))
    }

    #[test]
    fn test_builder_keeps_order() {
        let builder = PipelineBuilder::new("p")
            .stage(noop("a", &["x"]))
            .unwrap()
            .stage(noop("b", &["y"]))
            .unwrap();

        assert_eq!(builder.name(), "p");
        assert_eq!(builder.stage_names(), vec!["a", "b"]);

        let pipeline = builder.build().unwrap();
        assert_eq!(pipeline.stage_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_output_rejected_at_assembly() {
        let err = PipelineBuilder::new("p")
            .stage(noop("a", &["shared"]))
            .unwrap()
            .stage(noop("b", &["shared"]))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ContractViolation);
        assert_eq!(err.stage(), Some("b"));
        assert_eq!(err.code(), Some(CODE_OUTPUT_CONFLICT));
        assert!(err.to_string().contains("already produced by stage 'a'"));
    }

    #[test]
    fn test_duplicate_stage_name_rejected() {
        let err = PipelineBuilder::new("p")
            .stages([noop("a", &["x"]), noop("a", &["y"])])
            .unwrap_err();

        assert_eq!(err.code(), Some(CODE_DUPLICATE_STAGE));
    }

    #[test]
    fn test_malformed_contract_rejected() {
        let err = PipelineBuilder::new("p").stage(noop("a", &["x", "x"])).unwrap_err();
        assert_eq!(err.code(), Some(CODE_INVALID_CONTRACT));
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let err = PipelineBuilder::new("p").build().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ContractViolation);
        assert_eq!(err.code(), Some(CODE_EMPTY));
    }
}

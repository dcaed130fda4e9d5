//! Sequential pipeline execution.

use crate::context::RunContext;
use crate::errors::{
    RunError, CODE_MISSING_OUTPUT, CODE_OUTPUT_CONFLICT, CODE_UNDECLARED_OUTPUT,
};
use crate::events::{EventSink, PipelineEvent};
use crate::stages::{Stage, StageRecord};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// An ordered, validated list of stages.
///
/// Build one with [`super::PipelineBuilder`].
pub struct Pipeline {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

/// Everything a run produced: per-stage records plus the final context or error.
#[derive(Debug)]
pub struct PipelineExecution {
    /// One record per stage that was attempted, in order.
    pub records: Vec<StageRecord>,
    /// The final context, or the error that stopped the run.
    pub outcome: Result<RunContext, RunError>,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl Pipeline {
    pub(super) fn new(name: String, stages: Vec<Arc<dyn Stage>>, event_sink: Arc<dyn EventSink>) -> Self {
        Self {
            name,
            stages,
            event_sink,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs every stage against `ctx` and returns the final context.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage, unchanged. No later
    /// stage runs.
    pub async fn run(&self, ctx: RunContext) -> Result<RunContext, RunError> {
        self.execute(ctx).await.outcome
    }

    /// Runs every stage against `ctx`, keeping per-stage records.
    #[instrument(skip_all, fields(pipeline = %self.name))]
    pub async fn execute(&self, mut ctx: RunContext) -> PipelineExecution {
        let start = Instant::now();
        let mut records = Vec::with_capacity(self.stages.len());

        info!(stages = self.stages.len(), "Pipeline started");
        self.event_sink
            .emit(&PipelineEvent::PipelineStarted {
                pipeline: self.name.clone(),
                stages: self.stage_names().into_iter().map(String::from).collect(),
            })
            .await;

        for (index, stage) in self.stages.iter().enumerate() {
            let started_at = Utc::now();
            self.event_sink
                .emit(&PipelineEvent::StageStarted {
                    stage: stage.name().to_string(),
                    index,
                })
                .await;

            match self.run_stage(stage.as_ref(), &mut ctx).await {
                Ok(outputs) => {
                    let record = StageRecord::completed(stage.name(), started_at, outputs.clone());
                    info!(stage = stage.name(), duration_ms = record.duration_ms(), "Stage completed");
                    self.event_sink
                        .emit(&PipelineEvent::StageCompleted {
                            stage: stage.name().to_string(),
                            outputs,
                            duration_ms: record.duration_ms(),
                        })
                        .await;
                    records.push(record);
                }
                Err(err) => {
                    warn!(stage = stage.name(), kind = %err.kind(), error = %err, "Stage failed");
                    records.push(StageRecord::failed(stage.name(), started_at, err.to_string()));
                    self.event_sink
                        .emit(&PipelineEvent::StageFailed {
                            stage: stage.name().to_string(),
                            kind: err.kind().to_string(),
                            error: err.to_string(),
                        })
                        .await;

                    let duration_ms = elapsed_ms(start);
                    self.event_sink
                        .emit(&PipelineEvent::PipelineFailed {
                            pipeline: self.name.clone(),
                            stage: Some(stage.name().to_string()),
                            duration_ms,
                        })
                        .await;

                    return PipelineExecution {
                        records,
                        outcome: Err(err),
                        duration_ms,
                    };
                }
            }
        }

        let duration_ms = elapsed_ms(start);
        info!(duration_ms, keys = ctx.len(), "Pipeline completed");
        self.event_sink
            .emit(&PipelineEvent::PipelineCompleted {
                pipeline: self.name.clone(),
                duration_ms,
            })
            .await;

        PipelineExecution {
            records,
            outcome: Ok(ctx),
            duration_ms,
        }
    }

    /// Checks inputs, executes one stage, checks and merges its outputs.
    ///
    /// Returns the merged keys in declaration order.
    async fn run_stage(&self, stage: &dyn Stage, ctx: &mut RunContext) -> Result<Vec<String>, RunError> {
        let contract = stage.contract();
        let name = contract.name.as_str();

        let missing = ctx.missing_keys(&contract.required_inputs);
        if !missing.is_empty() {
            return Err(RunError::missing_dependency(name, missing));
        }

        let inputs = ctx.slice(name, &contract.required_inputs);
        let output = stage
            .execute(&inputs)
            .await
            .map_err(|failure| failure.into_run_error(name))?;

        let mut undeclared: Vec<&String> = output
            .keys()
            .filter(|k| !contract.produced_outputs.contains(k))
            .collect();
        undeclared.sort();
        if let Some(key) = undeclared.first() {
            return Err(RunError::contract_violation(
                name,
                Some((*key).clone()),
                format!("stage returned undeclared output '{key}'"),
                CODE_UNDECLARED_OUTPUT,
            ));
        }

        if let Some(key) = contract.produced_outputs.iter().find(|k| !output.contains_key(*k)) {
            return Err(RunError::contract_violation(
                name,
                Some(key.clone()),
                format!("stage did not return declared output '{key}'"),
                CODE_MISSING_OUTPUT,
            ));
        }

        ctx.merge(output, &contract.produced_outputs).map_err(|conflict| {
            RunError::contract_violation(
                name,
                Some(conflict.key.clone()),
                format!("output '{}' is already in the run context", conflict.key),
                CODE_OUTPUT_CONFLICT,
            )
        })?;

        Ok(contract.produced_outputs.clone())
    }
}

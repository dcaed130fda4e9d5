//! Pipeline lifecycle events.
//!
//! The executor reports progress through an [`EventSink`] injected at build
//! time. There is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::Serialize;

/// A lifecycle event emitted by the pipeline executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A run began.
    #[serde(rename = "pipeline.started")]
    PipelineStarted {
        /// Pipeline name.
        pipeline: String,
        /// Stage names in execution order.
        stages: Vec<String>,
    },
    /// A stage is about to execute.
    #[serde(rename = "stage.started")]
    StageStarted {
        /// Stage name.
        stage: String,
        /// Zero-based position in the pipeline.
        index: usize,
    },
    /// A stage finished and its outputs were merged.
    #[serde(rename = "stage.completed")]
    StageCompleted {
        /// Stage name.
        stage: String,
        /// Keys the stage produced.
        outputs: Vec<String>,
        /// Wall-clock duration.
        duration_ms: u64,
    },
    /// A stage failed; no later stage will run.
    #[serde(rename = "stage.failed")]
    StageFailed {
        /// Stage name.
        stage: String,
        /// Error classification.
        kind: String,
        /// Error message.
        error: String,
    },
    /// Every stage completed.
    #[serde(rename = "pipeline.completed")]
    PipelineCompleted {
        /// Pipeline name.
        pipeline: String,
        /// Wall-clock duration.
        duration_ms: u64,
    },
    /// The run stopped at a failing stage.
    #[serde(rename = "pipeline.failed")]
    PipelineFailed {
        /// Pipeline name.
        pipeline: String,
        /// The stage that failed, if the failure happened inside a stage.
        stage: Option<String>,
        /// Wall-clock duration.
        duration_ms: u64,
    },
}

impl PipelineEvent {
    /// Returns the dotted event type, e.g. `stage.started`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PipelineStarted { .. } => "pipeline.started",
            Self::StageStarted { .. } => "stage.started",
            Self::StageCompleted { .. } => "stage.completed",
            Self::StageFailed { .. } => "stage.failed",
            Self::PipelineCompleted { .. } => "pipeline.completed",
            Self::PipelineFailed { .. } => "pipeline.failed",
        }
    }

    /// Returns the stage this event is about, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageStarted { stage, .. }
            | Self::StageCompleted { stage, .. }
            | Self::StageFailed { stage, .. } => Some(stage),
            Self::PipelineFailed { stage, .. } => stage.as_deref(),
            Self::PipelineStarted { .. } | Self::PipelineCompleted { .. } => None,
        }
    }

    /// Serializes the event to a JSON payload.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_matches_serialized_tag() {
        let event = PipelineEvent::StageCompleted {
            stage: "search_recipes".to_string(),
            outputs: vec!["recipe_ids".to_string()],
            duration_ms: 12,
        };

        assert_eq!(event.event_type(), "stage.completed");
        assert_eq!(event.stage(), Some("search_recipes"));

        let payload = event.to_payload();
        assert_eq!(payload["type"], "stage.completed");
        assert_eq!(payload["outputs"][0], "recipe_ids");
    }

    #[test]
    fn test_pipeline_events_have_no_stage() {
        let event = PipelineEvent::PipelineStarted {
            pipeline: "recipe".to_string(),
            stages: vec![],
        };
        assert_eq!(event.stage(), None);

        let failed = PipelineEvent::PipelineFailed {
            pipeline: "recipe".to_string(),
            stage: Some("format_recipe".to_string()),
            duration_ms: 0,
        };
        assert_eq!(failed.stage(), Some("format_recipe"));
    }
}

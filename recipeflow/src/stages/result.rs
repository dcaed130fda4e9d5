//! Per-stage execution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final status of one stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Stage completed and its outputs were merged.
    Completed,
    /// Stage failed, or its outputs were rejected.
    Failed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Timing and outcome of one stage execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Stage status.
    pub status: StageStatus,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
    /// Keys merged into the run context.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Error message if failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageRecord {
    /// Creates a completed record ending now.
    #[must_use]
    pub fn completed(name: impl Into<String>, started_at: DateTime<Utc>, outputs: Vec<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Completed,
            started_at,
            ended_at: Utc::now(),
            outputs,
            error: None,
        }
    }

    /// Creates a failed record ending now.
    #[must_use]
    pub fn failed(name: impl Into<String>, started_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Failed,
            started_at,
            ended_at: Utc::now(),
            outputs: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        u64::try_from((self.ended_at - self.started_at).num_milliseconds()).unwrap_or(0)
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Completed
    }
}

//! Context management for pipeline execution.
//!
//! This module provides:
//! - The run context accumulated across stages
//! - Stage inputs restricted to a stage's declared keys
//! - The caller's preference set and the keys it seeds

mod inputs;
pub mod keys;
mod preferences;
mod run_context;

pub use inputs::StageInputs;
pub use preferences::PreferenceSet;
pub use run_context::RunContext;

/// Data flowing into and out of a stage: string keys to JSON values.
pub type StageData = std::collections::HashMap<String, serde_json::Value>;

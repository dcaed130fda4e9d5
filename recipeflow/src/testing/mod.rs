//! Testing utilities for recipe pipelines.
//!
//! This module provides:
//! - A scripted capability provider
//! - Mock stages
//! - Canned responses and preferences
//! - Assertions for run results

mod assertions;
mod fixtures;
mod mocks;
mod provider;

pub use assertions::{assert_failed_at, assert_in_order};
pub use fixtures::{
    sample_preference_set, sample_preferences, CUSTOM_RESPONSE, DETAIL_RESPONSE, FORMAT_RESPONSE,
    SEARCH_RESPONSE,
};
pub use mocks::{FailingStage, FixedOutputStage, RecordingStage};
pub use provider::ScriptedProvider;

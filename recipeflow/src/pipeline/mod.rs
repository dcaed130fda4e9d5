//! Pipeline building and execution.
//!
//! This module provides:
//! - A builder that validates stage contracts at assembly time
//! - A sequential executor that checks inputs and outputs around every stage

mod builder;
mod executor;

pub use builder::PipelineBuilder;
pub use executor::{Pipeline, PipelineExecution};

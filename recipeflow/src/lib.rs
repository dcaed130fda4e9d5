//! # Recipeflow
//!
//! A sequential recipe pipeline over a hosted text-generation API.
//!
//! Recipeflow runs four stages in a fixed order, each delegating its
//! "intelligent" step to a [`provider::CapabilityProvider`]:
//!
//! - **Search**: find recipe ids matching the caller's preferences
//! - **Fetch details**: describe each recipe, degrading in-band on failure
//! - **Generate custom**: create a new recipe from the preferences
//! - **Format**: merge everything into a recipe with fixed section headings
//!
//! Every stage declares the context keys it reads and writes. The pipeline
//! checks both sides of that contract around every stage and halts on the
//! first failure.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use recipeflow::prelude::*;
//!
//! let config = AppConfig::from_env()?;
//! let coordinator = RecipeCoordinator::from_config(&config, Arc::new(LoggingEventSink::default()))?;
//!
//! let recipe = coordinator.run(&preferences).await?;
//! println!("{recipe}");
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod coordinator;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod provider;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{AppConfig, PipelineSettings, ProviderConfig};
    pub use crate::context::{keys, PreferenceSet, RunContext, StageData, StageInputs};
    pub use crate::coordinator::{RecipeCoordinator, RunReport};
    pub use crate::errors::{
        ConfigError, ContractErrorInfo, ErrorKind, ProviderError, RunError, StageFailure,
    };
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent,
    };
    pub use crate::pipeline::{Pipeline, PipelineBuilder, PipelineExecution};
    pub use crate::provider::{
        CapabilityProvider, GenerationParams, GenerationRequest, RetryConfig, RetryingProvider,
    };
    pub use crate::stages::{
        FetchPolicy, Stage, StageContract, StageRecord, StageResult, StageStatus,
    };

    #[cfg(feature = "http-provider")]
    pub use crate::provider::OpenAiCompatibleProvider;
}

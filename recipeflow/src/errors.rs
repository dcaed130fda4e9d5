//! Error types for recipeflow.
//!
//! The taxonomy has one error per failure class of a run:
//!
//! - [`RunError::InvalidPreferences`]: caller input rejected before any provider call
//! - [`RunError::MissingDependency`]: a stage required a key nobody produced
//! - [`RunError::ContractViolation`]: a stage contract was broken (output collision,
//!   undeclared or missing outputs, input type mismatch)
//! - [`RunError::Provider`]: the capability provider failed or timed out
//!
//! In-band per-item failures (see `FetchDetailsStage`) are data, not errors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Error code for a stage input that was never produced.
pub const CODE_MISSING_DEP: &str = "CONTRACT-MISSING_DEP";
/// Error code for two writers of the same context key.
pub const CODE_OUTPUT_CONFLICT: &str = "CONTRACT-OUTPUT_CONFLICT";
/// Error code for a stage returning a key it did not declare.
pub const CODE_UNDECLARED_OUTPUT: &str = "CONTRACT-UNDECLARED_OUTPUT";
/// Error code for a stage omitting a key it declared.
pub const CODE_MISSING_OUTPUT: &str = "CONTRACT-MISSING_OUTPUT";
/// Error code for a stage reading a key outside its declared inputs.
pub const CODE_UNDECLARED_INPUT: &str = "CONTRACT-UNDECLARED_INPUT";
/// Error code for an input of the wrong shape.
pub const CODE_INVALID_INPUT: &str = "CONTRACT-INVALID_INPUT";
/// Error code for building a pipeline without stages.
pub const CODE_EMPTY: &str = "CONTRACT-EMPTY";
/// Error code for two stages sharing a name.
pub const CODE_DUPLICATE_STAGE: &str = "CONTRACT-DUPLICATE_STAGE";
/// Error code for a malformed stage contract.
pub const CODE_INVALID_CONTRACT: &str = "CONTRACT-INVALID";

/// Coarse classification of a [`RunError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad or missing caller input.
    InvalidPreferences,
    /// A required stage input was never produced.
    MissingDependency,
    /// A stage contract was broken.
    ContractViolation,
    /// The capability provider failed.
    ProviderError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPreferences => write!(f, "InvalidPreferences"),
            Self::MissingDependency => write!(f, "MissingDependency"),
            Self::ContractViolation => write!(f, "ContractViolation"),
            Self::ProviderError => write!(f, "ProviderError"),
        }
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-OUTPUT_CONFLICT").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !self.context.is_empty() {
            map.insert("context".to_string(), serde_json::json!(self.context));
        }
        map
    }
}

/// Provides default fix hints for contract error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            CODE_MISSING_DEP => Some(
                "Add a stage that produces the key earlier in the pipeline, \
                 or seed it into the run context before running.",
            ),
            CODE_OUTPUT_CONFLICT => Some(
                "Each context key has exactly one writer. Rename one of the outputs.",
            ),
            CODE_UNDECLARED_OUTPUT => Some(
                "Declare the key in the stage's produced outputs or stop returning it.",
            ),
            CODE_MISSING_OUTPUT => Some(
                "Return every declared output on success, or fail the stage.",
            ),
            CODE_UNDECLARED_INPUT => Some(
                "Declare the key in the stage's required inputs before reading it.",
            ),
            CODE_EMPTY => Some("Add at least one stage to the pipeline before building."),
            CODE_DUPLICATE_STAGE => Some("Give every stage in a pipeline a unique name."),
            _ => None,
        }
    }
}

/// Error returned by a capability provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The call did not finish within the configured timeout.
    #[error("provider call timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The provider answered with a non-success HTTP status.
    #[error("provider returned HTTP {status}: {message}")]
    Http {
        /// The HTTP status code.
        status: u16,
        /// The error message from the provider, if any.
        message: String,
    },

    /// The request never reached the provider or the connection broke.
    #[error("provider transport error: {0}")]
    Transport(String),

    /// The provider answered with something that could not be decoded.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The provider answered with no usable text.
    #[error("empty provider response: {0}")]
    EmptyResponse(String),

    /// The provider is temporarily unable to serve the request.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Returns true if repeating the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport(_) | Self::Unavailable(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) | Self::EmptyResponse(_) => false,
        }
    }

    /// Returns a short machine-readable name for the variant.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Http { .. } => "http",
            Self::Transport(_) => "transport",
            Self::InvalidResponse(_) => "invalid_response",
            Self::EmptyResponse(_) => "empty_response",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

/// Raised when a stage reads a key outside its declared inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stage '{stage}' attempted to read '{key}' which is not a declared input")]
pub struct UndeclaredInputError {
    /// The stage attempting access.
    pub stage: String,
    /// The undeclared key.
    pub key: String,
}

impl UndeclaredInputError {
    /// Creates a new undeclared input error.
    #[must_use]
    pub fn new(stage: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            key: key.into(),
        }
    }
}

/// Raised when writing to a key that already exists in the run context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Data conflict: key '{key}' already exists")]
pub struct DataConflictError {
    /// The conflicting key.
    pub key: String,
}

impl DataConflictError {
    /// Creates a new data conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Failure returned by a stage's `execute`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageFailure {
    /// A provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The stage read a key it did not declare.
    #[error(transparent)]
    UndeclaredInput(#[from] UndeclaredInputError),

    /// A declared input had the wrong shape.
    #[error("input '{key}' is invalid: {reason}")]
    InvalidInput {
        /// The offending key.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl StageFailure {
    /// Creates an invalid input failure.
    #[must_use]
    pub fn invalid_input(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Lifts the failure into a run error attributed to `stage`.
    #[must_use]
    pub fn into_run_error(self, stage: &str) -> RunError {
        match self {
            Self::Provider(source) => RunError::Provider {
                stage: stage.to_string(),
                source,
            },
            Self::UndeclaredInput(err) => RunError::contract_violation(
                stage,
                Some(err.key.clone()),
                err.to_string(),
                CODE_UNDECLARED_INPUT,
            ),
            Self::InvalidInput { key, reason } => RunError::contract_violation(
                stage,
                Some(key.clone()),
                format!("input '{key}' is invalid: {reason}"),
                CODE_INVALID_INPUT,
            ),
        }
    }
}

/// The single error value a run surfaces to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    /// Caller preferences were missing a key or had a malformed value.
    #[error("invalid preferences: '{key}' {reason}")]
    InvalidPreferences {
        /// The offending preference key.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A stage required keys that were not in the run context.
    #[error("stage '{stage}' is missing required input(s): {}", keys.join(", "))]
    MissingDependency {
        /// The stage that could not run.
        stage: String,
        /// Every absent key.
        keys: Vec<String>,
        /// Diagnostic info.
        info: ContractErrorInfo,
    },

    /// A stage contract was broken.
    #[error("contract violation in stage '{stage}': {message}")]
    ContractViolation {
        /// The stage whose contract was broken.
        stage: String,
        /// The key involved, if any.
        key: Option<String>,
        /// Human-readable description.
        message: String,
        /// Diagnostic info.
        info: ContractErrorInfo,
    },

    /// The capability provider failed during a stage.
    #[error("stage '{stage}' failed: {source}")]
    Provider {
        /// The stage that failed.
        stage: String,
        /// The provider error.
        #[source]
        source: ProviderError,
    },
}

impl RunError {
    /// Creates an invalid preferences error.
    #[must_use]
    pub fn invalid_preferences(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPreferences {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing dependency error.
    #[must_use]
    pub fn missing_dependency(stage: impl Into<String>, keys: Vec<String>) -> Self {
        let stage = stage.into();
        let info = ContractErrorInfo::new(
            CODE_MISSING_DEP,
            format!("Stage '{stage}' requires keys that were never produced"),
        )
        .with_fix_hint(ContractSuggestions::get(CODE_MISSING_DEP).unwrap_or_default())
        .with_context_entry("missing", keys.join(","));

        Self::MissingDependency { stage, keys, info }
    }

    /// Creates a contract violation error with the given diagnostic code.
    #[must_use]
    pub fn contract_violation(
        stage: impl Into<String>,
        key: Option<String>,
        message: impl Into<String>,
        code: &str,
    ) -> Self {
        let stage = stage.into();
        let message = message.into();
        let mut info = ContractErrorInfo::new(code, message.clone());
        if let Some(hint) = ContractSuggestions::get(code) {
            info = info.with_fix_hint(hint);
        }
        if let Some(ref key) = key {
            info = info.with_context_entry("key", key.clone());
        }

        Self::ContractViolation {
            stage,
            key,
            message,
            info,
        }
    }

    /// Returns the error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPreferences { .. } => ErrorKind::InvalidPreferences,
            Self::MissingDependency { .. } => ErrorKind::MissingDependency,
            Self::ContractViolation { .. } => ErrorKind::ContractViolation,
            Self::Provider { .. } => ErrorKind::ProviderError,
        }
    }

    /// Returns the failing stage, if the error happened inside the pipeline.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::InvalidPreferences { .. } => None,
            Self::MissingDependency { stage, .. }
            | Self::ContractViolation { stage, .. }
            | Self::Provider { stage, .. } => Some(stage),
        }
    }

    /// Returns the diagnostic code for contract errors.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::MissingDependency { info, .. } | Self::ContractViolation { info, .. } => {
                Some(&info.code)
            }
            _ => None,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind().to_string()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Some(stage) = self.stage() {
            map.insert("stage".to_string(), serde_json::json!(stage));
        }

        match self {
            Self::InvalidPreferences { key, .. } => {
                map.insert("key".to_string(), serde_json::json!(key));
            }
            Self::MissingDependency { keys, info, .. } => {
                map.insert("keys".to_string(), serde_json::json!(keys));
                map.insert("error_info".to_string(), serde_json::json!(info.to_dict()));
            }
            Self::ContractViolation { key, info, .. } => {
                if let Some(key) = key {
                    map.insert("key".to_string(), serde_json::json!(key));
                }
                map.insert("error_info".to_string(), serde_json::json!(info.to_dict()));
            }
            Self::Provider { source, .. } => {
                map.insert("provider_error".to_string(), serde_json::json!(source.kind_name()));
                map.insert("transient".to_string(), serde_json::json!(source.is_transient()));
            }
        }

        map
    }
}

/// Startup configuration errors. These are fatal, never runtime failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// None of the accepted environment variables was set.
    #[error("missing required environment variable: {}", candidates.join(" or "))]
    MissingVar {
        /// The variables that were checked.
        candidates: Vec<String>,
    },

    /// A configuration value was out of range or unparsable.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// The configuration key.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file path.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file could not be parsed.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// The file path.
        path: String,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

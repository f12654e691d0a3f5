// Error types for building a stage pipeline

use thiserror::Error;

/// Result type for orchestrator construction
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Errors raised while assembling a pipeline.
///
/// Failures of the stages themselves are never wrapped in this type; they are
/// returned to the caller as-is.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    /// Two stages share a name
    #[error("Duplicate stage name '{0}'")]
    DuplicateStage(String),

    /// A stage has an empty name
    #[error("Stage names must not be empty")]
    EmptyStageName,
}

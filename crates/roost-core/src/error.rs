//! Pipeline error type.

use crate::config::ConfigError;
use roost_models::ModelError;
use roost_orchestrator::OrchestrationError;
use roost_training::TrainingError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Errors raised by pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Adaptation, training, or evaluation failed.
    #[error(transparent)]
    Training(#[from] TrainingError),

    /// The raw data archive could not be unpacked.
    #[error("data ingestion failed: {0}")]
    Ingestion(String),

    /// No stage with this name is registered.
    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    /// The stage list could not be assembled.
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    /// IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ModelError> for PipelineError {
    fn from(err: ModelError) -> Self {
        Self::Training(err.into())
    }
}

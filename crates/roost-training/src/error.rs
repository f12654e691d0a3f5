use roost_models::ModelError;
use std::path::PathBuf;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("model provider error: {0}")]
    Provider(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The artifact is missing, or present but unreadable (`reason` set).
    #[error(
        "model artifact not found: {}{}",
        path.display(),
        reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default()
    )]
    ArtifactNotFound { path: PathBuf, reason: Option<String> },

    #[error("dataset is empty: {0}")]
    EmptyDataset(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("evaluation produced non-finite results (loss {loss}, accuracy {accuracy})")]
    NonFinite { loss: f64, accuracy: f64 },

    #[error("image error in {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("model error: {0}")]
    Model(#[source] ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<ModelError> for TrainingError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Provider { .. } => Self::Provider(err.to_string()),
            ModelError::ArtifactNotFound(path) => Self::ArtifactNotFound { path, reason: None },
            ModelError::MalformedArtifact { path, reason } => Self::ArtifactNotFound { path, reason: Some(reason) },
            ModelError::InvalidConfig(reason) => Self::InvalidArgument(reason),
            ModelError::Io(e) => Self::Io(e),
            other => Self::Model(other),
        }
    }
}

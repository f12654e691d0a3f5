//! Error types for networks, providers and model artifacts.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Errors raised by the network, provider and checkpoint layers.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The model provider cannot satisfy the requested configuration.
    #[error("provider '{provider}' cannot satisfy request: {reason}")]
    Provider {
        /// Provider name (e.g. "mobilenet-lite").
        provider: String,
        /// Why the request was rejected.
        reason: String,
    },

    /// A model configuration field is out of range.
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    /// A tensor or layer shape did not line up.
    #[error("shape error: {0}")]
    Shape(String),

    /// Loss/metric evaluation was requested on a network that has no compile spec.
    #[error("network '{0}' is not compiled")]
    NotCompiled(String),

    /// The label encoding of a batch does not match the compiled loss.
    #[error("label mismatch: {0}")]
    LabelMismatch(String),

    /// No artifact exists at the given path.
    #[error("model artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    /// The artifact exists but could not be decoded.
    #[error("malformed model artifact {}: {reason}", path.display())]
    MalformedArtifact {
        /// Artifact path.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// The path does not name a `.json` artifact.
    #[error("unsupported model artifact format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// The recorder could not write the artifact.
    #[error("cannot record model artifact {}: {reason}", path.display())]
    Record {
        /// Artifact path.
        path: PathBuf,
        /// Recorder message.
        reason: String,
    },

    /// IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<ndarray::ShapeError> for ModelError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Shape(err.to_string())
    }
}

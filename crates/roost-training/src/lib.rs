//! Roost Training
//!
//! Model adaptation and scoring for the image-classifier pipeline:
//! - Acquiring a pretrained base model and adapting it (`ModelAdapter`)
//! - Freezing policies (`FreezePolicy`)
//! - Validation/training streams over labelled image directories (`DataStream`)
//! - Head-only training backend (`Trainer`, `HeadTrainer`)
//! - Evaluation and score records (`Evaluator`, `ScoreRecord`)
//! - Artifact layout, digests and manifests

pub mod adapter;
pub mod artifacts;
pub mod dataset;
pub mod error;
pub mod evaluator;
pub mod job;
pub mod layout;
pub mod policy;
pub mod progress;
pub mod score;
pub mod trainer;

pub use adapter::{AdaptedModel, AdapterState, BaseModel, HEAD_DENSE, HEAD_FLATTEN, ModelAdapter};
pub use artifacts::{ArtifactKind, TrainingArtifact, TrainingManifest, TrainingMetrics, sha256_file};
pub use dataset::{
    Batch, DataStream, DataStreamConfig, Interpolation, Subset, build_training_stream, build_validation_stream,
    list_classes,
};
pub use error::{TrainingError, TrainingResult};
pub use evaluator::Evaluator;
pub use job::{TrainingJob, TrainingJobId, TrainingParams};
pub use layout::ArtifactLayout;
pub use policy::FreezePolicy;
pub use progress::{ProgressEvent, ProgressSink, RecordingProgressSink, TracingProgressSink};
pub use score::ScoreRecord;
pub use trainer::{HeadTrainer, Trainer};

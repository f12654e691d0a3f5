//! Roost Core
//!
//! Configuration, data ingestion and the four-stage image-classifier
//! pipeline built on `roost-training` and `roost-orchestrator`.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod pipeline;

pub use config::{
    ConfigError, DEFAULT_CONFIG_FILE, DataIngestionConfig, EvaluationConfig, Params, PipelineConfig,
    PrepareBaseModelConfig, TrainingConfig,
};
pub use error::{PipelineError, PipelineResult};
pub use ingestion::{IngestionSummary, ingest};
pub use pipeline::{
    StageKind, build_pipeline, run_data_ingestion, run_evaluation, run_pipeline, run_prepare_base_model,
    run_single_stage, run_training,
};

//! The four pipeline stages and their wiring into an orchestrator.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ingestion::ingest;
use roost_models::ProviderFactory;
use roost_orchestrator::{RunReport, StageObserver, StageOrchestrator, StageReport};
use roost_training::{
    Evaluator, HeadTrainer, ModelAdapter, ScoreRecord, Trainer, TracingProgressSink, TrainingJob,
    build_validation_stream,
};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    DataIngestion,
    PrepareBaseModel,
    Training,
    Evaluation,
}

impl StageKind {
    /// Every stage, in execution order.
    pub const ALL: [Self; 4] = [Self::DataIngestion, Self::PrepareBaseModel, Self::Training, Self::Evaluation];

    /// Name used in stage markers.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DataIngestion => "Data Ingestion Stage",
            Self::PrepareBaseModel => "Prepare Base Model Stage",
            Self::Training => "Training Stage",
            Self::Evaluation => "Evaluation Stage",
        }
    }

    /// Command-line identifier.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::DataIngestion => "data-ingestion",
            Self::PrepareBaseModel => "prepare-base-model",
            Self::Training => "training",
            Self::Evaluation => "evaluation",
        }
    }

    /// Runs this stage on its own.
    pub fn run(self, config: &PipelineConfig) -> PipelineResult<()> {
        match self {
            Self::DataIngestion => run_data_ingestion(config),
            Self::PrepareBaseModel => run_prepare_base_model(config),
            Self::Training => run_training(config),
            Self::Evaluation => run_evaluation(config).map(|_| ()),
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.id().eq_ignore_ascii_case(s) || k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let ids: Vec<&str> = Self::ALL.iter().map(|k| k.id()).collect();
                format!("unknown stage '{s}' (expected one of: {})", ids.join(", "))
            })
    }
}

/// Unpacks and checks the training data.
pub fn run_data_ingestion(config: &PipelineConfig) -> PipelineResult<()> {
    ingest(&config.ingestion_config()).map(|_| ())
}

/// Acquires the base model, adapts it and persists both.
pub fn run_prepare_base_model(config: &PipelineConfig) -> PipelineResult<()> {
    let c = config.prepare_base_model_config();
    let provider = ProviderFactory::create_from_str(&c.provider)?;
    let class_count = c.model.class_count;
    let learning_rate = c.model.learning_rate;

    let mut adapter = ModelAdapter::new(provider, c.model, c.base_model_path).with_head_seed(c.seed);
    let base = adapter.acquire_base_model()?;
    let adapted = adapter.adapt(base, c.freeze_policy, class_count, learning_rate)?;
    adapter.persist(&adapted, &c.updated_base_model_path)?;
    Ok(())
}

/// Trains the classification head of the adapted model.
pub fn run_training(config: &PipelineConfig) -> PipelineResult<()> {
    let c = config.training_config();
    let job = TrainingJob::new(c.adapted_model_path, c.trained_model_path, c.manifest_path, c.data_dir, c.params);
    let manifest = HeadTrainer.train(&job, &TracingProgressSink)?;
    info!(
        job_id = %manifest.job_id,
        train_loss = manifest.metrics.train_loss,
        train_accuracy = manifest.metrics.train_accuracy,
        "Training manifest written"
    );
    Ok(())
}

/// Scores the trained model on the validation split and persists the score.
pub fn run_evaluation(config: &PipelineConfig) -> PipelineResult<ScoreRecord> {
    let c = config.evaluation_config();
    let evaluator = Evaluator::new(c.learning_rate);
    let mut model = evaluator.load_model(&c.model_path)?;
    let stream = build_validation_stream(&c.data_dir, c.input_shape, c.batch_size)?;
    let score = evaluator.evaluate(&mut model, &stream)?;
    evaluator.persist_score(&score, &c.score_path)?;
    Ok(score)
}

/// Builds the four-stage orchestrator over `config`.
pub fn build_pipeline(
    config: &PipelineConfig,
    observer: Arc<dyn StageObserver>,
) -> PipelineResult<StageOrchestrator<'_, PipelineError>> {
    let mut orchestrator = StageOrchestrator::with_observer(observer);
    for kind in StageKind::ALL {
        orchestrator.add_fn(kind.name(), move || kind.run(config))?;
    }
    Ok(orchestrator)
}

/// Runs all stages, stopping at the first failure.
pub fn run_pipeline(config: &PipelineConfig, observer: Arc<dyn StageObserver>) -> PipelineResult<RunReport> {
    build_pipeline(config, observer)?.run()
}

/// Runs a single stage through the orchestrator, so it gets the same markers.
pub fn run_single_stage(
    config: &PipelineConfig,
    kind: StageKind,
    observer: Arc<dyn StageObserver>,
) -> PipelineResult<StageReport> {
    let mut orchestrator = build_pipeline(config, observer)?;
    orchestrator
        .run_stage(kind.name())
        .unwrap_or_else(|| Err(PipelineError::UnknownStage(kind.name().to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_parsing() {
        assert_eq!("training".parse::<StageKind>().unwrap(), StageKind::Training);
        assert_eq!("Prepare Base Model Stage".parse::<StageKind>().unwrap(), StageKind::PrepareBaseModel);
        assert!("deploy".parse::<StageKind>().is_err());
    }

    #[test]
    fn test_stage_order() {
        let names: Vec<&str> = StageKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(
            names,
            vec!["Data Ingestion Stage", "Prepare Base Model Stage", "Training Stage", "Evaluation Stage"]
        );
    }
}

//! Scores a trained model on the held-out validation subset.

use crate::artifacts::{ArtifactKind, TrainingArtifact, make_artifact};
use crate::dataset::DataStream;
use crate::error::{TrainingError, TrainingResult};
use crate::score::ScoreRecord;
use roost_models::{CompileSpec, LoadOptions, Metric, Network, WeightedMean, load_model};
use std::path::Path;
use tracing::{debug, info};

/// Learning rate used when recompiling a loaded model for evaluation.
/// Evaluation never updates weights, so the value has no effect on scores.
pub const DEFAULT_EVAL_LEARNING_RATE: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct Evaluator {
    learning_rate: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(DEFAULT_EVAL_LEARNING_RATE)
    }
}

impl Evaluator {
    #[must_use]
    pub const fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }

    /// Loads a persisted model without its compile spec.
    pub fn load_model(&self, path: &Path) -> TrainingResult<Network> {
        let network = load_model(path, LoadOptions::weights_only())?;
        info!(path = %path.display(), layers = network.layer_count(), "Loaded model for evaluation");
        Ok(network)
    }

    /// Recompiles `model` for the stream's label mode and computes
    /// sample-weighted loss and accuracy over every batch, in order.
    pub fn evaluate(&self, model: &mut Network, stream: &DataStream) -> TrainingResult<ScoreRecord> {
        if stream.is_empty() {
            return Err(TrainingError::EmptyDataset(
                "validation stream has no samples".to_string(),
            ));
        }
        model.compile(CompileSpec::for_label_mode(stream.label_mode(), self.learning_rate));

        let mut loss = WeightedMean::default();
        let mut accuracy = WeightedMean::default();
        for (index, batch) in stream.iter().enumerate() {
            let batch = batch?;
            let result = model.evaluate_batch(&batch.images, &batch.labels)?;
            loss.update(result.loss, result.samples);
            for (metric, value) in &result.metrics {
                if *metric == Metric::Accuracy {
                    accuracy.update(*value, result.samples);
                }
            }
            debug!(batch = index, samples = result.samples, loss = result.loss, "Evaluated batch");
        }

        let (Some(loss), Some(accuracy)) = (loss.result(), accuracy.result()) else {
            return Err(TrainingError::EmptyDataset("validation stream yielded no batches".to_string()));
        };
        if !loss.is_finite() || !accuracy.is_finite() {
            return Err(TrainingError::NonFinite { loss, accuracy });
        }

        info!(loss, accuracy, samples = stream.len(), "Evaluation complete");
        Ok(ScoreRecord { loss, accuracy })
    }

    /// Writes the score record, replacing any previous one.
    pub fn persist_score(&self, score: &ScoreRecord, path: &Path) -> TrainingResult<TrainingArtifact> {
        score.save(path)?;
        let artifact = make_artifact(ArtifactKind::Score, path.to_path_buf())?;
        info!(path = %path.display(), sha256 = %artifact.sha256, "Score saved");
        Ok(artifact)
    }
}

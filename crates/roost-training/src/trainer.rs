//! Training backends.

use crate::artifacts::{ArtifactKind, TrainingManifest, TrainingMetrics, make_artifact};
use crate::dataset::{DataStream, DataStreamConfig, Subset};
use crate::error::{TrainingError, TrainingResult};
use crate::job::TrainingJob;
use crate::progress::{ProgressEvent, ProgressSink};
use burn::optim::{GradientsParams, Optimizer};
use chrono::Utc;
use roost_models::{
    Activation, CompileSpec, LayerKind, LoadOptions, Metric, Network, TrainBackend, WeightedMean, Weights,
    load_model, predicted_classes, save_model, scalar, write_atomic,
};
use tracing::{debug, info, warn};

pub trait Trainer: Send + Sync {
    fn id(&self) -> &'static str;

    /// Trains the model named by `job` and writes the trained artifact and manifest.
    fn train(&self, job: &TrainingJob, progress: &dyn ProgressSink) -> TrainingResult<TrainingManifest>;
}

/// Trains only the final softmax dense layer; everything before it is a
/// fixed feature extractor.
#[derive(Debug, Default)]
pub struct HeadTrainer;

impl HeadTrainer {
    pub const ID: &'static str = "head";

    fn head_index(network: &Network<TrainBackend>) -> TrainingResult<usize> {
        let index = network.layer_count().checked_sub(1).ok_or_else(|| {
            TrainingError::InvalidState("model has no layers".to_string())
        })?;
        let head = &network.layers()[index];
        match head.kind {
            LayerKind::Dense { activation: Activation::Softmax, .. } if head.trainable => Ok(index),
            _ => Err(TrainingError::InvalidState(format!(
                "last layer '{}' is not a trainable softmax dense layer",
                head.name
            ))),
        }
    }

    fn stream(job: &TrainingJob, spec: &CompileSpec) -> TrainingResult<DataStream> {
        let shape = job.params.input_shape;
        let config = DataStreamConfig {
            target_size: shape.spatial(),
            channels: shape.channels,
            batch_size: job.params.batch_size,
            shuffle: true,
            seed: job.params.seed,
            label_mode: spec.loss.label_mode(),
            subset: Subset::Training,
            ..DataStreamConfig::default()
        };
        DataStream::open(&job.data_dir, config)
    }

    /// One pass over the stream with one Adam step per batch. Returns the
    /// updated network and the sample-weighted loss and accuracy.
    fn run_epoch<O>(
        mut network: Network<TrainBackend>,
        optimizer: &mut O,
        spec: &CompileSpec,
        stream: &DataStream,
        epoch: u32,
    ) -> TrainingResult<(Network<TrainBackend>, f64, f64, u64)>
    where
        O: Optimizer<Weights<TrainBackend>, TrainBackend>,
    {
        let mut loss = WeightedMean::default();
        let mut accuracy = WeightedMean::default();
        let mut steps = 0;

        for batch in stream.iter_epoch(u64::from(epoch)) {
            let batch = batch?;
            let samples = batch.len();

            let logits = network.forward_logits(&batch.images)?;
            let batch_loss = spec.loss.compute(logits.clone(), &batch.labels)?;
            loss.update(scalar(batch_loss.clone()), samples);
            if spec.metrics.contains(&Metric::Accuracy) {
                let predicted = predicted_classes(logits)?;
                accuracy.update(Metric::Accuracy.compute(&predicted, &batch.labels)?, samples);
            }

            let grads = GradientsParams::from_grads(batch_loss.backward(), network.weights());
            network = network.map_weights(|weights| optimizer.step(spec.optimizer.learning_rate, weights, grads));
            steps += 1;
        }

        Ok((network, loss.result().unwrap_or(0.0), accuracy.result().unwrap_or(0.0), steps))
    }
}

impl Trainer for HeadTrainer {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn train(&self, job: &TrainingJob, progress: &dyn ProgressSink) -> TrainingResult<TrainingManifest> {
        job.validate()?;

        let mut network: Network<TrainBackend> = load_model(&job.adapted_model_path, LoadOptions::with_compile())?;
        let spec = network
            .compile_spec()
            .cloned()
            .ok_or_else(|| TrainingError::InvalidState("adapted model has no compile spec".to_string()))?;
        let head = Self::head_index(&network)?;
        if network.input_shape() != job.params.input_shape {
            return Err(TrainingError::InvalidState(format!(
                "model expects input {}, job is configured for {}",
                network.input_shape(),
                job.params.input_shape
            )));
        }

        let frozen_trainable = network.layers()[..head]
            .iter()
            .filter(|l| l.trainable && l.param_count() > 0)
            .count();
        if frozen_trainable > 0 {
            warn!(layers = frozen_trainable, "Only the head is updated; other trainable layers are kept fixed");
        }

        let stream = Self::stream(job, &spec)?;
        if stream.is_empty() {
            return Err(TrainingError::EmptyDataset(format!(
                "no training images in {}",
                job.data_dir.display()
            )));
        }
        let classes = network.output_shape()?.iter().product::<usize>();
        if stream.class_names().len() > classes {
            return Err(TrainingError::Dataset(format!(
                "{} class directories for a {classes}-class head",
                stream.class_names().len()
            )));
        }

        progress.on_event(ProgressEvent::Started {
            job_id: job.job_id.clone(),
            samples: stream.len(),
            epochs: job.params.epochs,
        });

        network = network.stop_gradients(|index, _| index != head);
        let mut optimizer = spec.optimizer.config().init::<TrainBackend, Weights<TrainBackend>>();

        let mut metrics = TrainingMetrics { samples: stream.len(), ..TrainingMetrics::default() };
        for epoch in 0..job.params.epochs {
            let (trained, loss, accuracy, steps) = Self::run_epoch(network, &mut optimizer, &spec, &stream, epoch)?;
            network = trained;
            debug!(epoch, steps, "Epoch finished");
            metrics.train_loss = Some(loss);
            metrics.train_accuracy = Some(accuracy);
            metrics.epochs = epoch + 1;
            metrics.steps += steps;
            progress.on_event(ProgressEvent::Epoch {
                job_id: job.job_id.clone(),
                epoch: epoch + 1,
                total: job.params.epochs,
                loss,
                accuracy,
            });
        }

        save_model(&network, &job.trained_model_path)?;
        let manifest = TrainingManifest {
            job_id: job.job_id.clone(),
            created_at: Utc::now(),
            adapted_model: job.adapted_model_path.clone(),
            data_dir: job.data_dir.clone(),
            params: job.params.clone(),
            metrics,
            artifacts: vec![
                make_artifact(ArtifactKind::AdaptedModel, job.adapted_model_path.clone())?,
                make_artifact(ArtifactKind::TrainedModel, job.trained_model_path.clone())?,
            ],
        };
        write_atomic(&job.manifest_path, &serde_json::to_vec_pretty(&manifest)?)?;

        progress.on_event(ProgressEvent::Finished { job_id: job.job_id.clone() });
        info!(
            path = %job.trained_model_path.display(),
            manifest = %job.manifest_path.display(),
            "Trained model saved"
        );
        Ok(manifest)
    }
}

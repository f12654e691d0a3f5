//! Metrics tracked by compiled models.

use crate::error::{ModelError, ModelResult};
use crate::loss::Labels;
use burn::prelude::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// A metric evaluated alongside the loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Fraction of samples whose argmax prediction equals the label.
    Accuracy,
}

impl Metric {
    /// Metric name as reported in logs and records.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
        }
    }

    /// Batch value of the metric, given the predicted class per sample.
    pub fn compute(self, predicted: &[usize], labels: &Labels) -> ModelResult<f64> {
        if predicted.len() != labels.len() {
            return Err(ModelError::Shape(format!(
                "{} predictions for {} labels",
                predicted.len(),
                labels.len()
            )));
        }
        if predicted.is_empty() {
            return Ok(0.0);
        }
        match self {
            Self::Accuracy => {
                let correct = predicted
                    .iter()
                    .zip(labels.class_indices())
                    .filter(|(p, l)| **p == *l)
                    .count();
                Ok(correct as f64 / predicted.len() as f64)
            }
        }
    }
}

/// Argmax class of each `[batch, classes]` row, read back to the host.
pub fn predicted_classes<B: Backend>(scores: Tensor<B, 2>) -> ModelResult<Vec<usize>> {
    let [rows, _] = scores.dims();
    let classes = scores
        .argmax(1)
        .reshape([rows])
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| ModelError::Shape(format!("cannot read predictions: {e:?}")))?;
    Ok(classes.into_iter().map(|c| c as usize).collect())
}

/// Sample-weighted running mean.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedMean {
    total: f64,
    weight: usize,
}

impl WeightedMean {
    /// Adds a batch value that stands for `weight` samples.
    pub fn update(&mut self, value: f64, weight: usize) {
        self.total += value * weight as f64;
        self.weight += weight;
    }

    /// Samples seen so far.
    #[must_use]
    pub const fn weight(&self) -> usize {
        self.weight
    }

    /// Mean over all samples, or `None` before the first update.
    #[must_use]
    pub fn result(&self) -> Option<f64> {
        (self.weight > 0).then(|| self.total / self.weight as f64)
    }
}

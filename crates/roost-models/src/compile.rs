//! Optimizer, loss and metric selection for a network.

use crate::loss::{LabelMode, Loss};
use crate::metrics::Metric;
use crate::optim::Adam;
use serde::{Deserialize, Serialize};

/// Everything `Network::compile` attaches to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileSpec {
    /// Optimizer hyperparameters.
    pub optimizer: Adam,
    /// Training/evaluation loss.
    pub loss: Loss,
    /// Metrics reported next to the loss.
    pub metrics: Vec<Metric>,
}

impl CompileSpec {
    /// Adam at `learning_rate`, sparse categorical cross-entropy, accuracy.
    #[must_use]
    pub fn sparse_classification(learning_rate: f64) -> Self {
        Self::for_label_mode(LabelMode::Sparse, learning_rate)
    }

    /// Adam at `learning_rate` with the cross-entropy variant matching `mode`, accuracy.
    #[must_use]
    pub fn for_label_mode(mode: LabelMode, learning_rate: f64) -> Self {
        Self {
            optimizer: Adam::new(learning_rate),
            loss: Loss::for_label_mode(mode),
            metrics: vec![Metric::Accuracy],
        }
    }
}

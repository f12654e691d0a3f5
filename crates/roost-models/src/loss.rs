//! Classification losses.
//!
//! Both variants take logits (the head's pre-softmax output) and return the
//! batch mean as a one-element tensor, so training can call `backward` on it.

use crate::error::{ModelError, ModelResult};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::Backend;
use burn::tensor::activation::log_softmax;
use burn::tensor::{Int, Tensor, TensorData};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// How a data stream encodes labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LabelMode {
    /// One integer class index per sample.
    #[default]
    Sparse,
    /// One one-hot row per sample.
    Categorical,
}

/// A batch of labels.
#[derive(Debug, Clone, PartialEq)]
pub enum Labels {
    /// Integer class indices.
    Sparse(Array1<usize>),
    /// One-hot rows, `[batch, classes]`.
    OneHot(Array2<f32>),
}

impl Labels {
    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Sparse(labels) => labels.len(),
            Self::OneHot(labels) => labels.nrows(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encoding of this batch.
    #[must_use]
    pub const fn mode(&self) -> LabelMode {
        match self {
            Self::Sparse(_) => LabelMode::Sparse,
            Self::OneHot(_) => LabelMode::Categorical,
        }
    }

    /// Class index per sample (argmax for one-hot rows).
    #[must_use]
    pub fn class_indices(&self) -> Vec<usize> {
        match self {
            Self::Sparse(labels) => labels.to_vec(),
            Self::OneHot(labels) => labels
                .rows()
                .into_iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                        .0
                })
                .collect(),
        }
    }

    /// Builds one-hot targets, failing if a label is out of range.
    pub fn to_one_hot(&self, classes: usize) -> ModelResult<Array2<f32>> {
        match self {
            Self::OneHot(labels) => {
                if labels.ncols() != classes {
                    return Err(ModelError::LabelMismatch(format!(
                        "one-hot labels have {} columns for {classes} classes",
                        labels.ncols()
                    )));
                }
                Ok(labels.clone())
            }
            Self::Sparse(labels) => {
                let mut out = Array2::<f32>::zeros((labels.len(), classes));
                for (row, &label) in labels.iter().enumerate() {
                    if label >= classes {
                        return Err(ModelError::LabelMismatch(format!(
                            "label {label} out of range for {classes} classes"
                        )));
                    }
                    out[[row, label]] = 1.0;
                }
                Ok(out)
            }
        }
    }
}

/// Loss function selected when a model is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    /// Cross-entropy against integer labels.
    SparseCategoricalCrossentropy,
    /// Cross-entropy against one-hot labels.
    CategoricalCrossentropy,
}

impl Loss {
    /// The loss matching a stream's label encoding.
    #[must_use]
    pub const fn for_label_mode(mode: LabelMode) -> Self {
        match mode {
            LabelMode::Sparse => Self::SparseCategoricalCrossentropy,
            LabelMode::Categorical => Self::CategoricalCrossentropy,
        }
    }

    /// Label encoding this loss expects.
    #[must_use]
    pub const fn label_mode(self) -> LabelMode {
        match self {
            Self::SparseCategoricalCrossentropy => LabelMode::Sparse,
            Self::CategoricalCrossentropy => LabelMode::Categorical,
        }
    }

    /// Mean loss over the batch, from `[batch, classes]` logits.
    pub fn compute<B: Backend>(self, logits: Tensor<B, 2>, labels: &Labels) -> ModelResult<Tensor<B, 1>> {
        if labels.mode() != self.label_mode() {
            return Err(ModelError::LabelMismatch(format!(
                "{self:?} expects {:?} labels, got {:?}",
                self.label_mode(),
                labels.mode()
            )));
        }
        let [rows, classes] = logits.dims();
        if rows != labels.len() {
            return Err(ModelError::Shape(format!("{rows} predictions for {} labels", labels.len())));
        }
        let device = logits.device();
        if rows == 0 {
            return Ok(Tensor::zeros([1], &device));
        }

        match labels {
            Labels::Sparse(indices) => {
                if let Some(&label) = indices.iter().find(|&&l| l >= classes) {
                    return Err(ModelError::LabelMismatch(format!(
                        "label {label} out of range for {classes} classes"
                    )));
                }
                let targets = indices.iter().map(|&l| l as i64).collect::<Vec<_>>();
                let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [rows]), &device);
                Ok(CrossEntropyLossConfig::new().init(&device).forward(logits, targets))
            }
            Labels::OneHot(_) => {
                let targets = labels.to_one_hot(classes)?;
                let targets = Tensor::<B, 2>::from_data(
                    TensorData::new(targets.iter().copied().collect::<Vec<_>>(), [rows, classes]),
                    &device,
                );
                Ok(log_softmax(logits, 1).mul(targets).sum_dim(1).mean().neg())
            }
        }
    }
}

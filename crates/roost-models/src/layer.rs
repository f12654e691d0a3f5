//! Layers of a sequential image network.
//!
//! A [`Layer`] describes what one step computes and whether it may be
//! trained. The weights themselves live in [`crate::network::Weights`].

use crate::config::InputShape;
use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};

/// Output activation of a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Identity.
    #[default]
    Linear,
    /// Row-wise softmax.
    Softmax,
}

/// What a layer computes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerKind {
    /// Declares the expected input shape; identity at runtime.
    Input {
        /// Expected per-sample shape.
        shape: InputShape,
    },
    /// Square 2-D convolution. Output size is `ceil(input / stride)`.
    Conv2d {
        in_channels: usize,
        filters: usize,
        kernel: usize,
        stride: usize,
    },
    /// `min(max(x, 0), 6)`.
    Relu6,
    /// Max pooling with valid padding.
    MaxPool2d { pool: usize, stride: usize },
    /// Mean over height and width.
    GlobalAveragePool,
    /// Collapses all non-batch axes.
    Flatten,
    /// Fully connected layer.
    Dense {
        inputs: usize,
        units: usize,
        activation: Activation,
    },
}

/// A named layer with its trainable flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Layer name, unique within a network.
    pub name: String,
    /// Whether optimizers may update this layer's weights.
    pub trainable: bool,
    /// Computation.
    pub kind: LayerKind,
}

impl Layer {
    fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self { name: name.into(), trainable: true, kind }
    }

    #[must_use]
    pub fn input(name: impl Into<String>, shape: InputShape) -> Self {
        Self::new(name, LayerKind::Input { shape })
    }

    /// 3x3 convolution.
    #[must_use]
    pub fn conv2d(name: impl Into<String>, in_channels: usize, filters: usize, stride: usize) -> Self {
        Self::new(name, LayerKind::Conv2d { in_channels, filters, kernel: 3, stride })
    }

    #[must_use]
    pub fn relu6(name: impl Into<String>) -> Self {
        Self::new(name, LayerKind::Relu6)
    }

    #[must_use]
    pub fn max_pool2d(name: impl Into<String>, pool: usize, stride: usize) -> Self {
        Self::new(name, LayerKind::MaxPool2d { pool, stride })
    }

    #[must_use]
    pub fn global_average_pool(name: impl Into<String>) -> Self {
        Self::new(name, LayerKind::GlobalAveragePool)
    }

    #[must_use]
    pub fn flatten(name: impl Into<String>) -> Self {
        Self::new(name, LayerKind::Flatten)
    }

    #[must_use]
    pub fn dense(name: impl Into<String>, inputs: usize, units: usize, activation: Activation) -> Self {
        Self::new(name, LayerKind::Dense { inputs, units, activation })
    }

    /// Short name of the layer kind.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self.kind {
            LayerKind::Input { .. } => "input",
            LayerKind::Conv2d { .. } => "conv2d",
            LayerKind::Relu6 => "relu6",
            LayerKind::MaxPool2d { .. } => "max_pool2d",
            LayerKind::GlobalAveragePool => "global_average_pool",
            LayerKind::Flatten => "flatten",
            LayerKind::Dense { .. } => "dense",
        }
    }

    /// Whether the layer owns weights.
    #[must_use]
    pub const fn has_weights(&self) -> bool {
        matches!(self.kind, LayerKind::Conv2d { .. } | LayerKind::Dense { .. })
    }

    /// Number of scalar weights.
    #[must_use]
    pub const fn param_count(&self) -> usize {
        match self.kind {
            LayerKind::Conv2d { in_channels, filters, kernel, .. } => {
                kernel * kernel * in_channels * filters + filters
            }
            LayerKind::Dense { inputs, units, .. } => inputs * units + units,
            _ => 0,
        }
    }

    /// Infers the per-sample output shape (`[h, w, c]` or `[features]`).
    pub fn output_shape(&self, input: &[usize]) -> ModelResult<Vec<usize>> {
        match &self.kind {
            LayerKind::Input { shape } => {
                if input != shape.dims().as_slice() {
                    return Err(ModelError::Shape(format!(
                        "layer '{}' expects input {shape}, got {input:?}",
                        self.name
                    )));
                }
                Ok(input.to_vec())
            }
            LayerKind::Conv2d { in_channels, filters, kernel, stride } => {
                let [h, w, c] = spatial(&self.name, input)?;
                if c != *in_channels {
                    return Err(ModelError::Shape(format!(
                        "layer '{}' expects {in_channels} channels, got {c}",
                        self.name
                    )));
                }
                if *kernel % 2 == 0 || *stride == 0 {
                    return Err(ModelError::Shape(format!(
                        "layer '{}' needs an odd kernel and a non-zero stride",
                        self.name
                    )));
                }
                Ok(vec![h.div_ceil(*stride), w.div_ceil(*stride), *filters])
            }
            LayerKind::Relu6 => Ok(input.to_vec()),
            LayerKind::MaxPool2d { pool, stride } => {
                let [h, w, c] = spatial(&self.name, input)?;
                if h < *pool || w < *pool || *stride == 0 {
                    return Err(ModelError::Shape(format!(
                        "layer '{}' cannot pool {h}x{w} with window {pool}",
                        self.name
                    )));
                }
                Ok(vec![(h - pool) / stride + 1, (w - pool) / stride + 1, c])
            }
            LayerKind::GlobalAveragePool => {
                let [_, _, c] = spatial(&self.name, input)?;
                Ok(vec![c])
            }
            LayerKind::Flatten => Ok(vec![input.iter().product()]),
            LayerKind::Dense { inputs, units, .. } => {
                let features: usize = input.iter().product();
                if input.len() != 1 || features != *inputs {
                    return Err(ModelError::Shape(format!(
                        "layer '{}' expects [{inputs}] features, got {input:?}",
                        self.name
                    )));
                }
                Ok(vec![*units])
            }
        }
    }
}

fn spatial(name: &str, input: &[usize]) -> ModelResult<[usize; 3]> {
    match input {
        &[h, w, c] => Ok([h, w, c]),
        other => Err(ModelError::Shape(format!(
            "layer '{name}' expects a [h, w, c] input, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_shapes_chain() {
        let conv = Layer::conv2d("conv", 3, 8, 2);
        let pool = Layer::max_pool2d("pool", 2, 2);
        let flat = Layer::flatten("flat");

        let s = conv.output_shape(&[224, 224, 3]).unwrap();
        assert_eq!(s, vec![112, 112, 8]);
        let s = pool.output_shape(&s).unwrap();
        assert_eq!(s, vec![56, 56, 8]);
        assert_eq!(flat.output_shape(&s).unwrap(), vec![56 * 56 * 8]);

        assert_eq!(conv.output_shape(&[33, 33, 3]).unwrap(), vec![17, 17, 8]);
        assert!(conv.output_shape(&[32, 32, 1]).is_err());
    }

    #[test]
    fn test_dense_rejects_wrong_feature_count() {
        let dense = Layer::dense("d", 10, 2, Activation::Softmax);
        assert!(dense.output_shape(&[9]).is_err());
        assert!(dense.output_shape(&[2, 5]).is_err());
        assert_eq!(dense.output_shape(&[10]).unwrap(), vec![2]);
    }

    #[test]
    fn test_param_count() {
        assert_eq!(Layer::dense("d", 4, 2, Activation::Linear).param_count(), 10);
        assert_eq!(Layer::conv2d("c", 3, 8, 2).param_count(), 3 * 3 * 3 * 8 + 8);
        assert_eq!(Layer::relu6("r").param_count(), 0);
        assert!(!Layer::flatten("f").has_weights());
    }

    #[test]
    fn test_layer_serde_is_tagged() {
        let layer = Layer::max_pool2d("pool", 2, 2);
        let json = serde_json::to_value(&layer).unwrap();
        assert_eq!(json["kind"]["type"], "max_pool2d");
        let back: Layer = serde_json::from_value(json).unwrap();
        assert_eq!(back, layer);
    }
}

//! Sequential network: named layers, their burn weights and compile state.

use crate::backend::{RoostBackend, scalar};
use crate::compile::CompileSpec;
use crate::config::InputShape;
use crate::error::{ModelError, ModelResult};
use crate::layer::{Activation, Layer, LayerKind};
use crate::loss::Labels;
use crate::metrics::{Metric, predicted_classes};
use burn::module::{Module, Param};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2dConfig, MaxPool2dConfig};
use burn::nn::{Initializer, Linear, LinearConfig, PaddingConfig2d};
use burn::prelude::Backend;
use burn::tensor::activation::softmax;
use burn::tensor::{Tensor, TensorData};
use ndarray::Array4;
use rand::Rng;

/// Loss and metric values for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEvaluation {
    /// Mean loss over the batch.
    pub loss: f64,
    /// Metric values in compile order.
    pub metrics: Vec<(Metric, f64)>,
    /// Samples in the batch.
    pub samples: usize,
}

/// Parameters of a network: one module per weighted layer, in layer order.
#[derive(Module, Debug)]
pub struct Weights<B: Backend> {
    convs: Vec<Conv2d<B>>,
    denses: Vec<Linear<B>>,
}

impl<B: Backend> Weights<B> {
    fn empty() -> Self {
        Self { convs: Vec::new(), denses: Vec::new() }
    }
}

/// Host copy of one layer's weights.
///
/// Conv kernels are laid out `[filters, in_channels, k, k]`, dense kernels
/// `[inputs, units]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerWeights {
    pub kernel: Vec<f32>,
    pub bias: Vec<f32>,
}

enum Activations<B: Backend> {
    Spatial(Tensor<B, 4>),
    Flat(Tensor<B, 2>),
}

/// A layered, feed-forward image network.
///
/// Images enter as host `[batch, h, w, c]` arrays and run NCHW on the device.
#[derive(Debug, Clone)]
pub struct Network<B: Backend = RoostBackend> {
    name: String,
    input_shape: InputShape,
    layers: Vec<Layer>,
    weights: Weights<B>,
    compiled: Option<CompileSpec>,
    device: B::Device,
}

impl<B: Backend> Network<B> {
    /// Builds a network with freshly initialized weights: He-uniform for
    /// convolutions, Glorot-uniform for dense layers, zero biases.
    ///
    /// Layer names must be unique and shapes must line up from the input to
    /// the last layer.
    pub fn new<R: Rng + ?Sized>(
        name: impl Into<String>,
        input_shape: InputShape,
        layers: Vec<Layer>,
        rng: &mut R,
        device: &B::Device,
    ) -> ModelResult<Self> {
        let mut network = Self::empty(name.into(), input_shape, device);
        for layer in layers {
            network.push(layer, rng)?;
        }
        Ok(network)
    }

    /// Same layout as `new`, all weights zero. Used as the target of a record load.
    pub(crate) fn skeleton(
        name: String,
        input_shape: InputShape,
        layers: Vec<Layer>,
        device: &B::Device,
    ) -> ModelResult<Self> {
        let mut network = Self::empty(name, input_shape, device);
        for layer in layers {
            network.append(layer)?;
        }
        Ok(network)
    }

    fn empty(name: String, input_shape: InputShape, device: &B::Device) -> Self {
        Self {
            name,
            input_shape,
            layers: Vec::new(),
            weights: Weights::empty(),
            compiled: None,
            device: device.clone(),
        }
    }

    fn append(&mut self, layer: Layer) -> ModelResult<()> {
        if self.layers.iter().any(|l| l.name == layer.name) {
            return Err(ModelError::Shape(format!("duplicate layer name '{}'", layer.name)));
        }
        layer.output_shape(&self.output_shape()?)?;

        match layer.kind {
            LayerKind::Conv2d { in_channels, filters, kernel, stride } => {
                let conv = Conv2dConfig::new([in_channels, filters], [kernel, kernel])
                    .with_stride([stride, stride])
                    .with_padding(PaddingConfig2d::Explicit(kernel / 2, kernel / 2))
                    .with_initializer(Initializer::Zeros)
                    .init(&self.device);
                self.weights.convs.push(conv);
            }
            LayerKind::Dense { inputs, units, .. } => {
                let dense = LinearConfig::new(inputs, units)
                    .with_initializer(Initializer::Zeros)
                    .init(&self.device);
                self.weights.denses.push(dense);
            }
            _ => {}
        }
        self.layers.push(layer);
        Ok(())
    }

    /// Appends a layer, drawing its initial weights from `rng`.
    pub fn push<R: Rng + ?Sized>(&mut self, layer: Layer, rng: &mut R) -> ModelResult<()> {
        let name = layer.name.clone();
        let initial = initial_weights(&layer.kind, rng);
        self.append(layer)?;
        if let Some(weights) = initial {
            self.set_weights(&name, weights)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub const fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Mutable access to layers, for changing `trainable` flags.
    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub const fn device(&self) -> &B::Device {
        &self.device
    }

    /// Per-sample output shape.
    pub fn output_shape(&self) -> ModelResult<Vec<usize>> {
        self.layers
            .iter()
            .try_fold(self.input_shape.dims(), |shape, layer| layer.output_shape(&shape))
    }

    /// Number of values per sample in the output.
    pub fn output_units(&self) -> ModelResult<usize> {
        Ok(self.output_shape()?.iter().product())
    }

    #[must_use]
    pub fn param_count(&self) -> usize {
        self.layers.iter().map(Layer::param_count).sum()
    }

    #[must_use]
    pub fn trainable_param_count(&self) -> usize {
        self.layers.iter().filter(|l| l.trainable).map(Layer::param_count).sum()
    }

    /// Attaches optimizer, loss and metrics.
    pub fn compile(&mut self, spec: CompileSpec) {
        self.compiled = Some(spec);
    }

    pub fn uncompile(&mut self) {
        self.compiled = None;
    }

    #[must_use]
    pub const fn compile_spec(&self) -> Option<&CompileSpec> {
        self.compiled.as_ref()
    }

    #[must_use]
    pub const fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    #[must_use]
    pub const fn weights(&self) -> &Weights<B> {
        &self.weights
    }

    /// Replaces the weights with `f(weights)`, e.g. an optimizer step.
    #[must_use]
    pub fn map_weights(mut self, f: impl FnOnce(Weights<B>) -> Weights<B>) -> Self {
        self.weights = f(self.weights);
        self
    }

    pub(crate) fn load_weights(self, record: WeightsRecord<B>) -> Self {
        self.map_weights(|weights| weights.load_record(record))
    }

    /// Detaches the parameters of every weighted layer for which `frozen`
    /// returns true, so no gradients are computed for them.
    #[must_use]
    pub fn stop_gradients(mut self, frozen: impl Fn(usize, &Layer) -> bool) -> Self {
        let Weights { convs, denses } = self.weights;
        let (mut convs, mut denses) = (convs.into_iter(), denses.into_iter());
        let mut weights = Weights::empty();
        for (index, layer) in self.layers.iter().enumerate() {
            let detach = frozen(index, layer);
            match layer.kind {
                LayerKind::Conv2d { .. } => {
                    if let Some(conv) = convs.next() {
                        weights.convs.push(if detach { conv.no_grad() } else { conv });
                    }
                }
                LayerKind::Dense { .. } => {
                    if let Some(dense) = denses.next() {
                        weights.denses.push(if detach { dense.no_grad() } else { dense });
                    }
                }
                _ => {}
            }
        }
        self.weights = weights;
        self
    }

    fn index_of(&self, name: &str) -> ModelResult<usize> {
        self.layers
            .iter()
            .position(|l| l.name == name)
            .ok_or_else(|| ModelError::Shape(format!("network '{}' has no layer '{name}'", self.name)))
    }

    /// Position of layer `index` among the layers of its kind.
    fn slot(&self, index: usize) -> usize {
        let kind = self.layers[index].kind_name();
        self.layers[..index].iter().filter(|l| l.kind_name() == kind).count()
    }

    fn no_weights(&self, name: &str) -> ModelError {
        ModelError::Shape(format!("layer '{name}' of network '{}' has no weights", self.name))
    }

    /// Reads one layer's weights back to the host.
    pub fn weights_of(&self, name: &str) -> ModelResult<LayerWeights> {
        let index = self.index_of(name)?;
        let slot = self.slot(index);
        let (kernel, bias) = match self.layers[index].kind {
            LayerKind::Conv2d { .. } => {
                let conv = self.weights.convs.get(slot).ok_or_else(|| self.no_weights(name))?;
                (host(conv.weight.val())?, conv.bias.as_ref().map(|b| host(b.val())))
            }
            LayerKind::Dense { .. } => {
                let dense = self.weights.denses.get(slot).ok_or_else(|| self.no_weights(name))?;
                (host(dense.weight.val())?, dense.bias.as_ref().map(|b| host(b.val())))
            }
            _ => return Err(self.no_weights(name)),
        };
        Ok(LayerWeights { kernel, bias: bias.transpose()?.unwrap_or_default() })
    }

    /// Overwrites one layer's weights. Element counts must match the layer.
    pub fn set_weights(&mut self, name: &str, weights: LayerWeights) -> ModelResult<()> {
        let index = self.index_of(name)?;
        let slot = self.slot(index);
        let mismatch = |expected: usize, bias: usize| {
            ModelError::Shape(format!(
                "layer '{name}' needs {expected} kernel and {bias} bias values, got {} and {}",
                weights.kernel.len(),
                weights.bias.len()
            ))
        };

        match self.layers[index].kind.clone() {
            LayerKind::Conv2d { in_channels, filters, kernel, .. } => {
                let size = filters * in_channels * kernel * kernel;
                if weights.kernel.len() != size || weights.bias.len() != filters {
                    return Err(mismatch(size, filters));
                }
                let device = self.device.clone();
                let conv = self.weights.convs.get_mut(slot).ok_or_else(|| missing(name))?;
                conv.weight = param(weights.kernel, [filters, in_channels, kernel, kernel], &device);
                conv.bias = Some(param(weights.bias, [filters], &device));
            }
            LayerKind::Dense { inputs, units, .. } => {
                if weights.kernel.len() != inputs * units || weights.bias.len() != units {
                    return Err(mismatch(inputs * units, units));
                }
                let device = self.device.clone();
                let dense = self.weights.denses.get_mut(slot).ok_or_else(|| missing(name))?;
                dense.weight = param(weights.kernel, [inputs, units], &device);
                dense.bias = Some(param(weights.bias, [units], &device));
            }
            _ => return Err(self.no_weights(name)),
        }
        Ok(())
    }

    /// Checks that every weight tensor has the shape its layer declares.
    pub fn check_weights(&self) -> ModelResult<()> {
        let (mut convs, mut denses) = (self.weights.convs.iter(), self.weights.denses.iter());
        for layer in &self.layers {
            let (expected, actual) = match layer.kind {
                LayerKind::Conv2d { in_channels, filters, kernel, .. } => {
                    let conv = convs.next().ok_or_else(|| self.no_weights(&layer.name))?;
                    (vec![filters, in_channels, kernel, kernel], conv.weight.dims().to_vec())
                }
                LayerKind::Dense { inputs, units, .. } => {
                    let dense = denses.next().ok_or_else(|| self.no_weights(&layer.name))?;
                    (vec![inputs, units], dense.weight.dims().to_vec())
                }
                _ => continue,
            };
            if expected != actual {
                return Err(ModelError::Shape(format!(
                    "layer '{}' declares weights {expected:?}, found {actual:?}",
                    layer.name
                )));
            }
        }
        if convs.next().is_some() || denses.next().is_some() {
            return Err(ModelError::Shape(format!("network '{}' has weights without layers", self.name)));
        }
        Ok(())
    }

    fn input_tensor(&self, images: &Array4<f32>) -> ModelResult<Tensor<B, 4>> {
        let (n, h, w, c) = images.dim();
        if [h, w, c] != [self.input_shape.height, self.input_shape.width, self.input_shape.channels] {
            return Err(ModelError::Shape(format!(
                "network '{}' expects batches of {}, got {:?}",
                self.name,
                self.input_shape,
                images.shape()
            )));
        }
        let data = TensorData::new(images.iter().copied().collect::<Vec<f32>>(), [n, h, w, c]);
        // NHWC -> NCHW
        Ok(Tensor::<B, 4>::from_data(data, &self.device).swap_dims(1, 3).swap_dims(2, 3))
    }

    fn run(&self, images: &Array4<f32>, final_softmax: bool) -> ModelResult<Tensor<B, 2>> {
        let mut x = Activations::Spatial(self.input_tensor(images)?);
        let (mut convs, mut denses) = (self.weights.convs.iter(), self.weights.denses.iter());
        let last = self.layers.len().saturating_sub(1);

        for (index, layer) in self.layers.iter().enumerate() {
            x = match (&layer.kind, x) {
                (LayerKind::Input { .. }, x) => x,
                (LayerKind::Conv2d { .. }, Activations::Spatial(t)) => {
                    let conv = convs.next().ok_or_else(|| self.no_weights(&layer.name))?;
                    Activations::Spatial(conv.forward(t))
                }
                (LayerKind::Relu6, Activations::Spatial(t)) => Activations::Spatial(t.clamp(0.0, 6.0)),
                (LayerKind::Relu6, Activations::Flat(t)) => Activations::Flat(t.clamp(0.0, 6.0)),
                (LayerKind::MaxPool2d { pool, stride }, Activations::Spatial(t)) => {
                    let pool = MaxPool2dConfig::new([*pool, *pool]).with_strides([*stride, *stride]).init();
                    Activations::Spatial(pool.forward(t))
                }
                (LayerKind::GlobalAveragePool, Activations::Spatial(t)) => {
                    let [n, c, _, _] = t.dims();
                    let pooled = AdaptiveAvgPool2dConfig::new([1, 1]).init().forward(t);
                    Activations::Flat(pooled.reshape([n, c]))
                }
                (LayerKind::Flatten, Activations::Spatial(t)) => Activations::Flat(t.flatten(1, 3)),
                (LayerKind::Flatten, flat @ Activations::Flat(_)) => flat,
                (LayerKind::Dense { activation, .. }, Activations::Flat(t)) => {
                    let dense = denses.next().ok_or_else(|| self.no_weights(&layer.name))?;
                    let z = dense.forward(t);
                    let apply = *activation == Activation::Softmax && (final_softmax || index != last);
                    Activations::Flat(if apply { softmax(z, 1) } else { z })
                }
                _ => {
                    return Err(ModelError::Shape(format!(
                        "layer '{}' received an input of the wrong rank",
                        layer.name
                    )));
                }
            };
        }

        match x {
            Activations::Flat(t) => Ok(t),
            Activations::Spatial(_) => Err(ModelError::Shape(format!(
                "network '{}' has a spatial output, not [batch, units]",
                self.name
            ))),
        }
    }

    /// Full forward pass; the network must end in a flat output.
    pub fn forward(&self, images: &Array4<f32>) -> ModelResult<Tensor<B, 2>> {
        self.run(images, true)
    }

    /// Forward pass without the softmax of a final softmax dense layer.
    pub fn forward_logits(&self, images: &Array4<f32>) -> ModelResult<Tensor<B, 2>> {
        self.run(images, false)
    }

    /// Forward pass plus compiled loss and metrics. No weights change.
    pub fn evaluate_batch(&self, images: &Array4<f32>, labels: &Labels) -> ModelResult<BatchEvaluation> {
        let spec = self
            .compiled
            .as_ref()
            .ok_or_else(|| ModelError::NotCompiled(self.name.clone()))?;
        let logits = self.forward_logits(images)?;
        let loss = scalar(spec.loss.compute(logits.clone(), labels)?);
        let predicted = predicted_classes(logits)?;
        let metrics = spec
            .metrics
            .iter()
            .map(|m| m.compute(&predicted, labels).map(|v| (*m, v)))
            .collect::<ModelResult<Vec<_>>>()?;
        Ok(BatchEvaluation { loss, metrics, samples: labels.len() })
    }
}

fn missing(name: &str) -> ModelError {
    ModelError::Shape(format!("layer '{name}' has no weights"))
}

fn param<B: Backend, const D: usize>(values: Vec<f32>, shape: [usize; D], device: &B::Device) -> Param<Tensor<B, D>> {
    Param::from_tensor(Tensor::from_data(TensorData::new(values, shape), device))
}

fn host<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> ModelResult<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ModelError::Shape(format!("cannot read weights: {e:?}")))
}

fn initial_weights<R: Rng + ?Sized>(kind: &LayerKind, rng: &mut R) -> Option<LayerWeights> {
    let (count, bias, limit) = match *kind {
        LayerKind::Conv2d { in_channels, filters, kernel, .. } => {
            let fan_in = kernel * kernel * in_channels;
            (fan_in * filters, filters, (6.0 / fan_in.max(1) as f32).sqrt())
        }
        LayerKind::Dense { inputs, units, .. } => {
            (inputs * units, units, (6.0 / (inputs + units).max(1) as f32).sqrt())
        }
        _ => return None,
    };
    Some(LayerWeights {
        kernel: (0..count).map(|_| rng.gen_range(-limit..=limit)).collect(),
        bias: vec![0.0; bias],
    })
}

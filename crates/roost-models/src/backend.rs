//! Backend aliases.
//!
//! Everything runs on the CPU `ndarray` backend. Training wraps it in
//! `Autodiff` so the loss can be differentiated.

use burn::backend::Autodiff;
use burn::prelude::Backend;
use burn::tensor::{ElementConversion, Tensor};
use burn_ndarray::NdArray;

/// Backend for inference and persistence.
pub type RoostBackend = NdArray<f32>;

/// Backend for optimizer steps.
pub type TrainBackend = Autodiff<RoostBackend>;

/// Device of [`RoostBackend`] and [`TrainBackend`].
pub type RoostDevice = <RoostBackend as Backend>::Device;

/// Reads a one-element tensor back to the host.
pub fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

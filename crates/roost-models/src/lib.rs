//! Image classification networks for Roost.
//!
//! This crate holds the numeric side of the pipeline: a small sequential
//! network whose weights are `burn` modules on the `ndarray` backend, the
//! providers that hand out pretrained feature extractors, compile-time
//! loss/metric/optimizer selection and the on-disk artifact format.
//!
//! # Providers
//!
//! - **mobilenet-lite**: three strided conv blocks with optional softmax
//!   head. Deterministic reference weights under `imagenet`.

pub mod backend;
pub mod checkpoint;
pub mod compile;
pub mod config;
pub mod error;
pub mod factory;
pub mod layer;
pub mod loss;
pub mod metrics;
pub mod network;
pub mod optim;
pub mod provider;

pub use backend::{RoostBackend, RoostDevice, TrainBackend, scalar};
pub use checkpoint::{ARTIFACT_EXTENSION, LoadOptions, load_model, save_model, write_atomic};
pub use compile::CompileSpec;
pub use config::{InputShape, ModelConfig};
pub use error::{ModelError, ModelResult};
pub use factory::{ProviderFactory, ProviderType};
pub use layer::{Activation, Layer, LayerKind};
pub use loss::{LabelMode, Labels, Loss};
pub use metrics::{Metric, WeightedMean, predicted_classes};
pub use network::{BatchEvaluation, LayerWeights, Network, Weights};
pub use optim::Adam;
pub use provider::{IMAGENET_WEIGHTS, MobileNetLite, ModelProvider, seed_for};

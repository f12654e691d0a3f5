//! Pretrained network providers.

use crate::backend::RoostDevice;
use crate::checkpoint::{LoadOptions, load_model};
use crate::config::ModelConfig;
use crate::error::{ModelError, ModelResult};
use crate::layer::{Activation, Layer};
use crate::network::Network;
use rand::SeedableRng;
use rand::rngs::StdRng;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

/// Identifier of the bundled reference weights.
pub const IMAGENET_WEIGHTS: &str = "imagenet";

/// Class count of the bundled reference head.
pub const IMAGENET_CLASSES: usize = 1000;

/// Smallest supported input height/width.
pub const MIN_INPUT_SIZE: usize = 32;

/// A source of pretrained networks.
pub trait ModelProvider: Send + Sync {
    /// Provider identifier.
    fn id(&self) -> &'static str;

    /// Returns a network matching `config`'s shape, head and weight source.
    fn get_pretrained_network(&self, config: &ModelConfig) -> ModelResult<Network>;
}

/// A compact MobileNet-style convolutional feature extractor.
///
/// Layout: input, then three `conv 3x3/2 + relu6` blocks, the first two
/// followed by `max_pool 2x2`. With `include_top` a global average pool and
/// a softmax dense head of `class_count` units are appended.
#[derive(Debug, Clone)]
pub struct MobileNetLite {
    base_filters: usize,
}

impl Default for MobileNetLite {
    fn default() -> Self {
        Self { base_filters: 8 }
    }
}

impl MobileNetLite {
    /// Provider name used by the factory.
    pub const ID: &'static str = "mobilenet-lite";

    /// Creates a provider whose first block has `base_filters` filters
    /// (doubled in each following block).
    #[must_use]
    pub fn new(base_filters: usize) -> Self {
        Self { base_filters: base_filters.max(1) }
    }

    fn reject(reason: impl Into<String>) -> ModelError {
        ModelError::Provider { provider: Self::ID.to_string(), reason: reason.into() }
    }

    fn check(config: &ModelConfig) -> ModelResult<()> {
        let shape = config.input_shape;
        if shape.height < MIN_INPUT_SIZE || shape.width < MIN_INPUT_SIZE {
            return Err(Self::reject(format!(
                "input shape {shape} is below the minimum {MIN_INPUT_SIZE}x{MIN_INPUT_SIZE}"
            )));
        }
        if shape.channels == 0 {
            return Err(Self::reject("input shape must have at least one channel"));
        }
        let pretrained = config.pretrained_weights.as_deref() == Some(IMAGENET_WEIGHTS);
        if pretrained && shape.channels != 3 {
            return Err(Self::reject(format!(
                "'{IMAGENET_WEIGHTS}' weights require 3 input channels, got {}",
                shape.channels
            )));
        }
        if config.include_top && pretrained && config.class_count != IMAGENET_CLASSES {
            return Err(Self::reject(format!(
                "include_top with '{IMAGENET_WEIGHTS}' weights requires {IMAGENET_CLASSES} classes, got {}",
                config.class_count
            )));
        }
        if config.include_top && config.class_count == 0 {
            return Err(Self::reject("include_top requires at least one class"));
        }
        Ok(())
    }

    fn layers(&self, config: &ModelConfig) -> Vec<Layer> {
        let shape = config.input_shape;
        let f1 = self.base_filters;
        let (f2, f3) = (f1 * 2, f1 * 4);

        let mut layers = vec![
            Layer::input("input", shape),
            Layer::conv2d("block_1_conv", shape.channels, f1, 2),
            Layer::relu6("block_1_relu"),
            Layer::max_pool2d("block_1_pool", 2, 2),
            Layer::conv2d("block_2_conv", f1, f2, 2),
            Layer::relu6("block_2_relu"),
            Layer::max_pool2d("block_2_pool", 2, 2),
            Layer::conv2d("block_3_conv", f2, f3, 2),
            Layer::relu6("out_relu"),
        ];
        if config.include_top {
            layers.push(Layer::global_average_pool("global_average_pool"));
            layers.push(Layer::dense("predictions", f3, config.class_count, Activation::Softmax));
        }
        layers
    }

    fn build(&self, config: &ModelConfig, rng: &mut StdRng) -> ModelResult<Network> {
        Network::new(Self::ID, config.input_shape, self.layers(config), rng, &RoostDevice::default())
    }

    fn load_weights_from(network: &mut Network, path: &Path) -> ModelResult<()> {
        let source: Network = load_model(path, LoadOptions::weights_only())
            .map_err(|e| Self::reject(format!("cannot read weights from {}: {e}", path.display())))?;

        let targets: Vec<Layer> = network.layers().iter().filter(|l| l.has_weights()).cloned().collect();
        for layer in targets {
            let src = source
                .layers()
                .iter()
                .find(|l| l.name == layer.name)
                .ok_or_else(|| {
                    Self::reject(format!("weights file {} has no layer '{}'", path.display(), layer.name))
                })?;
            if src.kind != layer.kind {
                return Err(Self::reject(format!(
                    "layer '{}' in {} is a different {} than requested",
                    layer.name,
                    path.display(),
                    src.kind_name()
                )));
            }
            let weights = source.weights_of(&layer.name)?;
            network.set_weights(&layer.name, weights)?;
        }
        Ok(())
    }
}

impl ModelProvider for MobileNetLite {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn get_pretrained_network(&self, config: &ModelConfig) -> ModelResult<Network> {
        Self::check(config)?;

        let network = match config.pretrained_weights.as_deref() {
            Some(IMAGENET_WEIGHTS) => {
                let mut rng = StdRng::seed_from_u64(seed_for(&format!("{}/{IMAGENET_WEIGHTS}", Self::ID)));
                self.build(config, &mut rng)?
            }
            None => {
                let mut rng = StdRng::from_entropy();
                self.build(config, &mut rng)?
            }
            Some(source) if Path::new(source).is_file() => {
                let mut rng = StdRng::from_entropy();
                let mut network = self.build(config, &mut rng)?;
                Self::load_weights_from(&mut network, Path::new(source))?;
                network
            }
            Some(other) => {
                return Err(Self::reject(format!(
                    "unknown weights '{other}' (expected '{IMAGENET_WEIGHTS}', none, or a model artifact path)"
                )));
            }
        };

        debug!(
            provider = Self::ID,
            layers = network.layer_count(),
            params = network.param_count(),
            "Built pretrained network"
        );
        info!(
            input_shape = %config.input_shape,
            include_top = config.include_top,
            weights = config.pretrained_weights.as_deref().unwrap_or("none"),
            "Pretrained network ready"
        );
        Ok(network)
    }
}

/// Stable 64-bit seed derived from a label.
#[must_use]
pub fn seed_for(label: &str) -> u64 {
    let digest = Sha256::digest(label.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::save_model;
    use crate::config::InputShape;
    use tempfile::TempDir;

    fn config() -> ModelConfig {
        ModelConfig::new(InputShape::new(64, 64, 3), 2)
    }

    #[test]
    fn test_imagenet_weights_are_deterministic() {
        let provider = MobileNetLite::default();
        let a = provider.get_pretrained_network(&config()).unwrap();
        let b = provider.get_pretrained_network(&config()).unwrap();
        assert_eq!(a.layers(), b.layers());
        for name in ["block_1_conv", "block_2_conv", "block_3_conv"] {
            assert_eq!(a.weights_of(name).unwrap(), b.weights_of(name).unwrap());
        }
        assert_eq!(a.layer_count(), 9);
        assert_eq!(a.output_shape().unwrap(), vec![2, 2, 32]);
    }

    #[test]
    fn test_include_top_appends_head() {
        let provider = MobileNetLite::default();
        let cfg = config().with_include_top(true).with_weights(None);
        let net = provider.get_pretrained_network(&cfg).unwrap();
        assert_eq!(net.layer_count(), 11);
        assert_eq!(net.output_shape().unwrap(), vec![2]);
    }

    #[test]
    fn test_rejects_unsupported_requests() {
        let provider = MobileNetLite::default();

        let small = ModelConfig::new(InputShape::new(16, 16, 3), 2);
        assert!(matches!(provider.get_pretrained_network(&small), Err(ModelError::Provider { .. })));

        let grey = ModelConfig::new(InputShape::new(64, 64, 1), 2);
        assert!(provider.get_pretrained_network(&grey).is_err());
        assert!(provider.get_pretrained_network(&grey.with_weights(None)).is_ok());

        let top = config().with_include_top(true);
        assert!(provider.get_pretrained_network(&top).is_err());

        let unknown = config().with_weights(Some("no-such-weights".to_string()));
        assert!(provider.get_pretrained_network(&unknown).is_err());
    }

    #[test]
    fn test_weights_from_artifact_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("reference.json");
        let provider = MobileNetLite::default();
        let reference = provider.get_pretrained_network(&config()).unwrap();
        save_model(&reference, &path).unwrap();

        let cfg = config().with_weights(Some(path.display().to_string()));
        let loaded = provider.get_pretrained_network(&cfg).unwrap();
        assert_eq!(loaded.layers(), reference.layers());
        assert_eq!(
            loaded.weights_of("block_3_conv").unwrap(),
            reference.weights_of("block_3_conv").unwrap()
        );
    }

    #[test]
    fn test_fresh_weights_differ_from_reference() {
        let provider = MobileNetLite::default();
        let reference = provider.get_pretrained_network(&config()).unwrap();
        let fresh = provider.get_pretrained_network(&config().with_weights(None)).unwrap();
        assert_ne!(
            fresh.weights_of("block_1_conv").unwrap(),
            reference.weights_of("block_1_conv").unwrap()
        );
    }

    #[test]
    fn test_reference_network_runs_on_rgb_batches() {
        let provider = MobileNetLite::default();
        let cfg = config().with_include_top(true).with_weights(None);
        let net = provider.get_pretrained_network(&cfg).unwrap();
        let probs = net.forward(&ndarray::Array4::from_elem((2, 64, 64, 3), 0.5)).unwrap();
        assert_eq!(probs.dims(), [2, 2]);
    }
}

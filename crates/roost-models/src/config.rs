//! Architecture parameters handed to a model provider.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Image tensor shape without the batch axis, laid out as `(height, width, channels)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputShape {
    /// Image height in pixels.
    pub height: usize,
    /// Image width in pixels.
    pub width: usize,
    /// Number of colour channels.
    pub channels: usize,
}

impl InputShape {
    /// Creates a new shape.
    #[must_use]
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self { height, width, channels }
    }

    /// Returns the shape as a dimension vector (`[h, w, c]`).
    #[must_use]
    pub fn dims(&self) -> Vec<usize> {
        vec![self.height, self.width, self.channels]
    }

    /// Returns `(height, width)`.
    #[must_use]
    pub const fn spatial(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

impl From<[usize; 3]> for InputShape {
    fn from(value: [usize; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.height, self.width, self.channels)
    }
}

/// Model configuration consumed by a provider and by adaptation.
///
/// Immutable once a stage starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Input image shape.
    pub input_shape: InputShape,
    /// Whether the provider should include its own classification head.
    pub include_top: bool,
    /// Pretrained weight source: an identifier such as `imagenet`, a path to a
    /// persisted artifact, or `None` for fresh initialization.
    pub pretrained_weights: Option<String>,
    /// Number of target classes (>= 2).
    pub class_count: usize,
    /// Learning rate for the adapted model's optimizer (> 0).
    pub learning_rate: f64,
}

impl ModelConfig {
    /// Creates a configuration with the given shape and class count,
    /// `imagenet` weights, no top and a learning rate of 0.01.
    #[must_use]
    pub fn new(input_shape: InputShape, class_count: usize) -> Self {
        Self {
            input_shape,
            include_top: false,
            pretrained_weights: Some("imagenet".to_string()),
            class_count,
            learning_rate: 0.01,
        }
    }

    /// Checks the fields adaptation relies on: at least two classes and a
    /// finite positive learning rate.
    pub fn validate(&self) -> ModelResult<()> {
        if self.class_count < 2 {
            return Err(ModelError::InvalidConfig(format!(
                "class_count must be at least 2, got {}",
                self.class_count
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ModelError::InvalidConfig(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }

    /// Sets the pretrained weight source.
    #[must_use]
    pub fn with_weights(mut self, weights: Option<String>) -> Self {
        self.pretrained_weights = weights;
        self
    }

    /// Sets whether the provider's own head is included.
    #[must_use]
    pub const fn with_include_top(mut self, include_top: bool) -> Self {
        self.include_top = include_top;
        self
    }

    /// Sets the learning rate.
    #[must_use]
    pub const fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_shape_from_array() {
        let shape = InputShape::from([224, 224, 3]);
        assert_eq!(shape.spatial(), (224, 224));
        assert_eq!(shape.dims(), vec![224, 224, 3]);
        assert_eq!(shape.to_string(), "(224, 224, 3)");
    }

    #[test]
    fn test_model_config_builder() {
        let config = ModelConfig::new(InputShape::new(64, 64, 3), 2)
            .with_weights(None)
            .with_include_top(true)
            .with_learning_rate(0.001);

        assert!(config.include_top);
        assert!(config.pretrained_weights.is_none());
        assert_eq!(config.class_count, 2);
        assert!((config.learning_rate - 0.001).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_out_of_range_fields() {
        let shape = InputShape::new(64, 64, 3);
        assert!(ModelConfig::new(shape, 2).validate().is_ok());
        assert!(matches!(ModelConfig::new(shape, 1).validate(), Err(ModelError::InvalidConfig(_))));
        assert!(matches!(
            ModelConfig::new(shape, 3).with_learning_rate(0.0).validate(),
            Err(ModelError::InvalidConfig(_))
        ));
        assert!(ModelConfig::new(shape, 3).with_learning_rate(f64::NAN).validate().is_err());
    }
}

//! Adam hyperparameters stored with a compiled model.

use burn::optim::AdamConfig;
use serde::{Deserialize, Serialize};

/// Adam hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    /// Step size.
    pub learning_rate: f64,
    /// First moment decay.
    pub beta_1: f32,
    /// Second moment decay.
    pub beta_2: f32,
    /// Numerical stability term.
    pub epsilon: f32,
}

impl Adam {
    /// Creates Adam with the given learning rate and default decay terms.
    #[must_use]
    pub const fn new(learning_rate: f64) -> Self {
        Self { learning_rate, beta_1: 0.9, beta_2: 0.999, epsilon: 1e-7 }
    }

    /// Optimizer config for `burn::optim`. The learning rate is passed per step.
    #[must_use]
    pub fn config(&self) -> AdamConfig {
        AdamConfig::new()
            .with_beta_1(self.beta_1)
            .with_beta_2(self.beta_2)
            .with_epsilon(self.epsilon)
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.001)
    }
}

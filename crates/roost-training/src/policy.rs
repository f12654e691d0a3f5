//! Which inherited layers stay trainable during adaptation.

use roost_models::Layer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Freezing policy applied to a base model's layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", content = "layers", rename_all = "snake_case")]
pub enum FreezePolicy {
    /// Every inherited layer is frozen.
    #[default]
    FreezeAll,
    /// All but the last `n` inherited layers are frozen.
    FreezeTrailing(usize),
    /// Nothing is frozen.
    FreezeNone,
}

impl FreezePolicy {
    /// Derives the policy from the two configuration flags.
    ///
    /// `freeze_all` takes precedence over `freeze_till`.
    #[must_use]
    pub const fn from_flags(freeze_all: bool, freeze_till: Option<usize>) -> Self {
        match (freeze_all, freeze_till) {
            (true, _) => Self::FreezeAll,
            (false, Some(n)) => Self::FreezeTrailing(n),
            (false, None) => Self::FreezeNone,
        }
    }

    /// Whether the layer at `index` of `layer_count` stays trainable.
    #[must_use]
    pub const fn is_trainable(self, index: usize, layer_count: usize) -> bool {
        match self {
            Self::FreezeAll => false,
            Self::FreezeNone | Self::FreezeTrailing(0) => true,
            Self::FreezeTrailing(n) => n >= layer_count || index >= layer_count - n,
        }
    }

    /// Sets `trainable` on every layer. Returns the number of frozen layers.
    pub fn apply(self, layers: &mut [Layer]) -> usize {
        let count = layers.len();
        let mut frozen = 0;
        for (index, layer) in layers.iter_mut().enumerate() {
            layer.trainable = self.is_trainable(index, count);
            if !layer.trainable {
                frozen += 1;
            }
        }
        frozen
    }
}

impl fmt::Display for FreezePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FreezeAll => write!(f, "freeze_all"),
            Self::FreezeTrailing(n) => write!(f, "freeze_trailing({n})"),
            Self::FreezeNone => write!(f, "freeze_none"),
        }
    }
}

//! Provider factory: resolves a provider name from configuration.

use crate::error::{ModelError, ModelResult};
use crate::provider::{MobileNetLite, ModelProvider};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Known provider kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    /// Compact MobileNet-style extractor.
    MobileNetLite,
}

impl FromStr for ProviderType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mobilenet-lite" | "mobilenet_lite" | "mobilenet" => Ok(Self::MobileNetLite),
            other => Err(ModelError::Provider {
                provider: other.to_string(),
                reason: "unknown provider (supported: mobilenet-lite)".to_string(),
            }),
        }
    }
}

/// Creates provider instances.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Creates a provider of the given kind.
    #[must_use]
    pub fn create(provider_type: ProviderType) -> Arc<dyn ModelProvider> {
        debug!(provider_type = ?provider_type, "Creating model provider");
        match provider_type {
            ProviderType::MobileNetLite => Arc::new(MobileNetLite::default()),
        }
    }

    /// Parses `name` and creates the provider.
    ///
    /// # Errors
    /// Returns `ModelError::Provider` for unknown names.
    pub fn create_from_str(name: &str) -> ModelResult<Arc<dyn ModelProvider>> {
        let provider_type = ProviderType::from_str(name)?;
        Ok(Self::create(provider_type))
    }
}

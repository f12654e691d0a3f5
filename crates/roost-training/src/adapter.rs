//! Turns a generic pretrained network into a task-specific classifier.
//!
//! The adapter is a small state machine:
//!
//! ```text
//! Uninitialized -> BaseAcquired -> Adapted -> Persisted
//! ```
//!
//! Each `acquire_base_model` call starts a new run and stamps the returned
//! [`BaseModel`] with the run token. `adapt` only accepts the base model of
//! the current run.

use crate::artifacts::{ArtifactKind, TrainingArtifact, make_artifact};
use crate::error::{TrainingError, TrainingResult};
use crate::policy::FreezePolicy;
use rand::SeedableRng;
use rand::rngs::StdRng;
use roost_models::{Activation, CompileSpec, Layer, ModelConfig, ModelProvider, Network, save_model};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Name of the flatten layer appended by `adapt`.
pub const HEAD_FLATTEN: &str = "head_flatten";

/// Name of the classification layer appended by `adapt`.
pub const HEAD_DENSE: &str = "head_dense";

/// Adapter lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    Uninitialized,
    BaseAcquired,
    Adapted,
    Persisted,
}

impl AdapterState {
    /// Whether moving from `self` to `target` is allowed.
    ///
    /// Re-acquiring is allowed from any state and starts a new run.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (_, Self::BaseAcquired)
                | (Self::BaseAcquired, Self::Adapted)
                | (Self::Adapted | Self::Persisted, Self::Persisted)
        )
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::BaseAcquired => "base_acquired",
            Self::Adapted => "adapted",
            Self::Persisted => "persisted",
        };
        f.write_str(s)
    }
}

/// Pretrained network handed out by [`ModelAdapter::acquire_base_model`].
///
/// Not `Clone`: it is consumed by `adapt`.
#[derive(Debug)]
pub struct BaseModel {
    network: Network,
    run_id: Uuid,
    artifact: TrainingArtifact,
}

impl BaseModel {
    #[must_use]
    pub const fn network(&self) -> &Network {
        &self.network
    }

    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The persisted base-model artifact (path and digest).
    #[must_use]
    pub const fn artifact(&self) -> &TrainingArtifact {
        &self.artifact
    }
}

/// Base layers plus a trainable classification head, compiled.
#[derive(Debug, Clone)]
pub struct AdaptedModel {
    network: Network,
    base_layer_count: usize,
    policy: FreezePolicy,
}

impl AdaptedModel {
    #[must_use]
    pub const fn network(&self) -> &Network {
        &self.network
    }

    #[must_use]
    pub fn into_network(self) -> Network {
        self.network
    }

    /// Layers inherited from the base model.
    #[must_use]
    pub const fn base_layer_count(&self) -> usize {
        self.base_layer_count
    }

    #[must_use]
    pub const fn policy(&self) -> FreezePolicy {
        self.policy
    }
}

/// Acquires, adapts and persists models for one pipeline.
pub struct ModelAdapter {
    provider: Arc<dyn ModelProvider>,
    config: ModelConfig,
    base_model_path: PathBuf,
    head_seed: u64,
    state: AdapterState,
    run_id: Option<Uuid>,
}

impl ModelAdapter {
    #[must_use]
    pub fn new(provider: Arc<dyn ModelProvider>, config: ModelConfig, base_model_path: PathBuf) -> Self {
        Self {
            provider,
            config,
            base_model_path,
            head_seed: 42,
            state: AdapterState::Uninitialized,
            run_id: None,
        }
    }

    /// Seed for the head's weight initialization.
    #[must_use]
    pub const fn with_head_seed(mut self, seed: u64) -> Self {
        self.head_seed = seed;
        self
    }

    #[must_use]
    pub const fn state(&self) -> AdapterState {
        self.state
    }

    #[must_use]
    pub const fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn transition(&mut self, target: AdapterState) -> TrainingResult<()> {
        if !self.state.can_transition_to(target) {
            return Err(TrainingError::InvalidState(format!(
                "adapter cannot move from {} to {target}",
                self.state
            )));
        }
        self.state = target;
        Ok(())
    }

    /// Requests a network from the provider and persists it unmodified.
    pub fn acquire_base_model(&mut self) -> TrainingResult<BaseModel> {
        self.config.validate()?;
        self.state = AdapterState::Uninitialized;
        self.run_id = None;

        let network = self.provider.get_pretrained_network(&self.config)?;
        save_model(&network, &self.base_model_path)?;
        let artifact = make_artifact(ArtifactKind::BaseModel, self.base_model_path.clone())?;

        let run_id = Uuid::new_v4();
        self.run_id = Some(run_id);
        self.transition(AdapterState::BaseAcquired)?;

        info!(
            provider = self.provider.id(),
            path = %self.base_model_path.display(),
            layers = network.layer_count(),
            sha256 = %artifact.sha256,
            "Base model acquired"
        );
        Ok(BaseModel { network, run_id, artifact })
    }

    /// Freezes base layers per `policy`, appends a flatten + softmax dense
    /// head of `class_count` units and compiles with Adam at `learning_rate`.
    ///
    /// Out-of-range arguments are rejected before anything else is checked
    /// and leave the adapter state unchanged.
    pub fn adapt(
        &mut self,
        base: BaseModel,
        policy: FreezePolicy,
        class_count: usize,
        learning_rate: f64,
    ) -> TrainingResult<AdaptedModel> {
        ModelConfig { class_count, learning_rate, ..self.config.clone() }.validate()?;
        if self.state != AdapterState::BaseAcquired || self.run_id != Some(base.run_id) {
            return Err(TrainingError::InvalidState(format!(
                "adapt requires the base model of the current run (adapter is {})",
                self.state
            )));
        }

        let BaseModel { mut network, .. } = base;
        let name = network.name().to_string();
        let features = network.output_units()?;
        let base_layer_count = network.layer_count();
        let frozen = policy.apply(network.layers_mut());

        let mut rng = StdRng::seed_from_u64(self.head_seed);
        network.push(Layer::flatten(HEAD_FLATTEN), &mut rng)?;
        network.push(Layer::dense(HEAD_DENSE, features, class_count, Activation::Softmax), &mut rng)?;

        let mut adapted = network.with_name(format!("{name}_adapted"));
        adapted.compile(CompileSpec::sparse_classification(learning_rate));
        self.transition(AdapterState::Adapted)?;

        debug!(%policy, frozen, base_layer_count, features, "Applied freeze policy");
        info!(
            classes = class_count,
            learning_rate,
            params = adapted.param_count(),
            trainable_params = adapted.trainable_param_count(),
            "Base model adapted"
        );
        Ok(AdaptedModel { network: adapted, base_layer_count, policy })
    }

    /// Writes the adapted model, with its compile state, to `path`.
    pub fn persist(&mut self, model: &AdaptedModel, path: &Path) -> TrainingResult<TrainingArtifact> {
        if !self.state.can_transition_to(AdapterState::Persisted) {
            return Err(TrainingError::InvalidState(format!(
                "persist requires an adapted model (adapter is {})",
                self.state
            )));
        }
        save_model(&model.network, path)?;
        let artifact = make_artifact(ArtifactKind::AdaptedModel, path.to_path_buf())?;
        self.transition(AdapterState::Persisted)?;

        info!(path = %path.display(), sha256 = %artifact.sha256, "Adapted model saved");
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roost_models::{InputShape, MobileNetLite};
    use tempfile::TempDir;

    fn adapter(dir: &Path) -> ModelAdapter {
        let config = ModelConfig::new(InputShape::new(32, 32, 3), 2);
        ModelAdapter::new(Arc::new(MobileNetLite::default()), config, dir.join("base.json"))
    }

    #[test]
    fn test_state_transitions() {
        use AdapterState::*;
        assert!(Uninitialized.can_transition_to(BaseAcquired));
        assert!(Persisted.can_transition_to(BaseAcquired));
        assert!(BaseAcquired.can_transition_to(Adapted));
        assert!(Adapted.can_transition_to(Persisted));
        assert!(!Uninitialized.can_transition_to(Adapted));
        assert!(!Adapted.can_transition_to(Adapted));
        assert!(!BaseAcquired.can_transition_to(Persisted));
    }

    #[test]
    fn test_acquire_persists_base_model() {
        let temp = TempDir::new().unwrap();
        let mut adapter = adapter(temp.path());
        let base = adapter.acquire_base_model().unwrap();

        assert_eq!(adapter.state(), AdapterState::BaseAcquired);
        assert!(base.artifact().path.exists());
        assert_eq!(base.artifact().sha256.len(), 64);
    }

    #[test]
    fn test_adapt_rejects_stale_base() {
        let temp = TempDir::new().unwrap();
        let mut adapter = adapter(temp.path());
        let stale = adapter.acquire_base_model().unwrap();
        let _current = adapter.acquire_base_model().unwrap();

        let err = adapter.adapt(stale, FreezePolicy::FreezeAll, 2, 0.01).unwrap_err();
        assert!(matches!(err, TrainingError::InvalidState(_)));
    }

    #[test]
    fn test_adapt_rejects_base_from_other_adapter() {
        let temp = TempDir::new().unwrap();
        let mut first = adapter(temp.path());
        let base = first.acquire_base_model().unwrap();

        let mut second = adapter(temp.path());
        let err = second.adapt(base, FreezePolicy::FreezeAll, 2, 0.01).unwrap_err();
        assert!(matches!(err, TrainingError::InvalidState(_)));
    }

    #[test]
    fn test_adapt_appends_trainable_head() {
        let temp = TempDir::new().unwrap();
        let mut adapter = adapter(temp.path());
        let base = adapter.acquire_base_model().unwrap();
        let base_layers = base.network().layer_count();

        let adapted = adapter.adapt(base, FreezePolicy::FreezeAll, 3, 0.01).unwrap();
        let layers = adapted.network().layers();

        assert_eq!(layers.len(), base_layers + 2);
        assert!(layers[..base_layers].iter().all(|l| !l.trainable));
        assert!(layers[base_layers..].iter().all(|l| l.trainable));
        assert_eq!(layers[base_layers].name, HEAD_FLATTEN);
        assert_eq!(adapted.network().output_shape().unwrap(), vec![3]);
        assert!(adapted.network().is_compiled());
    }

    #[test]
    fn test_adapt_validates_arguments_before_state() {
        let temp = TempDir::new().unwrap();
        let mut adapter = adapter(temp.path());
        let base = adapter.acquire_base_model().unwrap();
        let err = adapter.adapt(base, FreezePolicy::FreezeAll, 1, 0.01).unwrap_err();
        assert!(matches!(err, TrainingError::InvalidArgument(_)));
        assert_eq!(adapter.state(), AdapterState::BaseAcquired);

        let base = adapter.acquire_base_model().unwrap();
        let err = adapter.adapt(base, FreezePolicy::FreezeAll, 2, -1.0).unwrap_err();
        assert!(matches!(err, TrainingError::InvalidArgument(_)));

        // A fresh adapter has no run; the bad argument is still what gets reported.
        let stale = adapter.acquire_base_model().unwrap();
        let mut other = ModelAdapter::new(
            Arc::new(MobileNetLite::default()),
            ModelConfig::new(InputShape::new(32, 32, 3), 2),
            temp.path().join("other.json"),
        );
        let err = other.adapt(stale, FreezePolicy::FreezeAll, 0, 0.01).unwrap_err();
        assert!(matches!(err, TrainingError::InvalidArgument(_)));
        assert_eq!(other.state(), AdapterState::Uninitialized);
    }

    #[test]
    fn test_acquire_rejects_invalid_config() {
        let temp = TempDir::new().unwrap();
        let config = ModelConfig::new(InputShape::new(32, 32, 3), 1);
        let mut adapter = ModelAdapter::new(Arc::new(MobileNetLite::default()), config, temp.path().join("base.json"));
        let err = adapter.acquire_base_model().unwrap_err();
        assert!(matches!(err, TrainingError::InvalidArgument(_)));
        assert!(!temp.path().join("base.json").exists());
    }

    #[test]
    fn test_adapted_head_starts_from_head_seed() {
        let temp = TempDir::new().unwrap();
        let mut first = adapter(temp.path()).with_head_seed(7);
        let base = first.acquire_base_model().unwrap();
        let a = first.adapt(base, FreezePolicy::FreezeAll, 2, 0.01).unwrap();

        let mut second = adapter(temp.path()).with_head_seed(7);
        let base = second.acquire_base_model().unwrap();
        let b = second.adapt(base, FreezePolicy::FreezeAll, 2, 0.01).unwrap();

        assert_eq!(a.network().weights_of(HEAD_DENSE).unwrap(), b.network().weights_of(HEAD_DENSE).unwrap());
        assert_eq!(a.network().name(), "mobilenet-lite_adapted");
    }

    #[test]
    fn test_persist_requires_adapted_state() {
        let temp = TempDir::new().unwrap();
        let mut adapter = adapter(temp.path());
        let base = adapter.acquire_base_model().unwrap();
        let adapted = adapter.adapt(base, FreezePolicy::FreezeNone, 2, 0.01).unwrap();

        let path = temp.path().join("nested").join("updated.json");
        adapter.persist(&adapted, &path).unwrap();
        assert_eq!(adapter.state(), AdapterState::Persisted);
        assert!(path.exists());

        adapter.acquire_base_model().unwrap();
        assert!(adapter.persist(&adapted, &path).is_err());
    }
}

//! Pipeline configuration.
//!
//! Loaded from a TOML file (`roost.toml` by default). Every field has a
//! default, so an empty file is a valid configuration. Artifact paths left
//! unset resolve under `[artifacts].root`.

use roost_models::{InputShape, ModelConfig};
use roost_training::{ArtifactLayout, FreezePolicy, TrainingParams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "roost.toml";

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// `[artifacts]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsSection {
    /// Root under which unset artifact paths resolve.
    pub root: PathBuf,
}

impl Default for ArtifactsSection {
    fn default() -> Self {
        Self { root: PathBuf::from("artifacts") }
    }
}

/// `[data_ingestion]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DataIngestionSection {
    /// Optional `.tar.gz` archive of class directories.
    pub source_archive: Option<PathBuf>,
    /// Directory the archive is unpacked into.
    pub root_dir: Option<PathBuf>,
    /// Directory holding one subdirectory per class.
    pub data_dir: Option<PathBuf>,
}

/// `[prepare_base_model]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepareBaseModelSection {
    /// Model provider name.
    pub provider: String,
    pub base_model_path: Option<PathBuf>,
    pub updated_base_model_path: Option<PathBuf>,
}

impl Default for PrepareBaseModelSection {
    fn default() -> Self {
        Self { provider: "mobilenet-lite".to_string(), base_model_path: None, updated_base_model_path: None }
    }
}

/// `[training]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrainingSection {
    pub trained_model_path: Option<PathBuf>,
    pub manifest_path: Option<PathBuf>,
}

/// `[evaluation]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSection {
    /// Model to score; defaults to the trained model.
    pub model_path: Option<PathBuf>,
    pub score_path: PathBuf,
}

impl Default for EvaluationSection {
    fn default() -> Self {
        Self { model_path: None, score_path: PathBuf::from("scores.json") }
    }
}

/// `[params]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// `[height, width, channels]`
    pub image_size: [usize; 3],
    pub batch_size: usize,
    pub include_top: bool,
    pub epochs: u32,
    pub classes: usize,
    /// `"imagenet"`, a model artifact path, or `"none"`.
    pub weights: String,
    pub learning_rate: f64,
    pub freeze_all: bool,
    pub freeze_till: Option<usize>,
    pub seed: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            image_size: [224, 224, 3],
            batch_size: 16,
            include_top: false,
            epochs: 1,
            classes: 2,
            weights: "imagenet".to_string(),
            learning_rate: 0.01,
            freeze_all: true,
            freeze_till: None,
            seed: 42,
        }
    }
}

impl Params {
    /// Weight source, with `"none"` and `""` meaning fresh initialization.
    #[must_use]
    pub fn weights_source(&self) -> Option<String> {
        match self.weights.trim() {
            "" | "none" => None,
            other => Some(other.to_string()),
        }
    }

    #[must_use]
    pub fn input_shape(&self) -> InputShape {
        InputShape::from(self.image_size)
    }
}

/// Whole-pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub artifacts: ArtifactsSection,
    pub data_ingestion: DataIngestionSection,
    pub prepare_base_model: PrepareBaseModelSection,
    pub training: TrainingSection,
    pub evaluation: EvaluationSection,
    pub params: Params,
}

/// Resolved settings for the data ingestion stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataIngestionConfig {
    pub source_archive: Option<PathBuf>,
    pub root_dir: PathBuf,
    pub data_dir: PathBuf,
}

/// Resolved settings for the prepare-base-model stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareBaseModelConfig {
    pub provider: String,
    pub base_model_path: PathBuf,
    pub updated_base_model_path: PathBuf,
    pub model: ModelConfig,
    pub freeze_policy: FreezePolicy,
    pub seed: u64,
}

/// Resolved settings for the training stage.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub adapted_model_path: PathBuf,
    pub trained_model_path: PathBuf,
    pub manifest_path: PathBuf,
    pub data_dir: PathBuf,
    pub params: TrainingParams,
}

/// Resolved settings for the evaluation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationConfig {
    pub model_path: PathBuf,
    pub data_dir: PathBuf,
    pub score_path: PathBuf,
    pub input_shape: InputShape,
    pub batch_size: usize,
    pub learning_rate: f64,
}

impl PipelineConfig {
    /// Loads configuration from a specific file.
    ///
    /// # Errors
    /// Returns `ConfigError` if file cannot be read, parsed, or validated.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as TOML, creating parent directories.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if any check fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.params;
        if p.classes < 2 {
            return Err(ConfigError::Validation(format!("params.classes must be >= 2, got {}", p.classes)));
        }
        if !p.learning_rate.is_finite() || p.learning_rate <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "params.learning_rate must be a positive number, got {}",
                p.learning_rate
            )));
        }
        if p.batch_size == 0 {
            return Err(ConfigError::Validation("params.batch_size must be >= 1".to_string()));
        }
        if p.epochs == 0 {
            return Err(ConfigError::Validation("params.epochs must be >= 1".to_string()));
        }
        let [height, width, channels] = p.image_size;
        if height == 0 || width == 0 {
            return Err(ConfigError::Validation("params.image_size height and width must be > 0".to_string()));
        }
        if channels != 1 && channels != 3 {
            return Err(ConfigError::Validation(format!(
                "params.image_size channels must be 1 or 3, got {channels}"
            )));
        }
        if p.freeze_all && p.freeze_till.is_some() {
            return Err(ConfigError::Validation(
                "params.freeze_all and params.freeze_till are mutually exclusive".to_string(),
            ));
        }
        if self.prepare_base_model.provider.trim().is_empty() {
            return Err(ConfigError::Validation("prepare_base_model.provider cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Default artifact layout under `[artifacts].root`.
    #[must_use]
    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(self.artifacts.root.clone())
    }

    fn data_dir(&self) -> PathBuf {
        self.data_ingestion
            .data_dir
            .clone()
            .unwrap_or_else(|| self.ingestion_root().join("images"))
    }

    fn ingestion_root(&self) -> PathBuf {
        self.data_ingestion.root_dir.clone().unwrap_or_else(|| self.layout().ingestion_dir())
    }

    fn updated_base_model_path(&self) -> PathBuf {
        self.prepare_base_model
            .updated_base_model_path
            .clone()
            .unwrap_or_else(|| self.layout().updated_base_model_path())
    }

    fn trained_model_path(&self) -> PathBuf {
        self.training.trained_model_path.clone().unwrap_or_else(|| self.layout().trained_model_path())
    }

    #[must_use]
    pub fn ingestion_config(&self) -> DataIngestionConfig {
        DataIngestionConfig {
            source_archive: self.data_ingestion.source_archive.clone(),
            root_dir: self.ingestion_root(),
            data_dir: self.data_dir(),
        }
    }

    #[must_use]
    pub fn prepare_base_model_config(&self) -> PrepareBaseModelConfig {
        let p = &self.params;
        let model = ModelConfig::new(p.input_shape(), p.classes)
            .with_weights(p.weights_source())
            .with_include_top(p.include_top)
            .with_learning_rate(p.learning_rate);
        PrepareBaseModelConfig {
            provider: self.prepare_base_model.provider.clone(),
            base_model_path: self
                .prepare_base_model
                .base_model_path
                .clone()
                .unwrap_or_else(|| self.layout().base_model_path()),
            updated_base_model_path: self.updated_base_model_path(),
            model,
            freeze_policy: FreezePolicy::from_flags(p.freeze_all, p.freeze_till),
            seed: p.seed,
        }
    }

    #[must_use]
    pub fn training_config(&self) -> TrainingConfig {
        let p = &self.params;
        TrainingConfig {
            adapted_model_path: self.updated_base_model_path(),
            trained_model_path: self.trained_model_path(),
            manifest_path: self
                .training
                .manifest_path
                .clone()
                .unwrap_or_else(|| self.layout().training_manifest_path()),
            data_dir: self.data_dir(),
            params: TrainingParams {
                input_shape: p.input_shape(),
                epochs: p.epochs,
                batch_size: p.batch_size,
                seed: p.seed,
            },
        }
    }

    #[must_use]
    pub fn evaluation_config(&self) -> EvaluationConfig {
        let p = &self.params;
        EvaluationConfig {
            model_path: self.evaluation.model_path.clone().unwrap_or_else(|| self.trained_model_path()),
            data_dir: self.data_dir(),
            score_path: self.evaluation.score_path.clone(),
            input_shape: p.input_shape(),
            batch_size: p.batch_size,
            learning_rate: p.learning_rate,
        }
    }
}

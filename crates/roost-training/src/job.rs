use crate::error::{TrainingError, TrainingResult};
use chrono::{DateTime, Utc};
use roost_models::InputShape;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Identifier for a training job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingJobId(pub String);

impl TrainingJobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TrainingJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrainingJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub input_shape: InputShape,
    pub epochs: u32,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self { input_shape: InputShape::new(224, 224, 3), epochs: 1, batch_size: 16, seed: 42 }
    }
}

impl TrainingParams {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.epochs == 0 {
            return Err(TrainingError::InvalidState("epochs must be >= 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidState("batch_size must be >= 1".to_string()));
        }
        if self.input_shape.height == 0 || self.input_shape.width == 0 {
            return Err(TrainingError::InvalidState("image size must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// One head-training run: where to read from, where to write to, and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingJob {
    pub job_id: TrainingJobId,
    pub created_at: DateTime<Utc>,
    pub adapted_model_path: PathBuf,
    pub trained_model_path: PathBuf,
    pub manifest_path: PathBuf,
    pub data_dir: PathBuf,
    pub params: TrainingParams,
}

impl TrainingJob {
    #[must_use]
    pub fn new(
        adapted_model_path: PathBuf,
        trained_model_path: PathBuf,
        manifest_path: PathBuf,
        data_dir: PathBuf,
        params: TrainingParams,
    ) -> Self {
        Self {
            job_id: TrainingJobId::new(),
            created_at: Utc::now(),
            adapted_model_path,
            trained_model_path,
            manifest_path,
            data_dir,
            params,
        }
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.adapted_model_path == self.trained_model_path {
            return Err(TrainingError::InvalidState(
                "trained model path must differ from the adapted model path".to_string(),
            ));
        }
        self.params.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_validate_rejects_zero_epochs() {
        let params = TrainingParams { epochs: 0, ..TrainingParams::default() };
        let job = TrainingJob::new(
            PathBuf::from("a.json"),
            PathBuf::from("b.json"),
            PathBuf::from("m.json"),
            PathBuf::from("data"),
            params,
        );
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_job_validate_rejects_same_paths() {
        let job = TrainingJob::new(
            PathBuf::from("a.json"),
            PathBuf::from("a.json"),
            PathBuf::from("m.json"),
            PathBuf::from("data"),
            TrainingParams::default(),
        );
        assert!(job.validate().is_err());
    }
}

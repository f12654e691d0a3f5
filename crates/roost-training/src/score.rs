use crate::error::TrainingResult;
use roost_models::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Validation score of a trained model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoreRecord {
    pub loss: f64,
    /// In `[0, 1]`.
    pub accuracy: f64,
}

impl ScoreRecord {
    /// Writes `{"loss": .., "accuracy": ..}`, replacing any previous record.
    pub fn save(&self, path: &Path) -> TrainingResult<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    pub fn read(path: &Path) -> TrainingResult<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_score_file_has_exactly_two_fields() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scores.json");
        ScoreRecord { loss: 0.5, accuracy: 0.75 }.save(&path).unwrap();
        ScoreRecord { loss: 0.25, accuracy: 1.0 }.save(&path).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["loss"], 0.25);
        assert_eq!(ScoreRecord::read(&path).unwrap().accuracy, 1.0);
    }
}

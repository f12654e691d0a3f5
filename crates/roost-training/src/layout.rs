use std::path::{Path, PathBuf};

/// Filesystem layout for pipeline artifacts.
///
/// Default layout is `<root>/{data_ingestion,prepare_base_model,training}/...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn ingestion_dir(&self) -> PathBuf {
        self.root.join("data_ingestion")
    }

    #[must_use]
    pub fn prepare_base_model_dir(&self) -> PathBuf {
        self.root.join("prepare_base_model")
    }

    #[must_use]
    pub fn base_model_path(&self) -> PathBuf {
        self.prepare_base_model_dir().join("base_model.json")
    }

    #[must_use]
    pub fn updated_base_model_path(&self) -> PathBuf {
        self.prepare_base_model_dir().join("base_model_updated.json")
    }

    #[must_use]
    pub fn training_dir(&self) -> PathBuf {
        self.root.join("training")
    }

    #[must_use]
    pub fn trained_model_path(&self) -> PathBuf {
        self.training_dir().join("model.json")
    }

    #[must_use]
    pub fn training_manifest_path(&self) -> PathBuf {
        self.training_dir().join("training_manifest.json")
    }
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self::new(PathBuf::from("artifacts"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let temp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(temp.path().to_path_buf());

        assert!(layout.base_model_path().ends_with("prepare_base_model/base_model.json"));
        assert!(layout.updated_base_model_path().ends_with("prepare_base_model/base_model_updated.json"));
        assert!(layout.trained_model_path().ends_with("training/model.json"));
        assert!(layout.training_manifest_path().starts_with(temp.path()));
    }
}

//! Model artifact persistence.
//!
//! An artifact is one JSON record written by burn's `PrettyJsonFileRecorder`.
//! It holds the network weights plus a header with the layer list and,
//! optionally, the compile spec. Writes go to a temp file in the target
//! directory and are renamed into place, so readers never observe a
//! partially written artifact.

use crate::compile::CompileSpec;
use crate::config::InputShape;
use crate::error::{ModelError, ModelResult};
use crate::layer::Layer;
use crate::network::{Network, WeightsRecord};
use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, PrettyJsonFileRecorder, Record, Recorder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Current artifact format version.
pub const FORMAT_VERSION: u32 = 1;

/// File extension of model artifacts.
pub const ARTIFACT_EXTENSION: &str = "json";

type ArtifactRecorder = PrettyJsonFileRecorder<FullPrecisionSettings>;

#[derive(Serialize, Deserialize)]
struct ArtifactHeader {
    format_version: u32,
    created_at: DateTime<Utc>,
    name: String,
    input_shape: InputShape,
    layers: Vec<Layer>,
    #[serde(default)]
    compile: Option<CompileSpec>,
}

#[derive(Record)]
struct ArtifactRecord<B: Backend> {
    header: String,
    weights: WeightsRecord<B>,
}

/// What to restore besides the network itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadOptions {
    /// Restore the compile spec.
    pub compile: bool,
}

impl LoadOptions {
    /// Weights and structure only.
    #[must_use]
    pub const fn weights_only() -> Self {
        Self { compile: false }
    }

    /// Weights and compile spec (for resuming training).
    #[must_use]
    pub const fn with_compile() -> Self {
        Self { compile: true }
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn check_extension(path: &Path) -> ModelResult<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(ARTIFACT_EXTENSION) => Ok(()),
        _ => Err(ModelError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Writes `bytes` to `path` via a same-directory temp file and rename.
///
/// Parent directories are created first.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = parent_dir(path);
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Persists `network` (with its compile spec, if any) to `path`.
///
/// The path must end in `.json`.
pub fn save_model<B: Backend>(network: &Network<B>, path: &Path) -> ModelResult<()> {
    check_extension(path)?;
    let header = ArtifactHeader {
        format_version: FORMAT_VERSION,
        created_at: Utc::now(),
        name: network.name().to_string(),
        input_shape: network.input_shape(),
        layers: network.layers().to_vec(),
        compile: network.compile_spec().cloned(),
    };
    let record = ArtifactRecord::<B> {
        header: serde_json::to_string(&header)?,
        weights: network.weights().clone().into_record(),
    };

    let parent = parent_dir(path);
    std::fs::create_dir_all(parent)?;
    let tmp = tempfile::Builder::new()
        .prefix(".model-")
        .suffix(&format!(".{ARTIFACT_EXTENSION}"))
        .tempfile_in(parent)?
        .into_temp_path();

    <ArtifactRecorder as Recorder<B>>::record(&ArtifactRecorder::new(), record, tmp.to_path_buf())
        .map_err(|e| ModelError::Record { path: path.to_path_buf(), reason: e.to_string() })?;
    tmp.persist(path).map_err(|e| e.error)?;

    debug!(path = %path.display(), layers = network.layer_count(), "Saved model artifact");
    Ok(())
}

/// Loads a network from `path` onto the backend's default device.
///
/// A missing file is `ArtifactNotFound`; undecodable content, an unknown
/// format version or weights that do not fit the layer list is
/// `MalformedArtifact`.
pub fn load_model<B: Backend>(path: &Path, options: LoadOptions) -> ModelResult<Network<B>> {
    if !path.is_file() {
        return Err(ModelError::ArtifactNotFound(path.to_path_buf()));
    }
    check_extension(path)?;

    let malformed = |reason: String| ModelError::MalformedArtifact { path: path.to_path_buf(), reason };
    let device = B::Device::default();

    let record: ArtifactRecord<B> =
        <ArtifactRecorder as Recorder<B>>::load(&ArtifactRecorder::new(), path.to_path_buf(), &device)
            .map_err(|e| malformed(e.to_string()))?;
    let header: ArtifactHeader = serde_json::from_str(&record.header).map_err(|e| malformed(e.to_string()))?;
    if header.format_version != FORMAT_VERSION {
        return Err(malformed(format!(
            "unsupported format version {} (expected {FORMAT_VERSION})",
            header.format_version
        )));
    }

    let mut network = Network::skeleton(header.name, header.input_shape, header.layers, &device)
        .map_err(|e| malformed(e.to_string()))?
        .load_weights(record.weights);
    network.check_weights().map_err(|e| malformed(e.to_string()))?;
    if options.compile
        && let Some(spec) = header.compile
    {
        network.compile(spec);
    }

    debug!(path = %path.display(), layers = network.layer_count(), compiled = network.is_compiled(), "Loaded model artifact");
    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RoostBackend, RoostDevice};
    use crate::layer::Activation;
    use crate::network::LayerWeights;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::TempDir;

    fn tiny() -> Network {
        let shape = InputShape::new(2, 2, 1);
        Network::new(
            "tiny",
            shape,
            vec![
                Layer::input("input", shape),
                Layer::flatten("flatten"),
                Layer::dense("dense", 4, 3, Activation::Softmax),
            ],
            &mut StdRng::seed_from_u64(3),
            &RoostDevice::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_save_creates_parent_dirs_and_loads_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("dir").join("model.json");
        let mut net = tiny();
        net.compile(CompileSpec::sparse_classification(0.01));

        save_model(&net, &path).unwrap();

        let plain: Network = load_model(&path, LoadOptions::weights_only()).unwrap();
        assert!(!plain.is_compiled());
        assert_eq!(plain.layers(), net.layers());
        assert_eq!(plain.output_shape().unwrap(), vec![3]);
        assert_eq!(plain.weights_of("dense").unwrap(), net.weights_of("dense").unwrap());

        let resumed: Network = load_model(&path, LoadOptions::with_compile()).unwrap();
        assert_eq!(resumed.compile_spec(), net.compile_spec());
    }

    #[test]
    fn test_missing_artifact() {
        let temp = TempDir::new().unwrap();
        let err = load_model::<RoostBackend>(&temp.path().join("absent.json"), LoadOptions::default()).unwrap_err();
        assert!(matches!(err, ModelError::ArtifactNotFound(_)));
    }

    #[test]
    fn test_malformed_artifact() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        std::fs::write(&path, b"{\"format_version\": 1, \"network\": 42}").unwrap();
        let err = load_model::<RoostBackend>(&path, LoadOptions::default()).unwrap_err();
        assert!(matches!(err, ModelError::MalformedArtifact { .. }));
    }

    #[test]
    fn test_rejects_other_extensions() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model.bin");
        assert!(matches!(save_model(&tiny(), &path), Err(ModelError::UnsupportedFormat(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model.json");
        save_model(&tiny(), &path).unwrap();

        let mut changed = tiny();
        let weights = LayerWeights { kernel: vec![0.5; 12], bias: vec![0.0; 3] };
        changed.set_weights("dense", weights.clone()).unwrap();
        save_model(&changed, &path).unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let loaded: Network = load_model(&path, LoadOptions::default()).unwrap();
        assert_eq!(loaded.weights_of("dense").unwrap(), weights);
    }
}

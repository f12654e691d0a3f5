//! Data ingestion: unpack the raw archive and check the class layout.

use crate::config::DataIngestionConfig;
use crate::error::{PipelineError, PipelineResult};
use flate2::read::GzDecoder;
use roost_training::{TrainingError, list_classes};
use std::fs::{self, File};
use std::path::Path;
use tracing::{info, warn};

/// What ingestion found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionSummary {
    /// Class name and image count, in label order.
    pub classes: Vec<(String, usize)>,
    /// Whether an archive was unpacked on this run.
    pub unpacked: bool,
}

impl IngestionSummary {
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.classes.iter().map(|(_, n)| n).sum()
    }
}

fn is_non_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_some())
}

fn unpack(archive: &Path, into: &Path) -> PipelineResult<()> {
    let file = File::open(archive).map_err(|e| {
        PipelineError::Ingestion(format!("cannot open archive {}: {e}", archive.display()))
    })?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.unpack(into).map_err(|e| {
        PipelineError::Ingestion(format!(
            "cannot unpack {} into {}: {e}",
            archive.display(),
            into.display()
        ))
    })?;
    Ok(())
}

/// Unpacks the configured archive (unless the data directory is already
/// populated) and verifies at least one class directory holds images.
pub fn ingest(config: &DataIngestionConfig) -> PipelineResult<IngestionSummary> {
    fs::create_dir_all(&config.root_dir)?;

    let mut unpacked = false;
    if is_non_empty_dir(&config.data_dir) {
        info!(data_dir = %config.data_dir.display(), "Data directory already populated, skipping unpack");
    } else if let Some(archive) = &config.source_archive {
        unpack(archive, &config.root_dir)?;
        unpacked = true;
        info!(archive = %archive.display(), into = %config.root_dir.display(), "Unpacked data archive");
    } else {
        warn!("No source archive configured; expecting images to be in place");
    }

    let classes: Vec<(String, usize)> = list_classes(&config.data_dir)?
        .into_iter()
        .map(|(name, files)| (name, files.len()))
        .collect();
    if !classes.iter().any(|(_, n)| *n > 0) {
        return Err(TrainingError::Dataset(format!(
            "no class directories with images under {}",
            config.data_dir.display()
        ))
        .into());
    }

    let summary = IngestionSummary { classes, unpacked };
    info!(
        data_dir = %config.data_dir.display(),
        classes = summary.classes.len(),
        images = summary.image_count(),
        "Training data ready"
    );
    Ok(summary)
}

//! Labelled image directories as lazy, restartable batch streams.
//!
//! A data directory holds one subdirectory per class; class indices follow
//! the sorted subdirectory names. Within each class the files are sorted by
//! name and the first `floor(validation_split * n)` form the validation
//! subset, the rest the training subset.

use crate::error::{TrainingError, TrainingResult};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Pixel};
use ndarray::{Array1, Array4};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use roost_models::{InputShape, LabelMode, Labels, ModelError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

pub const DEFAULT_RESCALE: f32 = 1.0 / 255.0;
pub const DEFAULT_VALIDATION_SPLIT: f64 = 0.30;
pub const DEFAULT_TARGET_SIZE: (usize, usize) = (224, 224);
pub const DEFAULT_CHANNELS: usize = 3;
pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_SEED: u64 = 42;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff"];

/// Resampling filter used when resizing to the target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
}

impl Interpolation {
    const fn filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
        }
    }
}

/// Which side of the validation split a stream reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subset {
    Training,
    Validation,
}

/// Options for [`DataStream::open`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStreamConfig {
    /// Multiplier applied to raw `u8` pixel values.
    pub rescale: f32,
    /// Fraction of each class reserved for validation, in `[0, 1)`.
    pub validation_split: f64,
    /// Output `(height, width)`.
    pub target_size: (usize, usize),
    /// 1 (greyscale) or 3 (RGB).
    pub channels: usize,
    pub batch_size: usize,
    pub interpolation: Interpolation,
    pub shuffle: bool,
    pub seed: u64,
    pub label_mode: LabelMode,
    pub subset: Subset,
}

impl Default for DataStreamConfig {
    fn default() -> Self {
        Self {
            rescale: DEFAULT_RESCALE,
            validation_split: DEFAULT_VALIDATION_SPLIT,
            target_size: DEFAULT_TARGET_SIZE,
            channels: DEFAULT_CHANNELS,
            batch_size: DEFAULT_BATCH_SIZE,
            interpolation: Interpolation::Bilinear,
            shuffle: false,
            seed: DEFAULT_SEED,
            label_mode: LabelMode::Sparse,
            subset: Subset::Validation,
        }
    }
}

impl DataStreamConfig {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.batch_size == 0 {
            return Err(TrainingError::Dataset("batch_size must be > 0".to_string()));
        }
        if self.target_size.0 == 0 || self.target_size.1 == 0 {
            return Err(TrainingError::Dataset("target size must be non-zero".to_string()));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(TrainingError::Dataset(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        if self.channels != 1 && self.channels != 3 {
            return Err(TrainingError::Dataset(format!(
                "channels must be 1 or 3, got {}",
                self.channels
            )));
        }
        Ok(())
    }
}

/// One labelled image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    pub label: usize,
}

/// A decoded batch, images laid out `[batch, h, w, c]`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Array4<f32>,
    pub labels: Labels,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Lists class directories (sorted) and their image files (sorted).
pub fn list_classes(data_dir: &Path) -> TrainingResult<Vec<(String, Vec<PathBuf>)>> {
    if !data_dir.is_dir() {
        return Err(TrainingError::Dataset(format!(
            "data directory {} does not exist",
            data_dir.display()
        )));
    }

    let walk_err = |e: walkdir::Error| TrainingError::Dataset(e.to_string());
    let mut classes = Vec::new();
    for entry in WalkDir::new(data_dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(walk_err)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let mut files = Vec::new();
        for file in WalkDir::new(entry.path()).min_depth(1).sort_by_file_name() {
            let file = file.map_err(walk_err)?;
            if file.file_type().is_file() && is_image(file.path()) {
                files.push(file.into_path());
            }
        }
        classes.push((entry.file_name().to_string_lossy().into_owned(), files));
    }
    Ok(classes)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// A finite stream of batches over one subset of a data directory.
///
/// Images are decoded only when their batch is produced. Every call to
/// [`DataStream::iter`] starts over from the first batch.
#[derive(Debug, Clone)]
pub struct DataStream {
    config: DataStreamConfig,
    class_names: Vec<String>,
    samples: Vec<Sample>,
}

impl DataStream {
    pub fn open(data_dir: &Path, config: DataStreamConfig) -> TrainingResult<Self> {
        config.validate()?;

        let classes = list_classes(data_dir)?;
        let mut class_names = Vec::with_capacity(classes.len());
        let mut samples = Vec::new();
        for (label, (name, files)) in classes.into_iter().enumerate() {
            let split_at = (files.len() as f64 * config.validation_split).floor() as usize;
            let subset = match config.subset {
                Subset::Validation => &files[..split_at],
                Subset::Training => &files[split_at..],
            };
            samples.extend(subset.iter().map(|path| Sample { path: path.clone(), label }));
            class_names.push(name);
        }

        info!(
            data_dir = %data_dir.display(),
            subset = ?config.subset,
            "Found {} images belonging to {} classes.",
            samples.len(),
            class_names.len()
        );
        Ok(Self { config, class_names, samples })
    }

    #[must_use]
    pub const fn config(&self) -> &DataStreamConfig {
        &self.config
    }

    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.samples.len().div_ceil(self.config.batch_size)
    }

    #[must_use]
    pub const fn label_mode(&self) -> LabelMode {
        self.config.label_mode
    }

    /// Batches in stream order (shuffled with the configured seed when enabled).
    #[must_use]
    pub fn iter(&self) -> Batches<'_> {
        self.iter_epoch(0)
    }

    /// Like [`DataStream::iter`], but shuffles with a per-epoch seed.
    #[must_use]
    pub fn iter_epoch(&self, epoch: u64) -> Batches<'_> {
        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        if self.config.shuffle {
            let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(epoch));
            order.shuffle(&mut rng);
        }
        Batches { stream: self, order, cursor: 0 }
    }

    fn load_batch(&self, indices: &[usize]) -> TrainingResult<Batch> {
        let (h, w) = self.config.target_size;
        let c = self.config.channels;
        let mut pixels = Vec::with_capacity(indices.len() * h * w * c);
        let mut labels = Vec::with_capacity(indices.len());

        for &index in indices {
            let sample = &self.samples[index];
            self.decode_into(&sample.path, &mut pixels)?;
            labels.push(sample.label);
        }

        let images = Array4::from_shape_vec((indices.len(), h, w, c), pixels).map_err(ModelError::from)?;
        let sparse = Labels::Sparse(Array1::from(labels));
        let labels = match self.config.label_mode {
            LabelMode::Sparse => sparse,
            LabelMode::Categorical => Labels::OneHot(sparse.to_one_hot(self.class_names.len())?),
        };
        debug!(samples = indices.len(), "Decoded batch");
        Ok(Batch { images, labels })
    }

    fn decode_into(&self, path: &Path, out: &mut Vec<f32>) -> TrainingResult<()> {
        let img = image::open(path).map_err(|source| TrainingError::Image { path: path.to_path_buf(), source })?;
        let (h, w) = self.config.target_size;
        let size = (w as u32, h as u32);
        let filter = self.config.interpolation.filter();

        let raw = match self.config.channels {
            1 => resized(img.to_luma8(), size, filter).into_raw(),
            3 => resized(img.to_rgb8(), size, filter).into_raw(),
            other => {
                return Err(TrainingError::Dataset(format!("unsupported channel count {other}")));
            }
        };
        let rescale = self.config.rescale;
        out.extend(raw.into_iter().map(|p| f32::from(p) * rescale));
        Ok(())
    }
}

fn resized<P>(buf: ImageBuffer<P, Vec<u8>>, (width, height): (u32, u32), filter: FilterType) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    if buf.dimensions() == (width, height) {
        buf
    } else {
        imageops::resize(&buf, width, height, filter)
    }
}

/// Iterator over a stream's batches.
pub struct Batches<'a> {
    stream: &'a DataStream,
    order: Vec<usize>,
    cursor: usize,
}

impl Iterator for Batches<'_> {
    type Item = TrainingResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.stream.config.batch_size).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        self.cursor = end;
        Some(self.stream.load_batch(indices))
    }
}

/// Held-out validation stream: sparse labels, no shuffling, bilinear
/// resize to the height and width of `input_shape`, decoded to its channel
/// count, pixels in `[0, 1]`.
pub fn build_validation_stream(
    data_dir: &Path,
    input_shape: InputShape,
    batch_size: usize,
) -> TrainingResult<DataStream> {
    let config = DataStreamConfig {
        target_size: input_shape.spatial(),
        channels: input_shape.channels,
        batch_size,
        subset: Subset::Validation,
        ..DataStreamConfig::default()
    };
    DataStream::open(data_dir, config)
}

/// Training stream: the complement of the validation subset, shuffled with `seed`.
pub fn build_training_stream(
    data_dir: &Path,
    input_shape: InputShape,
    batch_size: usize,
    seed: u64,
) -> TrainingResult<DataStream> {
    let config = DataStreamConfig {
        target_size: input_shape.spatial(),
        channels: input_shape.channels,
        batch_size,
        shuffle: true,
        seed,
        subset: Subset::Training,
        ..DataStreamConfig::default()
    };
    DataStream::open(data_dir, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_images(root: &Path, class: &str, count: usize, value: u8) {
        let dir = root.join(class);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            RgbImage::from_pixel(12, 10, Rgb([value, value, value]))
                .save(dir.join(format!("img_{i:03}.png")))
                .unwrap();
        }
    }

    #[test]
    fn test_split_takes_leading_files_per_class() {
        let temp = TempDir::new().unwrap();
        write_images(temp.path(), "cat", 10, 0);
        write_images(temp.path(), "dog", 7, 255);
        std::fs::write(temp.path().join("dog").join("notes.txt"), "skip").unwrap();

        let validation = build_validation_stream(temp.path(), InputShape::new(8, 8, 3), 4).unwrap();
        assert_eq!(validation.class_names(), &["cat".to_string(), "dog".to_string()]);
        assert_eq!(validation.len(), 3 + 2);
        assert!(validation.samples()[0].path.ends_with("cat/img_000.png"));
        assert!(validation.samples()[3].path.ends_with("dog/img_000.png"));

        let training = build_training_stream(temp.path(), InputShape::new(8, 8, 3), 4, 1).unwrap();
        assert_eq!(training.len(), 7 + 5);
    }

    #[test]
    fn test_batches_are_resized_and_rescaled() {
        let temp = TempDir::new().unwrap();
        write_images(temp.path(), "a", 10, 255);
        write_images(temp.path(), "b", 10, 0);

        let stream = build_validation_stream(temp.path(), InputShape::new(8, 6, 3), 4).unwrap();
        assert_eq!(stream.batch_count(), 2);

        let batches: Vec<Batch> = stream.iter().collect::<TrainingResult<_>>().unwrap();
        assert_eq!(batches[0].images.dim(), (4, 8, 6, 3));
        assert_eq!(batches[1].len(), 2);
        assert!(batches[0].images.iter().all(|&p| (0.0..=1.0 + 1e-6).contains(&p)));
        assert_eq!(batches[0].labels, Labels::Sparse(Array1::from(vec![0, 0, 0, 1])));
        assert_abs_diff_eq!(batches[0].images[[0, 0, 0, 0]], 1.0, epsilon = 1e-2);
        for &p in &batches[1].images {
            assert_abs_diff_eq!(p, 0.0, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_single_channel_streams_decode_grey() {
        let temp = TempDir::new().unwrap();
        for (class, value) in [("dark", 0u8), ("light", 255u8)] {
            let dir = temp.path().join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..5 {
                GrayImage::from_pixel(9, 9, Luma([value])).save(dir.join(format!("img_{i}.png"))).unwrap();
            }
        }

        let stream = build_validation_stream(temp.path(), InputShape::new(6, 6, 1), 4).unwrap();
        let batch = stream.iter().next().unwrap().unwrap();
        assert_eq!(batch.images.dim(), (2, 6, 6, 1));
        assert_abs_diff_eq!(batch.images[[0, 3, 3, 0]], 0.0, epsilon = 1e-2);
        assert_abs_diff_eq!(batch.images[[1, 3, 3, 0]], 1.0, epsilon = 1e-2);

        let training = build_training_stream(temp.path(), InputShape::new(6, 6, 1), 4, 7).unwrap();
        let batch = training.iter().next().unwrap().unwrap();
        assert_eq!(batch.images.dim().3, 1);
    }

    #[test]
    fn test_iter_restarts() {
        let temp = TempDir::new().unwrap();
        write_images(temp.path(), "a", 10, 10);
        let stream = build_validation_stream(temp.path(), InputShape::new(4, 4, 3), 2).unwrap();

        let first: Vec<_> = stream.iter().map(|b| b.unwrap().labels).collect();
        let second: Vec<_> = stream.iter().map(|b| b.unwrap().labels).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_categorical_labels() {
        let temp = TempDir::new().unwrap();
        write_images(temp.path(), "a", 4, 10);
        write_images(temp.path(), "b", 4, 10);
        let config = DataStreamConfig {
            target_size: (4, 4),
            batch_size: 8,
            validation_split: 0.5,
            label_mode: LabelMode::Categorical,
            ..DataStreamConfig::default()
        };
        let stream = DataStream::open(temp.path(), config).unwrap();
        let batch = stream.iter().next().unwrap().unwrap();
        assert!(matches!(batch.labels, Labels::OneHot(ref l) if l.dim() == (4, 2)));
    }

    #[test]
    fn test_invalid_inputs() {
        let temp = TempDir::new().unwrap();
        assert!(build_validation_stream(&temp.path().join("missing"), InputShape::new(4, 4, 3), 2).is_err());
        assert!(build_validation_stream(temp.path(), InputShape::new(4, 4, 3), 0).is_err());

        let empty = build_validation_stream(temp.path(), InputShape::new(4, 4, 3), 2).unwrap();
        assert!(empty.is_empty());
        assert!(empty.iter().next().is_none());
    }

    #[test]
    fn test_undecodable_image_is_reported() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("a");
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..4 {
            std::fs::write(dir.join(format!("bad_{i}.png")), b"not a png").unwrap();
        }
        let stream = build_validation_stream(temp.path(), InputShape::new(4, 4, 3), 2).unwrap();
        let err = stream.iter().next().unwrap().unwrap_err();
        assert!(matches!(err, TrainingError::Image { .. }));
    }
}

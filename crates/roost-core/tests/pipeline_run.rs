use image::{GrayImage, Luma, Rgb, RgbImage};
use roost_core::{PipelineConfig, PipelineError, StageKind, run_pipeline, run_single_stage};
use roost_orchestrator::{RecordingObserver, StageEvent, completed_marker, started_marker};
use roost_training::{ScoreRecord, TrainingError, TrainingManifest};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_dataset(root: &Path, per_class: usize) {
    for (class, base) in [("healthy", [30u8, 180, 60]), ("sick", [160u8, 90, 20])] {
        let dir = root.join(class);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            let img = RgbImage::from_fn(32, 32, |x, y| {
                let shade = ((x * 3 + y + i as u32) % 24) as u8;
                Rgb([base[0].saturating_add(shade), base[1], base[2]])
            });
            img.save(dir.join(format!("{class}_{i:02}.png"))).unwrap();
        }
    }
}

fn write_grey_dataset(root: &Path, per_class: usize) {
    for (class, base) in [("dark", 40u8), ("light", 200u8)] {
        let dir = root.join(class);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            let img = GrayImage::from_fn(32, 32, |x, y| Luma([base.saturating_add(((x + y + i as u32) % 16) as u8)]));
            img.save(dir.join(format!("{class}_{i:02}.png"))).unwrap();
        }
    }
}

fn config_for(temp: &TempDir) -> PipelineConfig {
    config_with_params(temp, "image_size = [32, 32, 3]")
}

fn config_with_params(temp: &TempDir, params: &str) -> PipelineConfig {
    let root = temp.path().display().to_string();
    let toml = format!(
        r#"
        [artifacts]
        root = '{root}/artifacts'

        [data_ingestion]
        root_dir = '{root}/ingest'
        data_dir = '{root}/ingest/images'

        [evaluation]
        score_path = '{root}/scores.json'

        [params]
        {params}
        batch_size = 4
        epochs = 2
        classes = 2
        "#
    );
    PipelineConfig::from_toml_str(&toml).unwrap()
}

#[test]
fn full_pipeline_writes_score_and_markers() {
    let temp = TempDir::new().unwrap();
    let config = config_for(&temp);
    write_dataset(&config.ingestion_config().data_dir, 10);

    let observer = Arc::new(RecordingObserver::new());
    let report = run_pipeline(&config, observer.clone()).unwrap();
    assert_eq!(report.stages.len(), 4);

    let expected: Vec<String> = StageKind::ALL
        .iter()
        .flat_map(|k| [started_marker(k.name()), completed_marker(k.name())])
        .collect();
    assert_eq!(observer.markers(), expected);

    let layout = config.layout();
    assert!(layout.base_model_path().exists());
    assert!(layout.updated_base_model_path().exists());
    assert!(layout.trained_model_path().exists());

    let manifest = TrainingManifest::read(&layout.training_manifest_path()).unwrap();
    assert_eq!(manifest.metrics.epochs, 2);
    assert_eq!(manifest.metrics.samples, 14);

    let score = ScoreRecord::read(&temp.path().join("scores.json")).unwrap();
    assert!(score.loss.is_finite() && score.loss >= 0.0);
    assert!((0.0..=1.0).contains(&score.accuracy));
}

#[test]
fn missing_data_stops_the_run_at_ingestion() {
    let temp = TempDir::new().unwrap();
    let config = config_for(&temp);

    let observer = Arc::new(RecordingObserver::new());
    let err = run_pipeline(&config, observer.clone()).unwrap_err();
    assert!(matches!(err, PipelineError::Training(TrainingError::Dataset(_))));

    let name = StageKind::DataIngestion.name();
    assert_eq!(observer.markers(), vec![started_marker(name)]);
    let skipped = observer
        .events()
        .iter()
        .filter(|e| matches!(e, StageEvent::Skipped { .. }))
        .count();
    assert_eq!(skipped, 3);
    assert!(!config.layout().base_model_path().exists());
    assert!(!temp.path().join("scores.json").exists());
}

#[test]
fn single_stage_reports_its_own_markers() {
    let temp = TempDir::new().unwrap();
    let config = config_for(&temp);

    let observer = Arc::new(RecordingObserver::new());
    let report = run_single_stage(&config, StageKind::PrepareBaseModel, observer.clone()).unwrap();
    assert_eq!(report.name, StageKind::PrepareBaseModel.name());

    let name = StageKind::PrepareBaseModel.name();
    assert_eq!(observer.markers(), vec![started_marker(name), completed_marker(name)]);
    assert!(config.layout().updated_base_model_path().exists());
}

#[test]
fn evaluation_without_trained_model_fails() {
    let temp = TempDir::new().unwrap();
    let config = config_for(&temp);
    write_dataset(&config.ingestion_config().data_dir, 10);

    let observer = Arc::new(RecordingObserver::new());
    let err = run_single_stage(&config, StageKind::Evaluation, observer).unwrap_err();
    assert!(matches!(err, PipelineError::Training(TrainingError::ArtifactNotFound { .. })));
}

#[test]
fn single_channel_pipeline_evaluates_grey_images() {
    let temp = TempDir::new().unwrap();
    let config = config_with_params(&temp, "image_size = [32, 32, 1]\n        weights = 'none'");
    write_grey_dataset(&config.ingestion_config().data_dir, 10);

    let observer = Arc::new(RecordingObserver::new());
    let report = run_pipeline(&config, observer).unwrap();
    assert_eq!(report.stages.len(), 4);

    let manifest = TrainingManifest::read(&config.layout().training_manifest_path()).unwrap();
    assert_eq!(manifest.params.input_shape.channels, 1);

    let score = ScoreRecord::read(&temp.path().join("scores.json")).unwrap();
    assert!(score.loss.is_finite() && score.loss >= 0.0);
    assert!((0.0..=1.0).contains(&score.accuracy));
}

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use common::buffer2::Buffer2;

use super::*;
use crate::config::GridFormat;
use crate::error::{Error, ImageError, OutputError};
use crate::lighting::LightingMode;
use crate::segmentation::HistogramReport;
use crate::testing::{PlateConfig, init_tracing, synthetic_plate};
use crate::work_claim::MarkerFileClaim;

/// Serves decoded plates from memory and records every load.
#[derive(Default)]
struct MemorySource {
    images: HashMap<PathBuf, Buffer2<f32>>,
    loads: RefCell<Vec<PathBuf>>,
}

impl MemorySource {
    fn insert(&mut self, path: PathBuf, pixels: Buffer2<f32>) {
        std::fs::write(&path, b"").unwrap();
        self.images.insert(path, pixels);
    }
}

impl ImageSource for MemorySource {
    fn load(&self, path: &Path) -> std::result::Result<PlateImage, ImageError> {
        self.loads.borrow_mut().push(path.to_path_buf());
        self.images
            .get(path)
            .map(|pixels| PlateImage::from_intensity(path, pixels.clone()))
            .ok_or_else(|| ImageError::Empty {
                path: path.to_path_buf(),
            })
    }
}

#[derive(Default)]
struct CountingSink {
    overlays: Cell<usize>,
    histograms: Cell<usize>,
}

impl DiagnosticsSink for CountingSink {
    fn overlay(
        &self,
        _layout: &OutputLayout,
        _image: &ImageRecord,
        _overlay: &Overlay<'_>,
    ) -> std::result::Result<(), OutputError> {
        self.overlays.set(self.overlays.get() + 1);
        Ok(())
    }

    fn histogram(
        &self,
        _layout: &OutputLayout,
        _earliest: &ImageRecord,
        _report: &HistogramReport,
    ) -> std::result::Result<(), OutputError> {
        self.histograms.set(self.histograms.get() + 1);
        Ok(())
    }
}

fn image_path(dir: &Path, barcode: &str, day: u32) -> PathBuf {
    dir.join(format!("{barcode}_2014-03-{day:02}_10-00-00.png"))
}

/// Plate `barcode` imaged on days `1..=days`, colonies growing each day.
fn add_plate(source: &mut MemorySource, dir: &Path, barcode: &str, days: u32) -> BarcodeBatch {
    let base = PlateConfig {
        colony_radius: 5.0,
        ..Default::default()
    };
    let mut images: Vec<ImageRecord> = (1..=days)
        .map(|day| {
            let path = image_path(dir, barcode, day);
            let plate = base.grown(1.0 + 0.1 * (day - 1) as f32);
            source.insert(path.clone(), synthetic_plate(&plate));
            ImageRecord::new(path)
        })
        .collect();
    images.reverse();
    BarcodeBatch::new(barcode, images)
}

fn fixed_config(dir: &Path) -> RunConfig {
    RunConfig {
        fixed_threshold: Some(0.45),
        ..RunConfig::for_directory(dir, GridFormat::new(4, 6))
    }
}

fn read_areas(path: &Path) -> Vec<u64> {
    let text = std::fs::read_to_string(path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    json["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["area"].as_u64().unwrap())
        .collect()
}

#[test]
fn test_identical_images_give_identical_masks_without_overlays() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut source = MemorySource::default();
    let plate = synthetic_plate(&PlateConfig::default());
    let mut images = Vec::new();
    for day in [3, 2, 1] {
        let path = image_path(dir.path(), "K001", day);
        source.insert(path.clone(), plate.clone());
        images.push(ImageRecord::new(path));
    }
    let batch = BarcodeBatch::new("K001", images);

    let config = fixed_config(dir.path());
    let sink = CountingSink::default();
    let pipeline = Pipeline::new(&config, &MarkerFileClaim, &source, &sink);

    let outcome = pipeline.process_batch(&batch).unwrap();
    assert_eq!(outcome, BatchOutcome::Processed { images: 3 });
    assert_eq!(sink.overlays.get(), 0);
    assert_eq!(sink.histograms.get(), 0);

    let layout = OutputLayout::for_image(batch.earliest());
    let areas: Vec<Vec<u64>> = batch
        .images
        .iter()
        .map(|image| read_areas(&layout.companion_path(image)))
        .collect();
    assert_eq!(areas[0].len(), 24);
    assert!(areas[0].iter().all(|&a| a > 0));
    assert_eq!(areas[0], areas[1]);
    assert_eq!(areas[1], areas[2]);
}

#[test]
fn test_series_rows_follow_image_then_cell_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = MemorySource::default();
    let batch = add_plate(&mut source, dir.path(), "K001", 3);

    let config = fixed_config(dir.path());
    let sink = CountingSink::default();
    let pipeline = Pipeline::new(&config, &MarkerFileClaim, &source, &sink);
    pipeline.process_batch(&batch).unwrap();

    let layout = OutputLayout::for_image(batch.earliest());
    let series = std::fs::read_to_string(layout.series_path("K001")).unwrap();
    let lines: Vec<&str> = series.lines().collect();
    assert_eq!(lines.len(), 1 + 3 * 24);
    assert!(lines[0].starts_with("Barcode\tImage\tRow\tColumn"));

    for (i, image) in batch.images.iter().enumerate() {
        for cell in 0..24 {
            let fields: Vec<&str> = lines[1 + i * 24 + cell].split('\t').collect();
            assert_eq!(fields[1], image.stem);
            assert_eq!(fields[2], (cell / 6 + 1).to_string());
            assert_eq!(fields[3], (cell % 6 + 1).to_string());
        }
    }

    // The earliest image's table replaced its lock marker.
    let table = std::fs::read_to_string(layout.table_path(batch.earliest())).unwrap();
    assert_eq!(table.lines().count(), 25);
}

#[test]
fn test_latest_and_earliest_are_loaded_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = MemorySource::default();
    let single = add_plate(&mut source, dir.path(), "K001", 1);
    let triple = add_plate(&mut source, dir.path(), "K002", 3);

    let config = fixed_config(dir.path());
    let sink = CountingSink::default();
    let pipeline = Pipeline::new(&config, &MarkerFileClaim, &source, &sink);

    pipeline.process_batch(&single).unwrap();
    assert_eq!(source.loads.borrow().len(), 1);

    source.loads.borrow_mut().clear();
    pipeline.process_batch(&triple).unwrap();
    assert_eq!(source.loads.borrow().len(), 3);
}

#[test]
fn test_claimed_batch_is_skipped_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = MemorySource::default();
    let batch = add_plate(&mut source, dir.path(), "K001", 2);
    assert!(MarkerFileClaim.try_claim(&batch).unwrap());

    let config = fixed_config(dir.path());
    let sink = CountingSink::default();
    let pipeline = Pipeline::new(&config, &MarkerFileClaim, &source, &sink);

    assert_eq!(pipeline.process_batch(&batch).unwrap(), BatchOutcome::Skipped);
    assert!(source.loads.borrow().is_empty());
    let layout = OutputLayout::for_image(batch.earliest());
    assert!(!layout.series_path("K001").exists());
}

#[test]
fn test_unreadable_image_aborts_remaining_images() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = MemorySource::default();
    let mut batch = add_plate(&mut source, dir.path(), "K001", 2);
    let missing = ImageRecord::new(dir.path().join("K001_2014-03-05_10-00-00.png"));
    batch.images.insert(1, missing);

    let config = fixed_config(dir.path());
    let sink = CountingSink::default();
    let pipeline = Pipeline::new(&config, &MarkerFileClaim, &source, &sink);
    let err = pipeline.process_batch(&batch).unwrap_err();
    assert!(matches!(err, Error::Image(ImageError::Empty { .. })));

    let layout = OutputLayout::for_image(batch.earliest());
    assert!(layout.table_path(batch.latest()).exists());
    assert!(MarkerFileClaim.is_claimed(&batch));
    let series = std::fs::read_to_string(layout.series_path("K001")).unwrap();
    assert_eq!(series.lines().count(), 1 + 24);
}

#[test]
fn test_uncorrected_threshold_is_not_shifted() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = MemorySource::default();
    let batch = add_plate(&mut source, dir.path(), "K001", 3);

    let config = RunConfig {
        drift_correction: true,
        ..fixed_config(dir.path())
    };
    let sink = CountingSink::default();
    let pipeline = Pipeline::new(&config, &MarkerFileClaim, &source, &sink);
    pipeline.process_batch(&batch).unwrap();

    let layout = OutputLayout::for_image(batch.earliest());
    for image in &batch.images {
        let text = std::fs::read_to_string(layout.companion_path(image)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["threshold"].as_f64().unwrap() as f32, 0.45);
    }
}

#[test]
fn test_corrected_run_with_drift_and_diagnostics() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut source = MemorySource::default();
    let base = PlateConfig {
        colony_radius: 5.0,
        gradient: 0.15,
        ..Default::default()
    };
    let mut images = Vec::new();
    for (day, brightness) in [(3, 0.04), (2, 0.02), (1, 0.0)] {
        let path = image_path(dir.path(), "K001", day);
        let plate = PlateConfig {
            background: base.background + brightness,
            ..base.grown(1.0 + 0.1 * (day - 1) as f32)
        };
        source.insert(path.clone(), synthetic_plate(&plate));
        images.push(ImageRecord::new(path));
    }
    let batch = BarcodeBatch::new("K001", images);

    let config = RunConfig {
        lighting: LightingMode::RemoveSignal,
        drift_correction: true,
        diagnostics: true,
        ..RunConfig::for_directory(dir.path(), GridFormat::new(4, 6))
    };
    let sink = CountingSink::default();
    let pipeline = Pipeline::new(&config, &MarkerFileClaim, &source, &sink);

    assert_eq!(
        pipeline.process_batch(&batch).unwrap(),
        BatchOutcome::Processed { images: 3 }
    );
    assert_eq!(sink.overlays.get(), 3);
    assert_eq!(sink.histograms.get(), 1);

    let layout = OutputLayout::for_image(batch.earliest());
    let latest = read_areas(&layout.companion_path(batch.latest()));
    let earliest = read_areas(&layout.companion_path(batch.earliest()));
    let total = |areas: &[u64]| areas.iter().sum::<u64>();
    assert!(total(&latest) > total(&earliest));
}

#[test]
fn test_run_continues_after_failed_barcode() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut source = MemorySource::default();
    add_plate(&mut source, dir.path(), "K001", 2);
    // Too small for a 4x6 grid
    source.insert(
        image_path(dir.path(), "K002", 1),
        Buffer2::new_filled(8, 8, 0.2),
    );
    add_plate(&mut source, dir.path(), "K003", 1);

    let config = RunConfig::for_directory(dir.path(), GridFormat::new(4, 6));
    let sink = CountingSink::default();
    let summary = Pipeline::new(&config, &MarkerFileClaim, &source, &sink)
        .run()
        .unwrap();

    assert_eq!(summary.processed, vec!["K001", "K003"]);
    assert_eq!(summary.failed, vec!["K002"]);
    assert!(summary.skipped.is_empty());
    assert_eq!(summary.images, 3);

    // Everything is claimed now; a second worker finds nothing to do.
    let again = Pipeline::new(&config, &MarkerFileClaim, &source, &sink)
        .run()
        .unwrap();
    assert_eq!(again, RunSummary::default());
}

#[test]
fn test_stored_calibration_without_file_fails_barcode() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = MemorySource::default();
    let batch = add_plate(&mut source, dir.path(), "K001", 1);

    let config = RunConfig {
        use_stored_calibration: true,
        ..fixed_config(dir.path())
    };
    let sink = CountingSink::default();
    let pipeline = Pipeline::new(&config, &MarkerFileClaim, &source, &sink);
    let err = pipeline.process_batch(&batch).unwrap_err();
    assert!(matches!(
        err,
        Error::Calibration(crate::error::CalibrationError::NoEntry { .. })
    ));
}

#[test]
fn test_fixed_threshold_on_plate_without_growth() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(crate::calibration::INSTRUCTIONS_FILE),
        "default,4x6,30,30,130,90\n",
    )
    .unwrap();
    let mut source = MemorySource::default();
    let blank = synthetic_plate(&PlateConfig {
        colony_radius: 0.0,
        ..Default::default()
    });
    let mut images = Vec::new();
    for day in [2, 1] {
        let path = image_path(dir.path(), "K001", day);
        source.insert(path.clone(), blank.clone());
        images.push(ImageRecord::new(path));
    }
    let batch = BarcodeBatch::new("K001", images);

    let config = RunConfig {
        use_stored_calibration: true,
        refine_positions: false,
        ..fixed_config(dir.path())
    };
    let sink = CountingSink::default();
    let pipeline = Pipeline::new(&config, &MarkerFileClaim, &source, &sink);

    assert_eq!(
        pipeline.process_batch(&batch).unwrap(),
        BatchOutcome::Processed { images: 2 }
    );
    let layout = OutputLayout::for_image(batch.earliest());
    for image in &batch.images {
        assert!(read_areas(&layout.companion_path(image)).iter().all(|&a| a == 0));
    }
    let series = std::fs::read_to_string(layout.series_path("K001")).unwrap();
    assert_eq!(series.lines().count(), 1 + 2 * 24);
}

#[test]
fn test_image_outputs_stay_next_to_their_image() {
    let dir = tempfile::tempdir().unwrap();
    let first_dir = dir.path().join("week1");
    let second_dir = dir.path().join("week2");
    std::fs::create_dir_all(&first_dir).unwrap();
    std::fs::create_dir_all(&second_dir).unwrap();

    let mut source = MemorySource::default();
    let plate = synthetic_plate(&PlateConfig::default());
    let later = image_path(&second_dir, "K001", 9);
    let earlier = image_path(&first_dir, "K001", 1);
    source.insert(later.clone(), plate.clone());
    source.insert(earlier.clone(), plate);
    let batch = BarcodeBatch::new("K001", vec![ImageRecord::new(later), ImageRecord::new(earlier)]);

    let config = fixed_config(dir.path());
    let sink = CountingSink::default();
    let pipeline = Pipeline::new(&config, &MarkerFileClaim, &source, &sink);
    pipeline.process_batch(&batch).unwrap();

    let plate_layout = OutputLayout::new(&first_dir);
    let later_layout = OutputLayout::new(&second_dir);
    assert!(later_layout.table_path(batch.latest()).exists());
    assert!(later_layout.companion_path(batch.latest()).exists());
    assert!(!plate_layout.table_path(batch.latest()).exists());
    assert!(plate_layout.table_path(batch.earliest()).exists());

    let series = std::fs::read_to_string(plate_layout.series_path("K001")).unwrap();
    assert_eq!(series.lines().count(), 1 + 2 * 24);
    assert!(!later_layout.series_path("K001").exists());
}

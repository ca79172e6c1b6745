//! Per-barcode orchestration.
//!
//! A worker drains its barcode index one batch at a time: claim, calibrate on
//! the latest image, build the lighting correction from the earliest image,
//! fit one threshold per plate, then segment and measure every timepoint.
//! Only index errors end the run; anything else abandons the current barcode
//! and moves on.

#[cfg(test)]
mod tests;

use std::borrow::Cow;
use std::time::Instant;

use crate::barcode_index::{BarcodeBatch, BarcodeIndex, ImageRecord};
use crate::calibration::{GridCalibration, Instructions, calibrate};
use crate::config::RunConfig;
use crate::diagnostics::{DiagnosticsSink, Overlay};
use crate::error::{IndexError, Result};
use crate::layout::OutputLayout;
use crate::lighting::{CorrectionModel, average_background, build_correction};
use crate::measurement::{Companion, append_series, measure, write_companion, write_table};
use crate::plate_image::{ImageSource, PlateImage};
use crate::segmentation::{
    Intensities, SegmentationMask, Threshold, ThresholdFit, compensate_drift, segment,
};
use crate::work_claim::WorkClaim;

/// What happened to one barcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every image was measured.
    Processed { images: usize },
    /// Another worker claimed the barcode first.
    Skipped,
}

/// Barcodes handled by one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    /// Images measured across processed barcodes.
    pub images: usize,
}

impl RunSummary {
    pub fn log(&self) {
        tracing::info!(
            "Run finished: {} barcode(s) processed ({} images), {} failed, {} skipped",
            self.processed.len(),
            self.images,
            self.failed.len(),
            self.skipped.len()
        );
        if !self.failed.is_empty() {
            tracing::warn!("Failed barcodes: {}", self.failed.join(", "));
        }
    }
}

/// Plate-level state shared by every image of a batch.
struct PlateContext {
    calibration: GridCalibration,
    correction: Option<CorrectionModel>,
    average_background: f32,
    fit: ThresholdFit,
    reference_mask: SegmentationMask,
}

pub struct Pipeline<'a> {
    config: &'a RunConfig,
    claim: &'a dyn WorkClaim,
    source: &'a dyn ImageSource,
    diagnostics: &'a dyn DiagnosticsSink,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a RunConfig,
        claim: &'a dyn WorkClaim,
        source: &'a dyn ImageSource,
        diagnostics: &'a dyn DiagnosticsSink,
    ) -> Self {
        Self {
            config,
            claim,
            source,
            diagnostics,
        }
    }

    /// Unclaimed batches from the manifest, or from the search directory.
    pub fn build_index(&self) -> std::result::Result<BarcodeIndex, IndexError> {
        match &self.config.manifest {
            Some(path) => BarcodeIndex::from_manifest(path, self.claim),
            None => BarcodeIndex::scan(
                &self.config.search_dir,
                self.config.barcode_range,
                self.claim,
            ),
        }
    }

    /// Process barcodes until none are left unclaimed.
    pub fn run(&self) -> std::result::Result<RunSummary, IndexError> {
        let mut index = self.build_index()?;
        let mut summary = RunSummary::default();

        while let Some(batch) = index.next_batch() {
            match self.process_batch(&batch) {
                Ok(BatchOutcome::Processed { images }) => {
                    summary.images += images;
                    summary.processed.push(batch.barcode);
                }
                Ok(BatchOutcome::Skipped) => summary.skipped.push(batch.barcode),
                Err(e) => {
                    tracing::error!("Abandoning barcode {}: {}", batch.barcode, e);
                    summary.failed.push(batch.barcode);
                }
            }
            index.retain_unclaimed(self.claim);
        }

        summary.log();
        Ok(summary)
    }

    /// Claim and analyse one plate.
    ///
    /// Outputs already written for earlier timepoints stay in place when a
    /// later image fails, and so does the lock marker.
    pub fn process_batch(&self, batch: &BarcodeBatch) -> Result<BatchOutcome> {
        if !self.claim.try_claim(batch)? {
            return Ok(BatchOutcome::Skipped);
        }

        let start = Instant::now();
        tracing::info!("Analysing {} ({} image(s))", batch.barcode, batch.len());

        let layout = OutputLayout::for_image(batch.earliest());
        layout.ensure(self.config.diagnostics)?;

        let latest = self.source.load(&batch.latest().path)?;
        let earliest = if batch.is_single_timepoint() {
            None
        } else {
            let image = self.source.load(&batch.earliest().path)?;
            image.ensure_dimensions(latest.dimensions())?;
            Some(image)
        };

        let plate = self.prepare_plate(batch, &latest, earliest.as_ref().unwrap_or(&latest))?;
        if let Some(report) = plate.fit.report.as_ref().filter(|_| self.config.diagnostics) {
            self.diagnostics.histogram(&layout, batch.earliest(), report)?;
        }

        for (i, record) in batch.images.iter().enumerate() {
            let image = if i == 0 {
                Cow::Borrowed(&latest)
            } else if i == batch.len() - 1 {
                Cow::Borrowed(earliest.as_ref().unwrap_or(&latest))
            } else {
                Cow::Owned(self.source.load(&record.path)?)
            };
            self.process_image(batch, record, &image, &plate, &layout)?;
        }

        tracing::info!(
            "Finished {} in {:.1}s",
            batch.barcode,
            start.elapsed().as_secs_f32()
        );
        Ok(BatchOutcome::Processed {
            images: batch.len(),
        })
    }

    /// Grid, correction and threshold for a plate.
    fn prepare_plate(
        &self,
        batch: &BarcodeBatch,
        latest: &PlateImage,
        earliest: &PlateImage,
    ) -> Result<PlateContext> {
        let instructions = if self.config.use_stored_calibration {
            let found = Instructions::from_dir(batch.image_dir())?;
            if found.is_none() {
                tracing::warn!("No calibration file in {}", batch.image_dir().display());
            }
            Some(found.unwrap_or_default())
        } else {
            None
        };

        let calibration = calibrate(
            latest,
            batch.latest(),
            self.config.format,
            instructions.as_ref(),
            self.config.refine_positions,
        )?;
        let grid = &calibration.grid;

        let correction = build_correction(
            &earliest.intensity,
            grid,
            self.config.lighting,
            self.config.seed,
        );
        let average_background = match &correction {
            Some(model) => model.average_background(),
            None => average_background(&earliest.intensity, grid),
        };

        let envelope = grid.envelope();
        let latest_intensities = Intensities::from_image(&latest.intensity, correction.as_ref());
        let fit = Threshold::determine(
            &latest_intensities.crop(envelope),
            self.config.fixed_threshold,
        )?;
        let reference_mask = segment(&latest_intensities, &fit.threshold);
        tracing::info!(
            "{}: threshold {:.4} ({:?}), average background {:.4}",
            batch.barcode,
            fit.threshold.value,
            fit.threshold.source,
            average_background
        );

        Ok(PlateContext {
            calibration,
            correction,
            average_background,
            fit,
            reference_mask,
        })
    }

    fn process_image(
        &self,
        batch: &BarcodeBatch,
        record: &ImageRecord,
        image: &PlateImage,
        plate: &PlateContext,
        layout: &OutputLayout,
    ) -> Result<()> {
        let start = Instant::now();
        let grid = &plate.calibration.grid;
        image.ensure_dimensions(grid.image_dimensions())?;

        let (intensities, delta) = compensate_drift(
            Intensities::from_image(&image.intensity, plate.correction.as_ref()),
            &plate.reference_mask,
            grid.envelope(),
            plate.average_background,
            self.config.drift_correction,
        );
        let threshold = plate.fit.threshold.shifted(delta);
        let mask = segment(&intensities, &threshold);

        // Per-image outputs sit next to the image; the series stays with the plate.
        let image_layout = OutputLayout::for_image(record);
        if image_layout != *layout {
            image_layout.ensure(self.config.diagnostics)?;
        }

        let records = measure(
            grid,
            &intensities,
            image.rgb.as_ref(),
            &mask,
            plate.average_background,
            &batch.barcode,
            &record.stem,
            threshold.value,
        );

        write_table(&image_layout.table_path(record), &records)?;
        write_companion(
            &image_layout.companion_path(record),
            &Companion::new(
                &batch.barcode,
                &record.stem,
                threshold.value,
                (grid.dx(), grid.dy()),
                &records,
            ),
        )?;
        append_series(&layout.series_path(&batch.barcode), &records)?;

        if self.config.diagnostics {
            self.diagnostics.overlay(
                &image_layout,
                record,
                &Overlay {
                    intensities: intensities.pixels(),
                    mask: &mask,
                    grid,
                    landmarks: plate.calibration.landmarks.as_ref(),
                },
            )?;
        }

        tracing::info!(
            "Measured {} ({} colony pixels) in {:.2}s",
            record.stem,
            mask.count_ones(),
            start.elapsed().as_secs_f32()
        );
        Ok(())
    }
}

//! QA artefacts: overlay images and threshold reports.
//!
//! Nothing downstream reads these; they exist so an operator can check the
//! grid and the segmentation by eye.


use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use common::buffer2::Buffer2;

use crate::barcode_index::ImageRecord;
use crate::calibration::Landmarks;
use crate::error::OutputError;
use crate::grid::Grid;
use crate::layout::OutputLayout;
use crate::segmentation::{HistogramReport, SegmentationMask};

const LANDMARK_RADIUS: i32 = 5;
const WINDOW_COLOUR: Rgb<u8> = Rgb([0, 160, 255]);
const CENTER_COLOUR: Rgb<u8> = Rgb([255, 255, 0]);
const LANDMARK_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);
/// Colony pixels are blended toward this colour.
const SIGNAL_TINT: [f32; 3] = [0.0, 1.0, 0.0];

/// Everything drawn on one overlay.
#[derive(Debug, Clone, Copy)]
pub struct Overlay<'a> {
    /// Intensities the mask was computed from.
    pub intensities: &'a Buffer2<f32>,
    pub mask: &'a SegmentationMask,
    pub grid: &'a Grid,
    pub landmarks: Option<&'a Landmarks>,
}

/// Receiver of diagnostic artefacts.
pub trait DiagnosticsSink {
    /// Overlay for one image.
    fn overlay(
        &self,
        layout: &OutputLayout,
        image: &ImageRecord,
        overlay: &Overlay<'_>,
    ) -> Result<(), OutputError>;

    /// Threshold report for a plate, named after its earliest image.
    fn histogram(
        &self,
        layout: &OutputLayout,
        earliest: &ImageRecord,
        report: &HistogramReport,
    ) -> Result<(), OutputError>;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiagnostics;

impl DiagnosticsSink for NoDiagnostics {
    fn overlay(&self, _: &OutputLayout, _: &ImageRecord, _: &Overlay<'_>) -> Result<(), OutputError> {
        Ok(())
    }

    fn histogram(
        &self,
        _: &OutputLayout,
        _: &ImageRecord,
        _: &HistogramReport,
    ) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Writes overlays to `Output_Images` and reports to `Output_Reports`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileDiagnostics;

impl DiagnosticsSink for FileDiagnostics {
    fn overlay(
        &self,
        layout: &OutputLayout,
        image: &ImageRecord,
        overlay: &Overlay<'_>,
    ) -> Result<(), OutputError> {
        let path = layout.overlay_path(image);
        render_overlay(overlay)
            .save(&path)
            .map_err(|source| OutputError::Encode {
                path: path.clone(),
                source,
            })?;
        tracing::debug!("Saved overlay {}", path.display());
        Ok(())
    }

    fn histogram(
        &self,
        layout: &OutputLayout,
        earliest: &ImageRecord,
        report: &HistogramReport,
    ) -> Result<(), OutputError> {
        let path = layout.histogram_report_path(earliest);
        let json = serde_json::to_string_pretty(report).map_err(|source| {
            OutputError::Serialize {
                path: path.clone(),
                source,
            }
        })?;
        std::fs::write(&path, json).map_err(|source| OutputError::Write { path, source })
    }
}

/// Grey plate with colony pixels tinted, cell windows outlined, centers
/// crossed, and landmarks plus the first cell center as red dots.
pub fn render_overlay(overlay: &Overlay<'_>) -> RgbImage {
    let pixels = overlay.intensities;
    let (width, height) = (pixels.width() as u32, pixels.height() as u32);

    let mut img = RgbImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let v = pixels[(x, y)].clamp(0.0, 1.0);
        let rgb = if overlay.mask.get_xy(x, y) {
            SIGNAL_TINT.map(|t| 0.5 * v + 0.5 * t)
        } else {
            [v; 3]
        };
        Rgb(rgb.map(|c| (c * 255.0).round() as u8))
    });

    for cell in overlay.grid.cells() {
        let window = overlay.grid.cell_window(cell);
        if !window.is_empty() {
            let rect = Rect::at(window.x0 as i32, window.y0 as i32)
                .of_size(window.width() as u32, window.height() as u32);
            draw_hollow_rect_mut(&mut img, rect, WINDOW_COLOUR);
        }
        draw_cross_mut(
            &mut img,
            CENTER_COLOUR,
            cell.center.x.round() as i32,
            cell.center.y.round() as i32,
        );
    }

    let mut dots = Vec::new();
    if let Some(landmarks) = overlay.landmarks {
        dots.extend([
            landmarks.center_of_mass,
            landmarks.corner,
            landmarks.initial_guess,
        ]);
    }
    if let Some(first) = overlay.grid.cells().first() {
        dots.push(first.center);
    }
    for dot in dots {
        draw_filled_circle_mut(
            &mut img,
            (dot.x.round() as i32, dot.y.round() as i32),
            LANDMARK_RADIUS,
            LANDMARK_COLOUR,
        );
    }

    img
}

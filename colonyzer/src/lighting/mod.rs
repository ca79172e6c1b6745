//! Lighting correction.
//!
//! Plates are lit unevenly. A pseudo-empty image of the plate (the earliest
//! timepoint, optionally with colonies painted out) is smoothed into an
//! illumination surface; multiplying an image by `average / surface`
//! flattens the gradient while keeping the plate's mean agar level.

mod morphology;
mod signal_removal;
mod smoothing;

#[cfg(test)]
mod tests;

use common::buffer2::Buffer2;

use crate::grid::Grid;

pub use morphology::{dilate, erode, fill_holes};
pub use signal_removal::{EDGE_QUANTILE, colony_footprint, inpaint, strong_edges};
pub use smoothing::box_blur;

/// Blur passes approximating a Gaussian.
const SMOOTHING_PASSES: usize = 3;
/// Lower bound of the smoothed surface and the background level.
const MIN_LEVEL: f32 = common::EPSILON as f32;

/// How the pseudo-empty plate is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightingMode {
    /// No correction; intensities are used raw.
    Off,
    /// The earliest image is the pseudo-empty plate.
    AsIs,
    /// Colonies are cut out of the earliest image and inpainted.
    RemoveSignal,
}

/// Per-pixel multiplicative correction and the plate's background level.
///
/// Map values are strictly positive.
#[derive(Debug, Clone)]
pub struct CorrectionModel {
    map: Buffer2<f32>,
    average_background: f32,
}

impl CorrectionModel {
    /// Build a model from an illumination surface.
    pub fn from_surface(surface: &Buffer2<f32>, average_background: f32) -> Self {
        let average_background = average_background.max(MIN_LEVEL);
        let map = surface.map(|&s| average_background / s.max(MIN_LEVEL));
        Self {
            map,
            average_background,
        }
    }

    #[inline]
    pub fn map(&self) -> &Buffer2<f32> {
        &self.map
    }

    #[inline]
    pub fn average_background(&self) -> f32 {
        self.average_background
    }

    /// Flatten an image.
    pub fn apply(&self, image: &Buffer2<f32>) -> Buffer2<f32> {
        assert!(image.same_shape(&self.map), "image and correction map differ in shape");
        image.zip_map(&self.map, |v, m| v * m)
    }

    /// Undo [`apply`](Self::apply).
    pub fn invert(&self, image: &Buffer2<f32>) -> Buffer2<f32> {
        assert!(image.same_shape(&self.map), "image and correction map differ in shape");
        image.zip_map(&self.map, |v, m| v / m)
    }
}

/// Build the correction for a plate from its earliest image.
///
/// `None` when correction is off. `seed` drives the inpainting sampler.
pub fn build_correction(
    background: &Buffer2<f32>,
    grid: &Grid,
    mode: LightingMode,
    seed: u64,
) -> Option<CorrectionModel> {
    let pseudo_empty = match mode {
        LightingMode::Off => return None,
        LightingMode::AsIs => background.clone(),
        LightingMode::RemoveSignal => {
            let footprint = colony_footprint(background, grid);
            inpaint(background, &footprint, grid, seed)
        }
    };

    let radius = smoothing_radius(grid);
    let surface = box_blur(&pseudo_empty, radius, SMOOTHING_PASSES);
    let average = average_background(&pseudo_empty, grid);
    tracing::debug!(
        "Correction surface: blur radius {}, average background {:.4}",
        radius,
        average
    );

    Some(CorrectionModel::from_surface(&surface, average))
}

/// Mean intensity inside the grid envelope (whole image if it is empty).
pub fn average_background(intensity: &Buffer2<f32>, grid: &Grid) -> f32 {
    let envelope = grid.envelope();
    crate::math::mean(envelope.pixels().map(|p| intensity[p]))
        .or_else(|| crate::math::mean(intensity.iter().copied()))
        .unwrap_or(0.0)
}

/// Box radius covering about one cell spacing.
fn smoothing_radius(grid: &Grid) -> usize {
    ((grid.dx().max(grid.dy()) * 0.5).round() as usize).max(1)
}

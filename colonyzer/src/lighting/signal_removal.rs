//! Pseudo-empty plate synthesis.
//!
//! Colonies are found as filled regions of strong edges, shrunk to a
//! conservative footprint, and painted over with noise drawn from the agar
//! around them.

use imageproc::gradients::sobel_gradients;
use rand::prelude::*;
use rayon::prelude::*;

use common::bit_buffer2::BitBuffer2;
use common::buffer2::Buffer2;

use crate::grid::{Grid, Window};

use super::morphology::{dilate, erode, fill_holes};

/// Edge magnitudes above this quantile seed the colony mask.
pub const EDGE_QUANTILE: f32 = 0.8;
const CLOSE_DILATE: usize = 2;
const CLOSE_ERODE: usize = 1;
const GROW_DILATE: usize = 3;
const FOOTPRINT_ERODE: usize = 7;

/// Colony pixels of `intensity`, `true` = colony.
///
/// Strong edges are closed into outlines, everything outside the grid
/// envelope is cleared so hole filling cannot leak along the plate wall, the
/// outlines are filled, and the result is eroded back.
pub fn colony_footprint(intensity: &Buffer2<f32>, grid: &Grid) -> BitBuffer2 {
    let edges = strong_edges(intensity, EDGE_QUANTILE);

    let closed = erode(&dilate(&edges, CLOSE_DILATE), CLOSE_ERODE);
    let mut grown = dilate(&closed, GROW_DILATE);

    let envelope = grid.envelope();
    grown.retain_rect(envelope.x0, envelope.y0, envelope.x1, envelope.y1);

    let footprint = erode(&fill_holes(&grown), FOOTPRINT_ERODE);
    tracing::debug!(
        "Colony footprint covers {} of {} pixels",
        footprint.count_ones(),
        footprint.len()
    );
    footprint
}

/// Pixels whose Sobel magnitude exceeds the given quantile.
pub fn strong_edges(intensity: &Buffer2<f32>, quantile: f32) -> BitBuffer2 {
    let (width, height) = (intensity.width(), intensity.height());
    let grey = image::GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let v = intensity[(x as usize, y as usize)];
        image::Luma([(v.clamp(0.0, 1.0) * 255.0).round() as u8])
    });
    let gradients = sobel_gradients(&grey);
    let magnitudes: Vec<f32> = gradients.pixels().map(|p| p[0] as f32).collect();

    let mut scratch = magnitudes.clone();
    let cut = crate::math::quantile_f32_mut(&mut scratch, quantile);
    let edges: Vec<bool> = magnitudes.iter().map(|&m| m > cut).collect();
    BitBuffer2::from_slice(width, height, &edges)
}

/// Replace footprint pixels with samples of the surrounding background.
///
/// Each cell window draws from the mean and standard deviation of its own
/// unmasked pixels; windows without any use the whole envelope. Every cell
/// gets its own generator derived from `seed`, so the result does not depend
/// on thread scheduling.
pub fn inpaint(
    intensity: &Buffer2<f32>,
    footprint: &BitBuffer2,
    grid: &Grid,
    seed: u64,
) -> Buffer2<f32> {
    let fallback = background_stats(intensity, footprint, grid.envelope()).unwrap_or((0.0, 0.0));

    let fills: Vec<Vec<(usize, f32)>> = grid
        .cells()
        .par_iter()
        .enumerate()
        .map(|(i, cell)| {
            let window = grid.cell_window(cell);
            let (mean, sd) = background_stats(intensity, footprint, window).unwrap_or(fallback);
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            window
                .pixels()
                .map(|(x, y)| y * intensity.width() + x)
                .filter(|&idx| footprint.get(idx))
                .map(|idx| (idx, (mean + sd * standard_normal(&mut rng)).clamp(0.0, 1.0)))
                .collect()
        })
        .collect();

    let mut painted = intensity.clone();
    let mut filled = 0usize;
    for (idx, value) in fills.into_iter().flatten() {
        painted.pixels_mut()[idx] = value;
        filled += 1;
    }
    tracing::debug!("Inpainted {} pixels", filled);
    painted
}

/// Mean and standard deviation of non-footprint pixels in a window.
fn background_stats(
    intensity: &Buffer2<f32>,
    footprint: &BitBuffer2,
    window: Window,
) -> Option<(f32, f32)> {
    crate::math::mean_and_std(
        window
            .pixels()
            .filter(|&(x, y)| !footprint.get_xy(x, y))
            .map(|(x, y)| intensity[(x, y)]),
    )
}

/// Box-Muller sample from N(0, 1).
fn standard_normal(rng: &mut StdRng) -> f32 {
    let u1: f32 = rng.random_range(f32::EPSILON..1.0);
    let u2: f32 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}

//! Lattice search on intensity profiles.
//!
//! Colonies are brighter than agar, so the column profile (mean intensity of
//! each column) peaks once per grid column and the row profile once per grid
//! row. Each axis is solved independently: the span of strong profile values
//! gives a first guess, then spacing and offset are searched around it for the
//! lattice with the largest summed profile.

use glam::Vec2;
use rayon::prelude::*;

use common::buffer2::Buffer2;

use crate::config::GridFormat;
use crate::error::CalibrationError;
use crate::grid::Grid;

use super::Landmarks;

/// Smallest cell size, in pixels, a lattice may be searched at.
const MIN_CELL_PIXELS: usize = 2;
/// Profile values above `median + STRONG_FRACTION * (max - median)` mark
/// the first guess span.
const STRONG_FRACTION: f32 = 0.5;
/// Spacing search range around the first guess.
const SPACING_RANGE: (f32, f32) = (0.8, 1.2);
const SPACING_STEP: f32 = 0.25;
const OFFSET_STEP: f32 = 0.5;
const PROFILE_SMOOTH_RADIUS: usize = 2;

/// Fitted lattice along one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AxisFit {
    /// Window-based first guess for the first center.
    guess: f32,
    /// Searched first center.
    offset: f32,
    /// `None` when the axis has a single cell.
    spacing: Option<f32>,
}

/// Find a uniform `nrow × ncol` lattice on `intensity`.
pub(super) fn detect(
    intensity: &Buffer2<f32>,
    format: GridFormat,
) -> Result<(Grid, Landmarks), CalibrationError> {
    let (width, height) = (intensity.width(), intensity.height());
    if width < format.ncol * MIN_CELL_PIXELS || height < format.nrow * MIN_CELL_PIXELS {
        return Err(CalibrationError::ImageTooSmall {
            width,
            height,
            nrow: format.nrow,
            ncol: format.ncol,
        });
    }

    let columns = smooth_profile(&column_profile(intensity), PROFILE_SMOOTH_RADIUS);
    let rows = smooth_profile(&row_profile(intensity), PROFILE_SMOOTH_RADIUS);

    let x = fit_axis(&columns, format.ncol);
    let y = fit_axis(&rows, format.nrow);

    let spacing = match (x.spacing, y.spacing) {
        (Some(dx), Some(dy)) => Vec2::new(dx, dy),
        (Some(d), None) | (None, Some(d)) => Vec2::splat(d),
        (None, None) => Vec2::new(width as f32, height as f32),
    };

    let first = Vec2::new(x.offset, y.offset);
    let landmarks = Landmarks {
        corner: first,
        center_of_mass: center_of_mass(intensity),
        initial_guess: Vec2::new(x.guess, y.guess),
    };

    tracing::debug!(
        "Lattice fit: first center ({:.1}, {:.1}), spacing ({:.2}, {:.2})",
        first.x,
        first.y,
        spacing.x,
        spacing.y
    );

    let grid = Grid::regular(format, first, spacing, (width, height))?;
    Ok((grid, landmarks))
}

/// Mean intensity of each column.
fn column_profile(intensity: &Buffer2<f32>) -> Vec<f32> {
    let width = intensity.width();
    let sums = intensity
        .par_chunks(width)
        .fold(
            || vec![0.0f64; width],
            |mut acc, row| {
                for (a, &v) in acc.iter_mut().zip(row) {
                    *a += v as f64;
                }
                acc
            },
        )
        .reduce(
            || vec![0.0f64; width],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
                a
            },
        );
    let n = intensity.height() as f64;
    sums.into_iter().map(|s| (s / n) as f32).collect()
}

/// Mean intensity of each row.
fn row_profile(intensity: &Buffer2<f32>) -> Vec<f32> {
    let width = intensity.width() as f32;
    intensity
        .par_chunks(intensity.width())
        .map(|row| row.iter().sum::<f32>() / width)
        .collect()
}

fn smooth_profile(profile: &[f32], radius: usize) -> Vec<f32> {
    (0..profile.len())
        .map(|i| {
            let lo = i.saturating_sub(radius);
            let hi = (i + radius + 1).min(profile.len());
            profile[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
        })
        .collect()
}

/// Linear interpolation of the profile at a fractional position.
fn sample(profile: &[f32], pos: f32) -> f32 {
    let last = profile.len() - 1;
    let pos = pos.clamp(0.0, last as f32);
    let i = pos.floor() as usize;
    let t = pos - i as f32;
    if i >= last {
        profile[last]
    } else {
        profile[i] * (1.0 - t) + profile[i + 1] * t
    }
}

fn lattice_score(profile: &[f32], offset: f32, spacing: f32, count: usize) -> f32 {
    (0..count)
        .map(|i| sample(profile, offset + i as f32 * spacing))
        .sum()
}

fn fit_axis(profile: &[f32], count: usize) -> AxisFit {
    let len = profile.len() as f32;
    let mut sorted = profile.to_vec();
    let median = crate::math::median_f32_mut(&mut sorted);
    let peak = crate::math::max(profile.iter().copied()).unwrap_or(median);

    let cut = median + STRONG_FRACTION * (peak - median);
    let strong = (peak - median) > f32::EPSILON;
    let span = strong
        .then(|| {
            let lo = profile.iter().position(|&v| v > cut)?;
            let hi = profile.iter().rposition(|&v| v > cut)?;
            Some((lo as f32, hi as f32))
        })
        .flatten();

    if count == 1 {
        let center = match span {
            Some((lo, hi)) => (lo + hi) * 0.5,
            None => (len - 1.0) * 0.5,
        };
        return AxisFit {
            guess: center,
            offset: center,
            spacing: None,
        };
    }

    // First guess: lattice spanning the strong region, or the whole axis.
    let (guess, guess_spacing) = match span {
        Some((lo, hi)) if hi > lo => (lo, (hi - lo) / (count - 1) as f32),
        _ => {
            let d = len / count as f32;
            (d * 0.5, d)
        }
    };

    let spacings = search_steps(
        guess_spacing * SPACING_RANGE.0,
        guess_spacing * SPACING_RANGE.1,
        SPACING_STEP,
    );
    let best = spacings
        .into_par_iter()
        .filter(|&d| d >= MIN_CELL_PIXELS as f32)
        .flat_map_iter(|d| {
            let last_valid = len - 1.0 - (count - 1) as f32 * d;
            search_steps(guess - guess_spacing * 0.5, guess + guess_spacing * 0.5, OFFSET_STEP)
                .into_iter()
                .filter(move |&o| o >= 0.0 && o <= last_valid)
                .map(move |o| (o, d))
        })
        .map(|(o, d)| (o, d, lattice_score(profile, o, d, count)))
        .max_by(|a, b| a.2.total_cmp(&b.2).then_with(|| b.0.total_cmp(&a.0)));

    match best {
        Some((offset, spacing, _)) => AxisFit {
            guess,
            offset,
            spacing: Some(spacing),
        },
        None => AxisFit {
            guess,
            offset: guess.max(0.0),
            spacing: Some(guess_spacing.max(MIN_CELL_PIXELS as f32)),
        },
    }
}

fn search_steps(from: f32, to: f32, step: f32) -> Vec<f32> {
    let n = ((to - from) / step).floor().max(0.0) as usize;
    (0..=n).map(|i| from + i as f32 * step).collect()
}

/// Intensity-weighted centroid above the darkest pixel.
fn center_of_mass(intensity: &Buffer2<f32>) -> Vec2 {
    let floor = intensity.iter().copied().fold(f32::INFINITY, f32::min);
    let width = intensity.width();
    let (sx, sy, sw) = intensity
        .par_chunks(width)
        .enumerate()
        .map(|(y, row)| {
            row.iter().enumerate().fold((0.0f64, 0.0f64, 0.0f64), |(sx, sy, sw), (x, &v)| {
                let w = (v - floor) as f64;
                (sx + w * x as f64, sy + w * y as f64, sw + w)
            })
        })
        .reduce(
            || (0.0, 0.0, 0.0),
            |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2),
        );

    if sw <= 0.0 {
        return Vec2::new(width as f32 * 0.5, intensity.height() as f32 * 0.5);
    }
    Vec2::new((sx / sw) as f32, (sy / sw) as f32)
}

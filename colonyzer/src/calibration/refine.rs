//! Per-cell position refinement.

use glam::Vec2;
use rayon::prelude::*;

use common::buffer2::Buffer2;

use crate::error::CalibrationError;
use crate::grid::Grid;

/// Largest shift of a center, as a fraction of the cell spacing.
const MAX_SHIFT_FRACTION: f32 = 0.25;

/// Move each center toward the intensity centroid of its window.
///
/// Weights are intensities above the window minimum, so flat windows (empty
/// cells) stay put. Shifts are bounded per axis to a quarter spacing.
pub(super) fn refine(grid: &Grid, intensity: &Buffer2<f32>) -> Result<Grid, CalibrationError> {
    let max_shift = grid.spacing() * MAX_SHIFT_FRACTION;

    let centers: Vec<Vec2> = grid
        .cells()
        .par_iter()
        .map(|cell| {
            let window = grid.cell_window(cell);
            if window.is_empty() {
                return cell.center;
            }

            let floor = window
                .pixels()
                .map(|(x, y)| intensity[(x, y)])
                .fold(f32::INFINITY, f32::min);
            let (sum, weight) = window.pixels().fold((Vec2::ZERO, 0.0f32), |(s, w), (x, y)| {
                let v = intensity[(x, y)] - floor;
                (s + Vec2::new(x as f32, y as f32) * v, w + v)
            });
            if weight <= f32::EPSILON {
                return cell.center;
            }

            let shift = (sum / weight - cell.center).clamp(-max_shift, max_shift);
            cell.center + shift
        })
        .collect();

    grid.with_centers(&centers)
}

/// Least-squares lattice through the centers of `grid`.
///
/// Fits `center = first + index * spacing` per axis and returns
/// `(first, spacing)`. An axis with a single cell, or a fit that would not
/// give a positive spacing, keeps the grid's spacing.
pub(super) fn fit_lattice(grid: &Grid) -> (Vec2, Vec2) {
    let cells = grid.cells();
    let x = fit_line(cells.iter().map(|c| ((c.col - 1) as f64, c.center.x as f64)));
    let y = fit_line(cells.iter().map(|c| ((c.row - 1) as f64, c.center.y as f64)));

    let axis = |(intercept, slope): (f64, Option<f64>), fallback: f32| match slope {
        Some(s) if s > 0.0 => (intercept as f32, s as f32),
        _ => (intercept as f32, fallback),
    };
    let (x0, dx) = axis(x, grid.dx());
    let (y0, dy) = axis(y, grid.dy());
    (Vec2::new(x0, y0), Vec2::new(dx, dy))
}

/// Intercept and slope of `v = a + b * i`. With a single index value the
/// slope is `None` and the intercept is the mean.
fn fit_line(points: impl Iterator<Item = (f64, f64)>) -> (f64, Option<f64>) {
    let (n, si, sv, sii, siv) = points.fold((0.0, 0.0, 0.0, 0.0, 0.0), |acc, (i, v)| {
        (acc.0 + 1.0, acc.1 + i, acc.2 + v, acc.3 + i * i, acc.4 + i * v)
    });
    if n == 0.0 {
        return (0.0, None);
    }
    let var = sii - si * si / n;
    if var <= f64::EPSILON {
        return (sv / n, None);
    }
    let slope = (siv - si * sv / n) / var;
    ((sv - slope * si) / n, Some(slope))
}

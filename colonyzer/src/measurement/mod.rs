//! Per-culture phenotypes.

mod output;
mod record;


use rayon::prelude::*;

use common::buffer2::Buffer2;

use crate::grid::{Cell, Grid, Window};
use crate::segmentation::{Intensities, SegmentationMask};

pub use output::{Companion, append_series, write_companion, write_table};
pub use record::{MeasurementRecord, TABLE_COLUMNS, table_header};

/// Measure every cell of `grid` on one image, in row-major cell order.
#[allow(clippy::too_many_arguments)]
pub fn measure(
    grid: &Grid,
    image: &Intensities,
    colour: Option<&Buffer2<[f32; 3]>>,
    mask: &SegmentationMask,
    average_background: f32,
    barcode: &str,
    image_id: &str,
    threshold: f32,
) -> Vec<MeasurementRecord> {
    let pixels = image.pixels();
    assert_eq!(
        (pixels.width(), pixels.height()),
        (mask.width(), mask.height()),
        "mask and image differ in shape"
    );

    grid.cells()
        .par_iter()
        .map(|cell| {
            let window = grid.cell_window(cell);
            let stats = CellStats::collect(pixels, colour, mask, window);
            stats.into_record(cell, window, average_background, barcode, image_id, threshold)
        })
        .collect()
}

#[derive(Debug, Default)]
struct CellStats {
    area: usize,
    intensity: f64,
    perimeter: usize,
    signal_rgb: [f64; 3],
    background_rgb: [f64; 3],
    background_count: usize,
    has_colour: bool,
}

impl CellStats {
    fn collect(
        pixels: &Buffer2<f32>,
        colour: Option<&Buffer2<[f32; 3]>>,
        mask: &SegmentationMask,
        window: Window,
    ) -> Self {
        let mut stats = Self {
            has_colour: colour.is_some(),
            ..Default::default()
        };
        let signal = |x: usize, y: usize| window.contains(x, y) && mask.get_xy(x, y);

        for (x, y) in window.pixels() {
            let rgb = colour.map(|c| c[(x, y)]);
            if !mask.get_xy(x, y) {
                stats.background_count += 1;
                if let Some(rgb) = rgb {
                    add_rgb(&mut stats.background_rgb, rgb);
                }
                continue;
            }

            stats.area += 1;
            stats.intensity += pixels[(x, y)] as f64;
            if let Some(rgb) = rgb {
                add_rgb(&mut stats.signal_rgb, rgb);
            }

            let edge = x == 0
                || y == 0
                || !signal(x - 1, y)
                || !signal(x + 1, y)
                || !signal(x, y - 1)
                || !signal(x, y + 1);
            if edge {
                stats.perimeter += 1;
            }
        }
        stats
    }

    fn into_record(
        self,
        cell: &Cell,
        window: Window,
        average_background: f32,
        barcode: &str,
        image_id: &str,
        threshold: f32,
    ) -> MeasurementRecord {
        let circularity = if self.perimeter > 0 {
            (4.0 * std::f64::consts::PI * self.area as f64 / (self.perimeter as f64).powi(2)) as f32
        } else {
            0.0
        };
        let mean_rgb = |sum: [f64; 3], n: usize| {
            (self.has_colour && n > 0).then(|| sum.map(|s| (s / n as f64) as f32))
        };

        MeasurementRecord {
            barcode: barcode.to_string(),
            image: image_id.to_string(),
            row: cell.row,
            column: cell.col,
            x: cell.center.x,
            y: cell.center.y,
            window,
            area: self.area,
            intensity: self.intensity as f32,
            trimmed: (self.intensity - self.area as f64 * average_background as f64) as f32,
            perimeter: self.perimeter,
            circularity,
            threshold,
            background: average_background,
            signal_rgb: mean_rgb(self.signal_rgb, self.area),
            background_rgb: mean_rgb(self.background_rgb, self.background_count),
        }
    }
}

#[inline]
fn add_rgb(sum: &mut [f64; 3], rgb: [f32; 3]) {
    for (s, v) in sum.iter_mut().zip(rgb) {
        *s += v as f64;
    }
}

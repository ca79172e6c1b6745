//! The culture array: cell centers, shared spacing, and pixel windows.


use glam::Vec2;
use serde::Serialize;

use crate::config::GridFormat;
use crate::error::CalibrationError;

/// Half-open pixel rectangle `[x0, x1) × [y0, y1)`, always inside the image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Window {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl Window {
    /// Window spanning `[min, max]` in both axes, rounded to pixels and
    /// clamped to a `width × height` image.
    pub fn clamped(min: Vec2, max: Vec2, width: usize, height: usize) -> Self {
        let clamp = |v: f32, limit: usize| v.round().clamp(0.0, limit as f32) as usize;
        let x0 = clamp(min.x, width);
        let y0 = clamp(min.y, height);
        Self {
            x0,
            y0,
            x1: clamp(max.x, width).max(x0),
            y1: clamp(max.y, height).max(y0),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.x1 - self.x0
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.y1 - self.y0
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    /// Iterate over `(x, y)` pixel coordinates, row by row.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.y0..self.y1).flat_map(move |y| (self.x0..self.x1).map(move |x| (x, y)))
    }
}

/// One culture position. Rows and columns are 1-based, as in plate maps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub center: Vec2,
}

/// `nrow × ncol` culture centers with a plate-wide spacing.
///
/// Cells are stored row-major. Centers are clamped into the image when the
/// grid is built, and the spacing is strictly positive.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    format: GridFormat,
    cells: Vec<Cell>,
    spacing: Vec2,
    image_width: usize,
    image_height: usize,
}

impl Grid {
    /// Build a grid from row-major centers.
    pub fn new(
        format: GridFormat,
        centers: &[Vec2],
        spacing: Vec2,
        (image_width, image_height): (usize, usize),
    ) -> Result<Self, CalibrationError> {
        if format.cell_count() == 0 {
            return Err(CalibrationError::EmptyGrid {
                nrow: format.nrow,
                ncol: format.ncol,
            });
        }
        if !(spacing.x > 0.0 && spacing.y > 0.0) || !spacing.is_finite() {
            return Err(CalibrationError::DegenerateSpacing {
                dx: spacing.x,
                dy: spacing.y,
            });
        }
        assert_eq!(
            centers.len(),
            format.cell_count(),
            "expected one center per cell"
        );

        let max = Vec2::new(
            image_width.saturating_sub(1) as f32,
            image_height.saturating_sub(1) as f32,
        );
        let cells = centers
            .iter()
            .enumerate()
            .map(|(i, c)| Cell {
                row: i / format.ncol + 1,
                col: i % format.ncol + 1,
                center: c.clamp(Vec2::ZERO, max),
            })
            .collect();

        Ok(Self {
            format,
            cells,
            spacing,
            image_width,
            image_height,
        })
    }

    /// Regular lattice whose cell (1, 1) is centered at `first`.
    pub fn regular(
        format: GridFormat,
        first: Vec2,
        spacing: Vec2,
        dimensions: (usize, usize),
    ) -> Result<Self, CalibrationError> {
        let centers: Vec<Vec2> = (0..format.nrow)
            .flat_map(|r| {
                (0..format.ncol)
                    .map(move |c| first + Vec2::new(c as f32 * spacing.x, r as f32 * spacing.y))
            })
            .collect();
        Self::new(format, &centers, spacing, dimensions)
    }

    /// Same lattice with new centers (same count, same spacing).
    pub fn with_centers(&self, centers: &[Vec2]) -> Result<Self, CalibrationError> {
        Self::new(
            self.format,
            centers,
            self.spacing,
            (self.image_width, self.image_height),
        )
    }

    #[inline]
    pub fn format(&self) -> GridFormat {
        self.format
    }

    #[inline]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[inline]
    pub fn dx(&self) -> f32 {
        self.spacing.x
    }

    #[inline]
    pub fn dy(&self) -> f32 {
        self.spacing.y
    }

    #[inline]
    pub fn spacing(&self) -> Vec2 {
        self.spacing
    }

    #[inline]
    pub fn image_dimensions(&self) -> (usize, usize) {
        (self.image_width, self.image_height)
    }

    pub fn centers(&self) -> Vec<Vec2> {
        self.cells.iter().map(|c| c.center).collect()
    }

    /// Pixels belonging to a cell: `center ± spacing/2`, clamped.
    pub fn cell_window(&self, cell: &Cell) -> Window {
        let half = self.spacing * 0.5;
        Window::clamped(
            cell.center - half,
            cell.center + half,
            self.image_width,
            self.image_height,
        )
    }

    /// Outer envelope of all cell windows.
    ///
    /// Everything outside is plate wall or rim: it is trimmed before fitting
    /// thresholds and excluded from background estimates.
    pub fn envelope(&self) -> Window {
        let (min, max) = self.center_bounds();
        let half = self.spacing * 0.5;
        Window::clamped(min - half, max + half, self.image_width, self.image_height)
    }

    /// Smallest and largest center coordinates.
    pub fn center_bounds(&self) -> (Vec2, Vec2) {
        self.cells.iter().fold(
            (Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)),
            |(min, max), c| (min.min(c.center), max.max(c.center)),
        )
    }
}

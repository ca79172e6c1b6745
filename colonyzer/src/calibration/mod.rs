//! Culture grid calibration.
//!
//! A grid comes either from a stored calibration (`Colonyzer.txt` next to the
//! images) or from a lattice search on the latest image. Detected centers are
//! then nudged onto the colonies of the reference image; stored ones only
//! when asked to.

mod auto_detect;
mod instructions;
mod refine;


use glam::Vec2;

use crate::barcode_index::ImageRecord;
use crate::config::GridFormat;
use crate::error::CalibrationError;
use crate::grid::Grid;
use crate::plate_image::PlateImage;

pub use instructions::{CalibrationEntry, INSTRUCTIONS_FILE, Instructions};

/// Points found during automatic detection, kept for the QA overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmarks {
    /// Center of cell (1, 1) on the lattice fitted to the refined centers.
    pub corner: Vec2,
    /// Intensity-weighted centroid of the whole image.
    pub center_of_mass: Vec2,
    /// Center of cell (1, 1) in the window-based first guess.
    pub initial_guess: Vec2,
}

/// How the grid was obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationSource {
    Stored { entry: String },
    Automatic,
}

#[derive(Debug, Clone)]
pub struct GridCalibration {
    pub grid: Grid,
    /// `None` for stored calibrations.
    pub landmarks: Option<Landmarks>,
    pub source: CalibrationSource,
}

/// Locate the culture grid on `reference`.
///
/// With `stored` set, the entry selected for `record` is used and a missing
/// entry is an error. Stored positions are taken verbatim unless
/// `refine_stored` asks for them to be nudged onto the colonies. Without
/// `stored` the grid is searched for automatically, refined, and its
/// spacing re-fitted to the refined centers.
pub fn calibrate(
    reference: &PlateImage,
    record: &ImageRecord,
    format: GridFormat,
    stored: Option<&Instructions>,
    refine_stored: bool,
) -> Result<GridCalibration, CalibrationError> {
    if format.cell_count() == 0 {
        return Err(CalibrationError::EmptyGrid {
            nrow: format.nrow,
            ncol: format.ncol,
        });
    }

    let calibration = match stored {
        Some(instructions) => {
            let entry = instructions
                .select(record)
                .ok_or_else(|| CalibrationError::NoEntry {
                    image: record.file_name(),
                })?;
            tracing::debug!("Using stored calibration '{}' for {}", entry.name, record.stem);
            let grid = entry.to_grid(format, reference.dimensions())?;
            GridCalibration {
                grid: if refine_stored {
                    refine::refine(&grid, &reference.intensity)?
                } else {
                    grid
                },
                landmarks: None,
                source: CalibrationSource::Stored {
                    entry: entry.name.clone(),
                },
            }
        }
        None => {
            let (initial, mut landmarks) = auto_detect::detect(&reference.intensity, format)?;
            let refined = refine::refine(&initial, &reference.intensity)?;
            let (first, spacing) = refine::fit_lattice(&refined);
            landmarks.corner = first;
            GridCalibration {
                grid: Grid::new(format, &refined.centers(), spacing, reference.dimensions())?,
                landmarks: Some(landmarks),
                source: CalibrationSource::Automatic,
            }
        }
    };

    tracing::info!(
        "Calibrated {} grid on {}: dx={:.2}, dy={:.2}",
        format,
        record.stem,
        calibration.grid.dx(),
        calibration.grid.dy()
    );
    Ok(calibration)
}

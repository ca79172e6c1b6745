//! Stored culture positions (`Colonyzer.txt`).
//!
//! One entry per line:
//!
//! ```text
//! # name,format,x_first,y_first,x_last,y_last[,date]
//! K000123_010_2014-03-01_10-00-00.jpg,384,120.5,98,1830,1140
//! default,384,118,97,1828,1139,2014-01-15
//! default,384,121,99,1831,1141,2014-06-02
//! ```
//!
//! `(x_first, y_first)` is the center of cell (1, 1) and `(x_last, y_last)`
//! the center of cell (nrow, ncol).

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use glam::Vec2;

use crate::barcode_index::ImageRecord;
use crate::config::GridFormat;
use crate::error::CalibrationError;
use crate::grid::Grid;

pub const INSTRUCTIONS_FILE: &str = "Colonyzer.txt";
const DEFAULT_NAME: &str = "default";

/// One stored calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationEntry {
    pub name: String,
    pub format: GridFormat,
    pub first: Vec2,
    pub last: Vec2,
    /// Capture date a `default` variant was measured on.
    pub date: Option<NaiveDate>,
}

impl CalibrationEntry {
    /// Cell spacing implied by the corner centers.
    ///
    /// A single row or column borrows the spacing of the other axis.
    pub fn spacing(&self) -> Vec2 {
        let span = self.last - self.first;
        let step = |extent: f32, count: usize| {
            (count > 1).then(|| extent / (count - 1) as f32)
        };
        let dx = step(span.x, self.format.ncol);
        let dy = step(span.y, self.format.nrow);
        match (dx, dy) {
            (Some(dx), Some(dy)) => Vec2::new(dx, dy),
            (Some(d), None) | (None, Some(d)) => Vec2::splat(d),
            (None, None) => Vec2::ZERO,
        }
    }

    /// Lay out the stored lattice on an image of the given dimensions.
    pub fn to_grid(
        &self,
        format: GridFormat,
        dimensions: (usize, usize),
    ) -> Result<Grid, CalibrationError> {
        if self.format != format {
            return Err(CalibrationError::FormatMismatch {
                name: self.name.clone(),
                entry_nrow: self.format.nrow,
                entry_ncol: self.format.ncol,
                nrow: format.nrow,
                ncol: format.ncol,
            });
        }
        Grid::regular(format, self.first, self.spacing(), dimensions)
    }

    fn is_default(&self) -> bool {
        self.name == DEFAULT_NAME
    }
}

/// All entries of a calibration file, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Instructions {
    pub entries: Vec<CalibrationEntry>,
}

impl Instructions {
    /// Read `Colonyzer.txt` from an image directory. `Ok(None)` if absent.
    pub fn from_dir(dir: &Path) -> Result<Option<Self>, CalibrationError> {
        let path = dir.join(INSTRUCTIONS_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Self::from_file(&path).map(Some)
    }

    pub fn from_file(path: &Path) -> Result<Self, CalibrationError> {
        let text = std::fs::read_to_string(path).map_err(|source| CalibrationError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    /// Parse file contents. `path` only labels errors.
    pub fn parse(path: &Path, text: &str) -> Result<Self, CalibrationError> {
        let entries = text
            .lines()
            .enumerate()
            .filter_map(|(i, line)| {
                let content = line.split('#').next().unwrap_or("").trim();
                (!content.is_empty()).then_some((i + 1, content))
            })
            .map(|(line, content)| parse_entry(content).map_err(|reason| {
                CalibrationError::MalformedLine {
                    path: PathBuf::from(path),
                    line,
                    reason,
                }
            }))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Read {} calibration entries from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    /// Pick the entry for an image.
    ///
    /// An entry named after the image file wins. Otherwise a single `default`
    /// is used as is; among several dated defaults the one measured closest
    /// to the image's capture date is chosen, the first listed on ties or
    /// when the date is unknown.
    pub fn select(&self, image: &ImageRecord) -> Option<&CalibrationEntry> {
        let file_name = image.file_name();
        if let Some(exact) = self.entries.iter().find(|e| e.name == file_name) {
            return Some(exact);
        }

        let defaults: Vec<&CalibrationEntry> =
            self.entries.iter().filter(|e| e.is_default()).collect();
        let first = *defaults.first()?;
        if defaults.len() == 1 {
            return Some(first);
        }

        let Some(captured) = image.capture_date() else {
            return Some(first);
        };
        let closest = defaults
            .iter()
            .filter_map(|e| e.date.map(|d| (e, (d - captured).num_days().abs())))
            .min_by_key(|(_, days)| *days)
            .map(|(e, _)| *e);
        Some(closest.unwrap_or(first))
    }
}

fn parse_entry(content: &str) -> Result<CalibrationEntry, String> {
    let fields: Vec<&str> = content.split(',').map(str::trim).collect();
    if !(6..=7).contains(&fields.len()) {
        return Err(format!("expected 6 or 7 fields, found {}", fields.len()));
    }

    let format: GridFormat = fields[1]
        .parse()
        .map_err(|e| format!("bad grid format: {e}"))?;
    let number = |idx: usize| -> Result<f32, String> {
        fields[idx]
            .parse::<f32>()
            .map_err(|_| format!("field {} is not a number: '{}'", idx + 1, fields[idx]))
    };
    let date = fields
        .get(6)
        .map(|d| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|_| format!("bad date '{d}'"))
        })
        .transpose()?;

    Ok(CalibrationEntry {
        name: fields[0].to_string(),
        format,
        first: Vec2::new(number(2)?, number(3)?),
        last: Vec2::new(number(4)?, number(5)?),
        date,
    })
}

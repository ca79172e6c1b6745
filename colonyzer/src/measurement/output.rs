//! Persisted measurements: per-image tables, companions and plate series.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::OutputError;

use super::record::{MeasurementRecord, table_header};

/// Structured twin of an image table.
#[derive(Debug, Serialize)]
pub struct Companion<'a> {
    pub version: &'static str,
    pub barcode: &'a str,
    pub image: &'a str,
    pub threshold: f32,
    pub dx: f32,
    pub dy: f32,
    pub records: &'a [MeasurementRecord],
}

impl<'a> Companion<'a> {
    pub fn new(
        barcode: &'a str,
        image: &'a str,
        threshold: f32,
        (dx, dy): (f32, f32),
        records: &'a [MeasurementRecord],
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            barcode,
            image,
            threshold,
            dx,
            dy,
            records,
        }
    }
}

/// Write an image table, replacing any earlier file (or lock marker).
pub fn write_table(path: &Path, records: &[MeasurementRecord]) -> Result<(), OutputError> {
    let mut text = table_header();
    text.push('\n');
    for record in records {
        text.push_str(&record.table_row());
        text.push('\n');
    }
    std::fs::write(path, text).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_companion(path: &Path, companion: &Companion<'_>) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(companion).map_err(|source| {
        OutputError::Serialize {
            path: path.to_path_buf(),
            source,
        }
    })?;
    std::fs::write(path, json).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Append rows to a plate series. The header goes in only when the file is
/// empty; existing rows are never touched.
pub fn append_series(path: &Path, records: &[MeasurementRecord]) -> Result<(), OutputError> {
    let write_err = |source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(write_err)?;
    let empty = file.metadata().map_err(write_err)?.len() == 0;

    let mut text = String::new();
    if empty {
        text.push_str(&table_header());
        text.push('\n');
    }
    for record in records {
        text.push_str(&record.table_row());
        text.push('\n');
    }
    file.write_all(text.as_bytes()).map_err(write_err)
}

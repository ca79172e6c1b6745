//! Grouping of image files into per-plate batches.
//!
//! Plates are identified by a barcode embedded in each image file name. All
//! images sharing a barcode form a [`BarcodeBatch`], ordered latest first.
//! Batches whose lock marker already exists are left out: another worker is
//! on them, or they are done.


use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::IndexError;
use crate::work_claim::WorkClaim;

/// Python-style slice of a file name that holds the barcode.
///
/// Negative bounds count from the end. The default `(0, -24)` strips a
/// `_YYYY-MM-DD_hh-mm-ss.ext` suffix from a name like
/// `K000123_010_2014-03-01_10-00-00.jpg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BarcodeRange {
    pub start: i64,
    pub end: i64,
}

impl Default for BarcodeRange {
    fn default() -> Self {
        Self { start: 0, end: -24 }
    }
}

impl BarcodeRange {
    /// Extract the barcode from a file name. `None` if the slice is empty.
    pub fn apply(&self, file_name: &str) -> Option<String> {
        let chars: Vec<char> = file_name.chars().collect();
        let len = chars.len() as i64;
        let resolve = |bound: i64| -> usize {
            let idx = if bound < 0 { len + bound } else { bound };
            idx.clamp(0, len) as usize
        };

        let (start, end) = (resolve(self.start), resolve(self.end));
        if start >= end {
            return None;
        }
        Some(chars[start..end].iter().collect())
    }
}

/// One timepoint image of a plate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub path: PathBuf,
    /// File name without extension; names every output of this image.
    pub stem: String,
}

impl ImageRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let stem = common::file_utils::file_stem(&path);
        Self { path, stem }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Capture date encoded in the name, `..._YYYY-MM-DD_hh-mm-ss`.
    pub fn capture_date(&self) -> Option<NaiveDate> {
        let chars: Vec<char> = self.stem.chars().collect();
        if chars.len() < 19 {
            return None;
        }
        let date: String = chars[chars.len() - 19..chars.len() - 9].iter().collect();
        NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok()
    }
}

/// All images of one plate, latest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeBatch {
    pub barcode: String,
    pub images: Vec<ImageRecord>,
}

impl BarcodeBatch {
    /// Build a batch. `images` must be non-empty and ordered latest first.
    pub fn new(barcode: impl Into<String>, images: Vec<ImageRecord>) -> Self {
        assert!(!images.is_empty(), "a barcode batch needs at least one image");
        Self {
            barcode: barcode.into(),
            images,
        }
    }

    /// Most recent image: grid detection and threshold fitting.
    pub fn latest(&self) -> &ImageRecord {
        &self.images[0]
    }

    /// First image: pseudo-empty plate and lock marker.
    pub fn earliest(&self) -> &ImageRecord {
        &self.images[self.images.len() - 1]
    }

    /// `true` for a batch with a single timepoint.
    pub fn is_single_timepoint(&self) -> bool {
        self.images.len() == 1
    }

    pub fn image_dir(&self) -> &Path {
        self.earliest().path.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Queue of unclaimed batches, handed out in barcode order.
#[derive(Debug, Default)]
pub struct BarcodeIndex {
    batches: BTreeMap<String, BarcodeBatch>,
}

impl BarcodeIndex {
    /// Group the raster images in `dir` by barcode.
    ///
    /// An unreadable directory is an error rather than an empty index.
    pub fn scan(
        dir: &Path,
        range: BarcodeRange,
        claim: &dyn WorkClaim,
    ) -> Result<Self, IndexError> {
        let files = common::file_utils::raster_image_files(dir).map_err(|source| {
            IndexError::ReadDir {
                path: dir.to_path_buf(),
                source,
            }
        })?;

        let mut grouped: BTreeMap<String, Vec<ImageRecord>> = BTreeMap::new();
        for path in files {
            let record = ImageRecord::new(path);
            match range.apply(&record.file_name()) {
                Some(barcode) => grouped.entry(barcode).or_default().push(record),
                None => tracing::debug!(
                    "Skipping {}: name too short for a barcode",
                    record.path.display()
                ),
            }
        }

        let batches = grouped.into_iter().map(|(barcode, mut images)| {
            // Names sort by timestamp; newest first.
            images.sort_by(|a, b| b.path.cmp(&a.path));
            BarcodeBatch::new(barcode, images)
        });

        let index = Self::from_batches(batches, claim);
        tracing::info!(
            "Found {} unclaimed barcode(s) in {}",
            index.len(),
            dir.display()
        );
        Ok(index)
    }

    /// Load batches from a JSON manifest mapping barcode to image paths.
    ///
    /// Paths are taken in the manifest's order (latest first). Entries that
    /// are not a non-empty list of strings are reported and skipped.
    pub fn from_manifest(path: &Path, claim: &dyn WorkClaim) -> Result<Self, IndexError> {
        let text = std::fs::read_to_string(path).map_err(|source| IndexError::ReadManifest {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&text).map_err(|source| IndexError::ParseManifest {
                path: path.to_path_buf(),
                source,
            })?;

        let batches = entries
            .into_iter()
            .filter_map(|(barcode, value)| match parse_manifest_entry(&value) {
                Some(images) => Some(BarcodeBatch::new(barcode, images)),
                None => {
                    tracing::warn!(
                        "Skipping barcode {} in {}: expected a non-empty list of image paths",
                        barcode,
                        path.display()
                    );
                    None
                }
            });

        let index = Self::from_batches(batches, claim);
        tracing::info!(
            "Loaded {} unclaimed barcode(s) from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }

    /// Index the given batches, dropping claimed ones.
    pub fn from_batches(
        batches: impl IntoIterator<Item = BarcodeBatch>,
        claim: &dyn WorkClaim,
    ) -> Self {
        let batches = batches
            .into_iter()
            .filter(|batch| !claim.is_claimed(batch))
            .map(|batch| (batch.barcode.clone(), batch))
            .collect();
        Self { batches }
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn contains(&self, barcode: &str) -> bool {
        self.batches.contains_key(barcode)
    }

    pub fn barcodes(&self) -> impl Iterator<Item = &str> {
        self.batches.keys().map(String::as_str)
    }

    pub fn get(&self, barcode: &str) -> Option<&BarcodeBatch> {
        self.batches.get(barcode)
    }

    /// Remove and return the batch with the smallest barcode.
    pub fn next_batch(&mut self) -> Option<BarcodeBatch> {
        self.batches.pop_first().map(|(_, batch)| batch)
    }

    /// Drop batches claimed by other workers since the index was built.
    pub fn retain_unclaimed(&mut self, claim: &dyn WorkClaim) {
        let before = self.batches.len();
        self.batches.retain(|_, batch| !claim.is_claimed(batch));
        let dropped = before - self.batches.len();
        if dropped > 0 {
            tracing::info!("{} barcode(s) claimed elsewhere since the scan", dropped);
        }
    }
}

fn parse_manifest_entry(value: &serde_json::Value) -> Option<Vec<ImageRecord>> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| item.as_str().map(ImageRecord::new))
        .collect()
}

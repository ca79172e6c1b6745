//! Where outputs live relative to the images they describe.
//!
//! Every image directory gets `Output_Data` (tables, lock markers, series),
//! `Output_Images` (QA overlays) and `Output_Reports` (threshold reports).

use std::path::{Path, PathBuf};

use crate::barcode_index::ImageRecord;
use crate::error::OutputError;

pub const DATA_DIR: &str = "Output_Data";
pub const IMAGES_DIR: &str = "Output_Images";
pub const REPORTS_DIR: &str = "Output_Reports";

/// Output locations for one image directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(image_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: image_dir.into(),
        }
    }

    /// Layout for the directory holding `image`.
    pub fn for_image(image: &ImageRecord) -> Self {
        Self::new(
            image
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        )
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join(REPORTS_DIR)
    }

    /// Create the output directories if they do not exist yet.
    pub fn ensure(&self, diagnostics: bool) -> Result<(), OutputError> {
        let mut dirs = vec![self.data_dir()];
        if diagnostics {
            dirs.push(self.images_dir());
            dirs.push(self.reports_dir());
        }
        for dir in dirs {
            std::fs::create_dir_all(&dir)
                .map_err(|source| OutputError::CreateDir { path: dir, source })?;
        }
        Ok(())
    }

    /// Lock marker for a batch whose reference image is `image`.
    ///
    /// Shares its path with the image's measurement table, so a finished
    /// plate keeps its marker.
    pub fn marker_path(&self, image: &ImageRecord) -> PathBuf {
        self.table_path(image)
    }

    /// Tab-delimited measurements for one image.
    pub fn table_path(&self, image: &ImageRecord) -> PathBuf {
        self.data_dir().join(format!("{}.out", image.stem))
    }

    /// Structured companion of the table, with threshold and spacing.
    pub fn companion_path(&self, image: &ImageRecord) -> PathBuf {
        self.data_dir().join(format!("{}.dat", image.stem))
    }

    /// Append-only growth curve for a plate.
    pub fn series_path(&self, barcode: &str) -> PathBuf {
        self.data_dir().join(format!("{barcode}_series.out"))
    }

    pub fn overlay_path(&self, image: &ImageRecord) -> PathBuf {
        self.images_dir().join(format!("{}.png", image.stem))
    }

    pub fn histogram_report_path(&self, image: &ImageRecord) -> PathBuf {
        self.reports_dir().join(format!("{}_histogram.json", image.stem))
    }
}

//! Plate images as normalized floating point rasters.
//!
//! Every stage works on [`PlateImage::intensity`], a single channel in
//! `[0, 1]`. Colour images keep their RGB planes alongside for the colour
//! summaries in measurement records.


use std::path::{Path, PathBuf};

use common::buffer2::Buffer2;

use crate::error::ImageError;

/// A decoded plate photograph.
#[derive(Debug, Clone)]
pub struct PlateImage {
    pub path: PathBuf,
    /// Luma in `[0, 1]`.
    pub intensity: Buffer2<f32>,
    /// RGB planes in `[0, 1]`, present for colour sources only.
    pub rgb: Option<Buffer2<[f32; 3]>>,
}

impl PlateImage {
    /// Wrap an existing intensity raster (no colour planes).
    pub fn from_intensity(path: impl Into<PathBuf>, intensity: Buffer2<f32>) -> Self {
        Self {
            path: path.into(),
            intensity,
            rgb: None,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.intensity.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.intensity.height()
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    /// Fail unless this image has the given dimensions.
    pub fn ensure_dimensions(&self, expected: (usize, usize)) -> Result<(), ImageError> {
        if self.dimensions() != expected {
            return Err(ImageError::DimensionMismatch {
                path: self.path.clone(),
                expected,
                actual: self.dimensions(),
            });
        }
        Ok(())
    }
}

/// Where plate images come from.
///
/// The pipeline only ever asks for a decoded image by path, so tests and
/// alternative stores can stand in for the filesystem.
pub trait ImageSource {
    fn load(&self, path: &Path) -> Result<PlateImage, ImageError>;
}

/// Decodes images from disk with the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileImageSource;

impl ImageSource for FileImageSource {
    fn load(&self, path: &Path) -> Result<PlateImage, ImageError> {
        let decoded = image::open(path).map_err(|source| ImageError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        let width = decoded.width() as usize;
        let height = decoded.height() as usize;
        if width == 0 || height == 0 {
            return Err(ImageError::Empty {
                path: path.to_path_buf(),
            });
        }

        let luma = decoded.to_luma32f();
        let intensity = Buffer2::new(width, height, luma.into_raw());

        let rgb = if decoded.color().channel_count() >= 3 {
            let planes = decoded.to_rgb32f();
            let pixels = planes
                .into_raw()
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect();
            Some(Buffer2::new(width, height, pixels))
        } else {
            None
        };

        tracing::debug!(
            "Loaded {} ({}x{}, {})",
            path.display(),
            width,
            height,
            if rgb.is_some() { "colour" } else { "grey" }
        );

        Ok(PlateImage {
            path: path.to_path_buf(),
            intensity,
            rgb,
        })
    }
}

//! Threshold selection, drift compensation and masking.
//!
//! A threshold is fitted once per plate on the latest image, trimmed to the
//! grid envelope so the plate wall does not distort the histogram. Each
//! timepoint is then masked against that threshold, optionally shifted to
//! follow the image's agar level.
//!
//! Intensities always travel tagged as raw or corrected. A threshold
//! remembers which kind it was fitted on and only masks that kind.

mod histogram;


use serde::Serialize;

use common::bit_buffer2::BitBuffer2;
use common::buffer2::Buffer2;

use crate::error::SegmentationError;
use crate::grid::Window;
use crate::lighting::CorrectionModel;

pub use histogram::{BINS, Component, Histogram, MixtureFit, fit_mixture, otsu_split};

/// `true` = colony.
pub type SegmentationMask = BitBuffer2;

/// Whether an intensity array has been lighting corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Basis {
    Raw,
    Corrected,
}

/// Plate intensities tagged with their correction state.
#[derive(Debug, Clone, PartialEq)]
pub enum Intensities {
    Raw(Buffer2<f32>),
    Corrected(Buffer2<f32>),
}

impl Intensities {
    /// Corrected intensities when a model is given, raw otherwise.
    pub fn from_image(image: &Buffer2<f32>, correction: Option<&CorrectionModel>) -> Self {
        match correction {
            Some(model) => Self::Corrected(model.apply(image)),
            None => Self::Raw(image.clone()),
        }
    }

    #[inline]
    pub fn pixels(&self) -> &Buffer2<f32> {
        match self {
            Self::Raw(p) | Self::Corrected(p) => p,
        }
    }

    #[inline]
    pub fn basis(&self) -> Basis {
        match self {
            Self::Raw(_) => Basis::Raw,
            Self::Corrected(_) => Basis::Corrected,
        }
    }

    /// The part inside `window`, same basis.
    pub fn crop(&self, window: Window) -> Self {
        self.with_pixels(
            self.pixels()
                .crop(window.x0, window.y0, window.x1, window.y1),
        )
    }

    fn with_pixels(&self, pixels: Buffer2<f32>) -> Self {
        match self {
            Self::Raw(_) => Self::Raw(pixels),
            Self::Corrected(_) => Self::Corrected(pixels),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ThresholdSource {
    /// Supplied by the operator.
    Fixed,
    /// Crossover of the fitted two-component mixture.
    Mixture,
    /// Otsu's split, used when the mixture fit degenerates.
    Otsu,
}

/// Intensity at or above which a pixel is colony.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Threshold {
    pub value: f32,
    pub source: ThresholdSource,
    pub basis: Basis,
}

impl Threshold {
    /// Choose the plate threshold from the trimmed latest image.
    ///
    /// A fixed value is used as given, even above every pixel: a plate with
    /// no growth yet is a valid all-background timepoint. A fitted threshold
    /// may not exceed the population maximum.
    pub fn determine(
        trimmed: &Intensities,
        fixed: Option<f32>,
    ) -> Result<ThresholdFit, SegmentationError> {
        let values = trimmed.pixels().pixels();
        let maximum = crate::math::max(values.iter().copied())
            .ok_or(SegmentationError::EmptyPopulation)?;

        let fit = match fixed {
            Some(value) => {
                if value > maximum {
                    tracing::warn!(
                        "Fixed threshold {:.4} above brightest pixel {:.4}, plate reads as background",
                        value,
                        maximum
                    );
                }
                ThresholdFit {
                    threshold: Threshold {
                        value,
                        source: ThresholdSource::Fixed,
                        basis: trimmed.basis(),
                    },
                    report: None,
                }
            }
            None => {
                let fit = fit_automatic(values, trimmed.basis())?;
                if fit.threshold.value > maximum {
                    return Err(SegmentationError::AboveMaximum {
                        threshold: fit.threshold.value,
                        maximum,
                    });
                }
                fit
            }
        };

        tracing::debug!(
            "Threshold {:.4} ({:?}, {:?})",
            fit.threshold.value,
            fit.threshold.source,
            fit.threshold.basis
        );
        Ok(fit)
    }

    /// The threshold moved by a drift offset.
    pub fn shifted(&self, delta: f32) -> Self {
        Self {
            value: self.value + delta,
            ..*self
        }
    }
}

/// A threshold with the histogram it was fitted on.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdFit {
    pub threshold: Threshold,
    /// `None` for fixed thresholds.
    pub report: Option<HistogramReport>,
}

/// What the automatic threshold was fitted on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramReport {
    pub bin_centers: Vec<f32>,
    pub counts: Vec<u64>,
    pub otsu: f32,
    pub mixture: Option<MixtureFit>,
    pub threshold: f32,
    pub source: ThresholdSource,
}

fn fit_automatic(values: &[f32], basis: Basis) -> Result<ThresholdFit, SegmentationError> {
    let hist = Histogram::from_values(values, BINS).ok_or(SegmentationError::EmptyPopulation)?;
    if hist.max <= hist.min {
        return Err(SegmentationError::FlatPopulation { value: hist.min });
    }

    let split = otsu_split(&hist);
    let otsu = hist.bin_edge(split);
    let mixture = fit_mixture(&hist, split);

    let (value, source) = match mixture.as_ref().and_then(MixtureFit::crossover) {
        Some(x) => (x as f32, ThresholdSource::Mixture),
        None => {
            tracing::debug!("Mixture fit degenerate, using Otsu split");
            (otsu, ThresholdSource::Otsu)
        }
    };

    Ok(ThresholdFit {
        threshold: Threshold {
            value,
            source,
            basis,
        },
        report: Some(HistogramReport {
            bin_centers: hist.centers(),
            counts: hist.counts.clone(),
            otsu,
            mixture,
            threshold: value,
            source,
        }),
    })
}

/// Compensate lighting drift between timepoints.
///
/// Compares the agar level of `image` (pixels the reference mask calls
/// background, inside `window`) with the plate's average background and
/// shifts the image by the difference. Returns the shifted image and the
/// offset, which the caller adds to the threshold. Raw intensities and
/// disabled drift correction give a zero offset and the image unchanged.
pub fn compensate_drift(
    image: Intensities,
    reference_mask: &SegmentationMask,
    window: Window,
    average_background: f32,
    enabled: bool,
) -> (Intensities, f32) {
    let Intensities::Corrected(pixels) = image else {
        return (image, 0.0);
    };
    if !enabled {
        return (Intensities::Corrected(pixels), 0.0);
    }

    let agar = crate::math::mean(
        window
            .pixels()
            .filter(|&(x, y)| !reference_mask.get_xy(x, y))
            .map(|p| pixels[p]),
    );
    let Some(agar) = agar else {
        return (Intensities::Corrected(pixels), 0.0);
    };

    let delta = average_background - agar;
    tracing::debug!("Drift offset {:+.4}", delta);
    (Intensities::Corrected(pixels.map(|&v| v + delta)), delta)
}

/// Mask of pixels at or above the threshold.
///
/// Panics if the image and threshold disagree on correction.
pub fn segment(image: &Intensities, threshold: &Threshold) -> SegmentationMask {
    assert_eq!(
        image.basis(),
        threshold.basis,
        "threshold fitted on {:?} intensities applied to {:?} intensities",
        threshold.basis,
        image.basis()
    );
    let pixels = image.pixels();
    let bits: Vec<bool> = pixels.iter().map(|&v| v >= threshold.value).collect();
    BitBuffer2::from_slice(pixels.width(), pixels.height(), &bits)
}

//! Colonyzer - colony growth quantification for gridded culture plates.
//!
//! Images of the same plate (grouped by a barcode in their file names) are
//! calibrated to a grid of culture positions, corrected for uneven lighting,
//! segmented with one threshold per plate and reduced to one measurement per
//! grid cell per image.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use colonyzer::{Config, FileDiagnostics, FileImageSource, MarkerFileClaim, Pipeline};
//!
//! let config = Config::from_yaml_file("colonyzer.yaml".as_ref())?.validate()?;
//! let summary = Pipeline::new(&config, &MarkerFileClaim, &FileImageSource, &FileDiagnostics).run()?;
//!
//! println!("Processed {} plates", summary.processed.len());
//! ```

pub mod barcode_index;
pub mod calibration;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod grid;
pub mod layout;
pub mod lighting;
pub(crate) mod math;
pub mod measurement;
pub mod pipeline;
pub mod plate_image;
pub mod segmentation;
pub mod work_claim;

#[cfg(test)]
pub mod testing;

// ============================================================================
// Configuration and errors
// ============================================================================

pub use config::{Config, GridFormat, RunConfig};
pub use error::{
    CalibrationError, ClaimError, ConfigError, Error, ImageError, IndexError, OutputError,
    Result, SegmentationError,
};

// ============================================================================
// Inputs and coordination
// ============================================================================

pub use barcode_index::{BarcodeBatch, BarcodeIndex, BarcodeRange, ImageRecord};
pub use layout::OutputLayout;
pub use plate_image::{FileImageSource, ImageSource, PlateImage};
pub use work_claim::{MarkerFileClaim, WorkClaim};

// ============================================================================
// Analysis stages
// ============================================================================

pub use calibration::{GridCalibration, Instructions, Landmarks, calibrate};
pub use grid::{Cell, Grid, Window};
pub use lighting::{CorrectionModel, LightingMode, build_correction};
pub use measurement::{MeasurementRecord, measure};
pub use segmentation::{Intensities, SegmentationMask, Threshold, ThresholdSource, segment};

// ============================================================================
// Orchestration and diagnostics
// ============================================================================

pub use diagnostics::{DiagnosticsSink, FileDiagnostics, NoDiagnostics, Overlay};
pub use pipeline::{BatchOutcome, Pipeline, RunSummary};

//! Error types for the analysis pipeline.
//!
//! Each stage has its own error enum so callers can tell a configuration
//! problem (fatal for the run) from a calibration or image problem (fatal
//! for one barcode only). [`Error`] wraps them for code that does not care.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Problems with the run configuration. Reported before any image is opened.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Too many dimensions specified for rectangular grid format: {tokens:?}")]
    TooManyDimensions { tokens: Vec<String> },

    #[error("No grid format specified")]
    MissingFormat,

    #[error("Unrecognised grid format '{token}' (expected 96, 384, 768, 1536 or ROWSxCOLS)")]
    UnknownFormat { token: String },

    #[error("Grid format must have at least one row and one column, got {nrow}x{ncol}")]
    EmptyGrid { nrow: usize, ncol: usize },

    #[error("Manifest file '{path}' does not exist")]
    MissingManifest { path: PathBuf },

    #[error("Search directory '{path}' does not exist")]
    MissingSearchDir { path: PathBuf },

    #[error("Failed to read configuration file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse configuration file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },
}

/// Problems building the barcode index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Failed to read image directory '{path}': {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read manifest '{path}': {source}")]
    ReadManifest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse manifest '{path}': {source}")]
    ParseManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Problems creating or probing a lock marker (other than losing a race).
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("Failed to create lock marker '{path}': {source}")]
    CreateMarker {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Problems locating the culture grid. Fatal for the barcode only.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Grid format {nrow}x{ncol} has no cells")]
    EmptyGrid { nrow: usize, ncol: usize },

    #[error("No calibration entry for '{image}' and no default entry")]
    NoEntry { image: String },

    #[error("Failed to read calibration file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed calibration line {line} in '{path}': {reason}")]
    MalformedLine {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Calibration entry '{name}' is {entry_nrow}x{entry_ncol} but the run uses {nrow}x{ncol}")]
    FormatMismatch {
        name: String,
        entry_nrow: usize,
        entry_ncol: usize,
        nrow: usize,
        ncol: usize,
    },

    #[error("Image {width}x{height} is too small for a {nrow}x{ncol} grid")]
    ImageTooSmall {
        width: usize,
        height: usize,
        nrow: usize,
        ncol: usize,
    },

    #[error("Degenerate grid spacing dx={dx}, dy={dy}")]
    DegenerateSpacing { dx: f32, dy: f32 },
}

/// Problems loading a plate image. Aborts the remaining images of a barcode.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Failed to load image '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Image '{path}' is empty")]
    Empty { path: PathBuf },

    #[error("Image '{path}' is {actual:?} but the plate reference is {expected:?}")]
    DimensionMismatch {
        path: PathBuf,
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Problems choosing a segmentation threshold.
#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("No pixels to fit a threshold to")]
    EmptyPopulation,

    #[error("All pixels have intensity {value}; no threshold separates them")]
    FlatPopulation { value: f32 },

    #[error("Threshold {threshold} exceeds the maximum intensity {maximum}; every pixel would be background")]
    AboveMaximum { threshold: f32, maximum: f32 },
}

/// Problems writing results.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to create output directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize '{path}': {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode image '{path}': {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Any pipeline error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Segmentation(#[from] SegmentationError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

pub type Result<T> = std::result::Result<T, Error>;

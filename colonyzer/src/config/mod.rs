//! Run configuration.
//!
//! [`Config`] mirrors the options an operator can set (it deserializes from
//! YAML with every field optional). [`Config::validate`] turns it into a
//! [`RunConfig`], which is built once per run and passed by reference to
//! every stage. Nothing in the crate reads options from global state.

mod grid_format;


use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::barcode_index::BarcodeRange;
use crate::error::ConfigError;
use crate::lighting::LightingMode;

pub use grid_format::GridFormat;

/// Options as supplied by the operator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Correct spatial lighting gradients with a pseudo-empty plate.
    pub lighting_correction: bool,
    /// Compensate lighting drift between timepoints. Needs lighting correction.
    pub drift_correction: bool,
    /// Write overlay images and histogram reports.
    pub diagnostics: bool,
    /// Take culture positions from `Colonyzer.txt` instead of detecting them.
    pub use_stored_calibration: bool,
    /// Nudge stored positions onto the colonies of the latest image. Off
    /// means stored positions are used exactly as written.
    pub refine_positions: bool,
    /// Cut colony signal out of the earliest image to build the pseudo-empty
    /// plate. Needs lighting correction.
    pub remove_signal: bool,
    /// Only report warnings and errors.
    pub quiet: bool,
    /// Directory scanned for images when no manifest is given.
    pub search_dir: PathBuf,
    /// Root of the screen filestore, used to resolve a manifest given as a
    /// screen identifier.
    pub logs_dir: PathBuf,
    /// Where rolling log files go. Defaults to `logs` inside `search_dir`.
    pub log_file_dir: Option<PathBuf>,
    /// Segmentation threshold. Negative or absent means automatic.
    pub fixed_threshold: Option<f32>,
    /// JSON manifest path (`*.json`) or screen identifier.
    pub manifest: Option<String>,
    /// Grid format tokens: `["384"]`, `["24x16"]` or `["24", "16"]`.
    pub grid_format: Vec<String>,
    /// Filename slice holding the barcode.
    pub barcode_range: BarcodeRange,
    /// Seed for the inpainting sampler, so reruns are reproducible.
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lighting_correction: false,
            drift_correction: false,
            diagnostics: false,
            use_stored_calibration: false,
            refine_positions: true,
            remove_signal: false,
            quiet: false,
            search_dir: PathBuf::from("."),
            logs_dir: PathBuf::from("."),
            log_file_dir: None,
            fixed_threshold: None,
            manifest: None,
            grid_format: vec!["384".to_string()],
            barcode_range: BarcodeRange::default(),
            seed: 0,
        }
    }
}

impl Config {
    /// Load options from a YAML file. Missing fields take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(text)
    }

    /// Directory for rolling log files.
    pub fn log_directory(&self) -> PathBuf {
        self.log_file_dir
            .clone()
            .unwrap_or_else(|| self.search_dir.join("logs"))
    }

    /// Check the options and resolve derived settings.
    pub fn validate(&self) -> Result<RunConfig, ConfigError> {
        let format = GridFormat::from_tokens(&self.grid_format)?;

        let manifest = match &self.manifest {
            None => None,
            Some(name) => {
                let path = resolve_manifest(name, &self.logs_dir);
                if !path.exists() {
                    return Err(ConfigError::MissingManifest { path });
                }
                Some(path)
            }
        };

        if manifest.is_none() && !self.search_dir.is_dir() {
            return Err(ConfigError::MissingSearchDir {
                path: self.search_dir.clone(),
            });
        }

        let lighting = match (self.lighting_correction, self.remove_signal) {
            (false, _) => LightingMode::Off,
            (true, false) => LightingMode::AsIs,
            (true, true) => LightingMode::RemoveSignal,
        };

        Ok(RunConfig {
            format,
            lighting,
            drift_correction: self.lighting_correction && self.drift_correction,
            diagnostics: self.diagnostics,
            use_stored_calibration: self.use_stored_calibration,
            refine_positions: self.refine_positions,
            verbose: !self.quiet,
            search_dir: self.search_dir.clone(),
            manifest,
            fixed_threshold: self.fixed_threshold.filter(|t| *t >= 0.0),
            barcode_range: self.barcode_range,
            seed: self.seed,
        })
    }
}

/// Validated, resolved options for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub format: GridFormat,
    pub lighting: LightingMode,
    /// Effective only when lighting correction is on.
    pub drift_correction: bool,
    pub diagnostics: bool,
    pub use_stored_calibration: bool,
    /// Refine stored positions. Detected positions are always refined.
    pub refine_positions: bool,
    pub verbose: bool,
    pub search_dir: PathBuf,
    pub manifest: Option<PathBuf>,
    /// Non-negative fixed threshold, or `None` for automatic thresholding.
    pub fixed_threshold: Option<f32>,
    pub barcode_range: BarcodeRange,
    pub seed: u64,
}

impl RunConfig {
    /// Options for analysing `search_dir` with everything else at defaults.
    pub fn for_directory(search_dir: impl Into<PathBuf>, format: GridFormat) -> Self {
        Self {
            format,
            lighting: LightingMode::Off,
            drift_correction: false,
            diagnostics: false,
            use_stored_calibration: false,
            refine_positions: true,
            verbose: true,
            search_dir: search_dir.into(),
            manifest: None,
            fixed_threshold: None,
            barcode_range: BarcodeRange::default(),
            seed: 0,
        }
    }

    #[inline]
    pub fn lighting_correction(&self) -> bool {
        self.lighting != LightingMode::Off
    }

    /// Report the effective options.
    pub fn log_summary(&self) {
        if !self.verbose {
            return;
        }

        tracing::info!("Grid format: {}", self.format);
        match self.lighting {
            LightingMode::Off => tracing::info!("Lighting correction turned off."),
            LightingMode::AsIs => tracing::info!(
                "Lighting correction turned on, using the earliest image as-is as the pseudo-empty plate."
            ),
            LightingMode::RemoveSignal => tracing::info!(
                "Lighting correction turned on, cutting culture signal from the earliest image to make a pseudo-empty plate."
            ),
        }
        if self.lighting_correction() {
            if self.drift_correction {
                tracing::info!("Correcting for lighting differences between images of the same plate.");
            } else {
                tracing::info!("Lighting differences between images of the same plate will be ignored.");
            }
        }
        if self.diagnostics {
            tracing::info!("Overlay images and threshold reports will be written.");
        }
        if self.use_stored_calibration {
            if self.refine_positions {
                tracing::info!("Using stored culture positions from Colonyzer.txt, refined on each plate.");
            } else {
                tracing::info!("Using stored culture positions from Colonyzer.txt as written.");
            }
        } else {
            tracing::info!("Searching for culture positions automatically.");
        }
        match self.fixed_threshold {
            Some(t) => tracing::info!("Images will be segmented using fixed threshold {}.", t),
            None => tracing::info!("Image segmentation by automatic thresholding."),
        }
        match &self.manifest {
            Some(path) => tracing::info!("Loading barcodes from {}.", path.display()),
            None => tracing::info!("Searching for images in {}.", self.search_dir.display()),
        }
    }
}

/// Resolve a manifest argument: a `.json` path is used as given, anything else
/// is a screen identifier located inside the screen filestore.
pub fn resolve_manifest(name: &str, logs_dir: &Path) -> PathBuf {
    if name.ends_with(".json") || name.ends_with(".JSON") {
        return PathBuf::from(name);
    }

    let experiment_type = name
        .char_indices()
        .rev()
        .nth(3)
        .map(|(idx, _)| &name[..idx])
        .unwrap_or("");
    logs_dir
        .join(format!("{experiment_type}_EXPERIMENTS"))
        .join(name)
        .join("AUXILIARY")
        .join(format!("{name}_C2.json"))
}

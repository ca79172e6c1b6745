//! File utility functions for listing and filtering files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Raster formats a plate scanner or camera is expected to produce.
pub const RASTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "bmp"];

/// Returns `true` if the path has one of the given extensions (case-insensitive).
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| extensions.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Returns paths to all regular files in `dir` matching the given extensions,
/// sorted by file name.
///
/// Unlike a best-effort listing, an unreadable directory is an error: callers
/// that scan for work must not mistake it for an empty backlog.
pub fn files_with_extensions(dir: &Path, extensions: &[&str]) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Returns paths to all raster image files in the given directory.
pub fn raster_image_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    files_with_extensions(dir, RASTER_EXTENSIONS)
}

/// File name without directory and without the last extension.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

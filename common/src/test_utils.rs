//! Locations for artefacts that tests leave behind for inspection.

use std::path::{Path, PathBuf};

const OUTPUT_DIR: &str = "test_output";

/// Parent of this crate's manifest directory.
fn workspace_root() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap_or(Path::new("."))
}

/// Path under `<workspace>/test_output` for an artefact such as a rendered
/// overlay. `name` may contain subdirectories; missing ones are created.
pub fn test_output_path(name: &str) -> PathBuf {
    let path = workspace_root().join(OUTPUT_DIR).join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| panic!("Failed to create {}: {}", parent.display(), e));
    }
    path
}

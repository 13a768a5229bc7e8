//! Locating packages produced by makepkg

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::absolute;
use crate::error::Result;
use crate::models::ArtifactFormat;

/// List the package archives directly inside `dir` as absolute paths
///
/// Directory listing order is kept; files without the format's suffix
/// (signatures, logs, markers) are ignored.
pub fn collect_artifacts(dir: &Path, format: ArtifactFormat) -> Result<Vec<PathBuf>> {
    let dir = absolute(dir)?;

    let mut artifacts = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if format.matches(&path) && path.is_file() {
            artifacts.push(path);
        }
    }
    Ok(artifacts)
}

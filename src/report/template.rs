//! Bundled template provisioning.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{AppError, AppResult};
use crate::settings::Paths;

/// Assets the application cannot work without.
///
/// Missing ones are reported as warnings at startup; generation fails later
/// with [`AppError::TemplateMissing`].
#[derive(Debug, Clone)]
pub struct AssetPolicy {
    required: Vec<(&'static str, PathBuf)>,
}

impl AssetPolicy {
    pub fn for_paths(paths: &Paths) -> Self {
        AssetPolicy {
            required: vec![("Report template", paths.bundled_template())],
        }
    }

    /// One message per missing required asset
    pub fn warnings(&self) -> Vec<String> {
        self.required
            .iter()
            .filter(|(_, path)| !path.is_file())
            .map(|(label, path)| {
                warn!("{label} not found at {}", path.display());
                format!("{label} missing: {}", path.display())
            })
            .collect()
    }
}

/// Make sure a writable copy of `bundled` exists in `scratch_dir`.
///
/// The copy is refreshed when the bundled template is newer.
pub fn ensure_writable_template(bundled: &Path, scratch_dir: &Path) -> AppResult<PathBuf> {
    if !bundled.is_file() {
        return Err(AppError::TemplateMissing(bundled.to_path_buf()));
    }
    let file_name = bundled
        .file_name()
        .ok_or_else(|| AppError::TemplateMissing(bundled.to_path_buf()))?;

    fs::create_dir_all(scratch_dir)?;
    let copy = scratch_dir.join(file_name);

    let stale = match (fs::metadata(&copy), fs::metadata(bundled)) {
        (Ok(existing), Ok(source)) => match (existing.modified(), source.modified()) {
            (Ok(existing), Ok(source)) => source > existing,
            _ => false,
        },
        _ => true,
    };

    if stale {
        fs::copy(bundled, &copy)?;
        info!("Copied template to {}", copy.display());
    }
    Ok(copy)
}

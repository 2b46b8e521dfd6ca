//! Last-used save directory, remembered across runs.
//!
//! The preference file holds a single line: the directory path.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::AppResult;

/// Name of the per-user preference file in the home directory
pub const PREFERENCE_FILE: &str = ".report_app_path.txt";

/// Persisted save-directory preference
#[derive(Debug, Clone)]
pub struct Preferences {
    file: PathBuf,
    save_dir: PathBuf,
}

impl Preferences {
    /// Load the preference, falling back to `default_dir` (created if absent)
    pub fn load(file: PathBuf, default_dir: &Path) -> AppResult<Self> {
        let stored = match fs::read_to_string(&file) {
            Ok(content) => {
                let trimmed = content.trim();
                (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Could not read {}: {e}", file.display());
                None
            }
        };

        let save_dir = match stored {
            Some(dir) => dir,
            None => {
                fs::create_dir_all(default_dir)?;
                default_dir.to_path_buf()
            }
        };

        info!("Save directory: {}", save_dir.display());
        Ok(Preferences { file, save_dir })
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Remember a new save directory, overwriting the preference file
    pub fn set_save_dir(&mut self, dir: PathBuf) -> AppResult<()> {
        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.file, dir.to_string_lossy().as_bytes())?;
        info!("Save directory changed to {}", dir.display());
        self.save_dir = dir;
        Ok(())
    }
}

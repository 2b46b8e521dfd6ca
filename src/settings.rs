//! Immutable application configuration.
//!
//! Built once at startup and passed by reference to the components that need
//! it. The built-in catalog can be replaced by a `report_config.json` placed
//! next to the executable.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::data::{CatalogEntry, DatabaseDescriptor, TableCatalog};
use crate::error::{AppError, AppResult};

/// Optional override file in the asset directory
pub const CONFIG_FILE: &str = "report_config.json";
/// Bundled template in the asset directory
pub const TEMPLATE_FILE: &str = "Report_Template.xlsx";

/// Text shown in the About dialog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AboutInfo {
    pub company: String,
    pub app_name: String,
    pub project: String,
    pub website: String,
}

impl Default for AboutInfo {
    fn default() -> Self {
        AboutInfo {
            company: "Premium Industrial Solutions Pvt. Ltd.".to_string(),
            app_name: "Database to Excel Report Generator".to_string(),
            project: "BBPL KINLEY RO & MIS".to_string(),
            website: "pisplindustry.com".to_string(),
        }
    }
}

/// Contents of `report_config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub databases: Vec<DatabaseDescriptor>,
    pub tables: TableCatalog,
    #[serde(default)]
    pub about: AboutInfo,
}

impl CatalogFile {
    fn validate(&self) -> AppResult<()> {
        if self.databases.is_empty() {
            return Err(AppError::Config("no databases defined".to_string()));
        }
        if let Some(db) = self
            .tables
            .databases()
            .find(|name| !self.databases.iter().any(|d| d.name == *name))
        {
            return Err(AppError::Config(format!(
                "tables listed for undefined database '{db}'"
            )));
        }
        Ok(())
    }
}

/// Fixed filesystem locations used by the application
#[derive(Debug, Clone)]
pub struct Paths {
    /// Directory holding the bundled template
    pub assets_dir: PathBuf,
    /// Default save directory, `~/Reports`
    pub reports_dir: PathBuf,
    /// Writable template copy and log file, `~/Reports/_template`
    pub scratch_dir: PathBuf,
    /// Save-directory preference file
    pub preference_file: PathBuf,
}

impl Paths {
    /// Resolve all locations relative to a home directory and an asset directory
    pub fn new(home: &Path, assets_dir: PathBuf) -> Self {
        let reports_dir = home.join("Reports");
        Paths {
            assets_dir,
            scratch_dir: reports_dir.join("_template"),
            reports_dir,
            preference_file: home.join(crate::prefs::PREFERENCE_FILE),
        }
    }

    /// Locations for the current user and executable
    pub fn detect() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let assets_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .filter(|dir| dir.join(TEMPLATE_FILE).exists())
            .unwrap_or_else(|| PathBuf::from("."));
        Paths::new(&home, assets_dir)
    }

    pub fn bundled_template(&self) -> PathBuf {
        self.assets_dir.join(TEMPLATE_FILE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.scratch_dir.join(concat!(env!("CARGO_PKG_NAME"), ".log"))
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub databases: Vec<DatabaseDescriptor>,
    pub catalog: TableCatalog,
    pub about: AboutInfo,
    pub paths: Paths,
}

impl AppConfig {
    /// Built-in catalog with the given paths
    pub fn with_defaults(paths: Paths) -> Self {
        let server = r"DESKTOP-87HT9VP\WINCC";
        let descriptor = |name: &str| DatabaseDescriptor {
            name: name.to_string(),
            server: server.to_string(),
            driver: "ODBC Driver 17 for SQL Server".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
        };
        let tables = |names: &[&str]| -> Vec<String> {
            names.iter().map(|s| s.to_string()).collect()
        };

        AppConfig {
            databases: vec![descriptor("KINLEY_MIS_DB"), descriptor("KINLEY_RO_DB")],
            catalog: TableCatalog::new(vec![
                CatalogEntry {
                    database: "KINLEY_MIS_DB".to_string(),
                    tables: tables(&["CP_CPK", "Mis_mean_stdev", "mis_tab"]),
                },
                CatalogEntry {
                    database: "KINLEY_RO_DB".to_string(),
                    tables: tables(&[
                        "all_data",
                        "RIO_DATA",
                        "RO_CP_CPK",
                        "RO_mean_stdev",
                        "ro_tab",
                        "TOTALIZER",
                    ]),
                },
            ]),
            about: AboutInfo::default(),
            paths,
        }
    }

    /// Load configuration, applying `report_config.json` when present
    pub fn load(paths: Paths) -> AppResult<Self> {
        let file = paths.assets_dir.join(CONFIG_FILE);
        if !file.exists() {
            return Ok(Self::with_defaults(paths));
        }

        let content = fs::read_to_string(&file)?;
        let parsed: CatalogFile = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("{}: {e}", file.display())))?;
        parsed.validate()?;
        info!(
            "Loaded {} databases from {}",
            parsed.databases.len(),
            file.display()
        );

        Ok(AppConfig {
            databases: parsed.databases,
            catalog: parsed.tables,
            about: parsed.about,
            paths,
        })
    }

    pub fn database(&self, name: &str) -> Option<&DatabaseDescriptor> {
        self.databases.iter().find(|d| d.name == name)
    }

    pub fn database_names(&self) -> Vec<String> {
        self.databases.iter().map(|d| d.name.clone()).collect()
    }
}

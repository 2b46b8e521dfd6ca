//! dbreport-tui: a terminal form that exports a date range of SQL Server rows
//! into a formatted Excel report template.

mod app;
mod data;
mod error;
mod form;
mod pipeline;
mod prefs;
mod report;
mod settings;
mod ui;

use std::fs::{self, OpenOptions};

use anyhow::{Context, Result};
use log::{info, LevelFilter};

use prefs::Preferences;
use report::AssetPolicy;
use settings::{AppConfig, Paths};

fn main() -> Result<()> {
    let paths = Paths::detect();

    // Initialize logger to file (truncate on each run)
    fs::create_dir_all(&paths.scratch_dir)
        .with_context(|| format!("Failed to create {}", paths.scratch_dir.display()))?;
    let log_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(paths.log_file())
        .context("Failed to open log file")?;
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();
    info!("Starting {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let warnings = AssetPolicy::for_paths(&paths).warnings();
    let prefs = Preferences::load(paths.preference_file.clone(), &paths.reports_dir)
        .context("Failed to load preferences")?;
    let config = AppConfig::load(paths).context("Failed to load configuration")?;

    app::run(config, prefs, warnings)
}

//! Unified error type for the report pipeline.
//!
//! Every stage (query building, fetching, rendering, preferences) returns
//! `AppError`, so the form can surface any failure in a single dialog.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Form
    #[error("Table not selected")]
    NoTableSelected,

    #[error("Unknown database: {0}")]
    UnknownDatabase(String),

    // Query
    #[error("Invalid date/time '{0}', expected YYYY-MM-DD HH:MM:SS")]
    InvalidDateTime(String),

    #[error("Database error: {0}")]
    Database(#[from] tiberius::error::Error),

    // Assets
    #[error("Report template not found: {}", .0.display())]
    TemplateMissing(PathBuf),

    #[error("Unsupported image file: {}", .0.display())]
    UnsupportedImage(PathBuf),

    // Rendering
    #[error("Invalid workbook: {0}")]
    Workbook(String),

    #[error("Workbook archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Workbook XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Report already exists: {}", .0.display())]
    ReportExists(PathBuf),

    // Configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<quick_xml::events::attributes::AttrError> for AppError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        AppError::Xml(quick_xml::Error::from(e))
    }
}

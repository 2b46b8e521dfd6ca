//! Excel report rendering.
//!
//! The writable template copy is opened as a package, its active sheet is
//! filled in memory and the result is saved under a new, timestamped name.
//! The template file itself is only ever read.

mod cell;
mod drawing;
mod package;
mod sheet;
mod styles;
pub mod template;
mod xml;

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::info;

use crate::data::ResultSet;
use crate::error::{AppError, AppResult};

pub use template::{ensure_writable_template, AssetPolicy};

use cell::{CellContent, CellStyle, CellWrite};
use package::XlsxPackage;

/// Row holding the result column names
pub const HEADER_ROW: u32 = 9;
/// First data row
pub const FIRST_DATA_ROW: u32 = 10;

/// Everything the renderer needs besides the rows
#[derive(Debug, Clone)]
pub struct ReportRequest<'a> {
    /// Writable template copy
    pub template: &'a Path,
    pub save_dir: &'a Path,
    pub database: &'a str,
    pub table: &'a str,
    /// Range bounds exactly as entered
    pub start: &'a str,
    pub end: &'a str,
    pub image: Option<&'a Path>,
    /// Local time used for the output file name
    pub generated_at: NaiveDateTime,
}

/// `<table>_<YYYYMMDD>_<HHMMSS>.xlsx`
pub fn report_file_name(table: &str, at: NaiveDateTime) -> String {
    format!("{table}_{}.xlsx", at.format("%Y%m%d_%H%M%S"))
}

fn header_block(request: &ReportRequest) -> AppResult<Vec<CellWrite>> {
    [
        ("A6", request.database, CellStyle::Title),
        ("A7", request.table, CellStyle::Subtitle),
        ("A8", "Start DateTime:", CellStyle::Label),
        ("B8", request.start, CellStyle::Label),
        ("C8", "End DateTime:", CellStyle::Label),
        ("D8", request.end, CellStyle::Label),
    ]
    .into_iter()
    .map(|(reference, text, style)| {
        CellWrite::text(reference, text, style)
            .ok_or_else(|| AppError::Workbook(format!("bad cell reference {reference}")))
    })
    .collect()
}

fn table_cells(result: &ResultSet) -> Vec<CellWrite> {
    let headers = result.columns.iter().enumerate().map(|(i, name)| CellWrite {
        row: HEADER_ROW,
        col: i as u32 + 1,
        content: CellContent::Text(name.clone()),
        style: CellStyle::Header,
    });
    let data = result.rows.iter().enumerate().flat_map(|(r, row)| {
        row.iter()
            .enumerate()
            .map(move |(c, value)| CellWrite::data(FIRST_DATA_ROW + r as u32, c as u32 + 1, value))
    });
    headers.chain(data).collect()
}

/// Render `result` into a new report file and return its path
pub fn render_report(result: &ResultSet, request: &ReportRequest) -> AppResult<PathBuf> {
    let mut package = XlsxPackage::open(request.template)?;
    let sheet_part = package.active_sheet_part()?;
    let styles_part = package.styles_part()?;

    let styles_xml = package
        .part(&styles_part)
        .ok_or_else(|| AppError::Workbook(format!("missing part {styles_part}")))?;
    let (styles_xml, style_ids) = styles::register_styles(styles_xml)?;
    package.set_part(&styles_part, styles_xml);

    let drawing_rel = match request.image {
        Some(image) => drawing::embed_image(&mut package, &sheet_part, image)?,
        None => None,
    };

    let mut cells = header_block(request)?;
    cells.extend(table_cells(result));

    let sheet_xml = package
        .part(&sheet_part)
        .ok_or_else(|| AppError::Workbook(format!("missing part {sheet_part}")))?;
    let sheet_xml = sheet::apply_cells(sheet_xml, &cells, &style_ids, drawing_rel.as_deref())?;
    package.set_part(&sheet_part, sheet_xml);

    let output = request
        .save_dir
        .join(report_file_name(request.table, request.generated_at));
    package.save_new(&output)?;

    info!(
        "Wrote {} rows x {} columns to {}",
        result.len(),
        result.columns.len(),
        output.display()
    );
    Ok(output)
}

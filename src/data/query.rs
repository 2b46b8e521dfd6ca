//! Range query construction.
//!
//! Tables store `DateAndTime` as text in one of two conventions. The
//! convention is selected per table through [`TABLE_DATE_STYLES`] and passed
//! to `TRY_CONVERT` as a SQL Server style code, so rows that cannot be parsed
//! are dropped by the server instead of failing the query.

use chrono::NaiveDateTime;

use crate::error::{AppError, AppResult};

use super::models::QueryParameters;

/// Format of the date/time strings entered in the form
pub const INPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Textual date convention of a table's `DateAndTime` column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStyle {
    /// `dd-mm-yyyy hh:mi:ss`, SQL Server style 105
    DayFirst,
    /// `yyyy-mm-dd hh:mi:ss`, SQL Server style 120
    Odbc,
}

/// Tables whose stored dates are not in the default ODBC convention
pub const TABLE_DATE_STYLES: &[(&str, DateStyle)] = &[
    ("mis_tab", DateStyle::DayFirst),
    ("all_data", DateStyle::DayFirst),
    ("TOTALIZER", DateStyle::DayFirst),
    ("RIO_DATA", DateStyle::DayFirst),
];

impl DateStyle {
    /// Look up the convention for a table (exact, case-sensitive match)
    pub fn for_table(table: &str) -> Self {
        TABLE_DATE_STYLES
            .iter()
            .find(|(name, _)| *name == table)
            .map(|(_, style)| *style)
            .unwrap_or(DateStyle::Odbc)
    }

    /// SQL Server `CONVERT` style code
    pub fn code(self) -> u8 {
        match self {
            DateStyle::DayFirst => 105,
            DateStyle::Odbc => 120,
        }
    }

    /// Render a bound in this convention
    pub fn format(self, value: &NaiveDateTime) -> String {
        match self {
            DateStyle::DayFirst => value.format("%d-%m-%Y %H:%M:%S").to_string(),
            DateStyle::Odbc => value.format(INPUT_FORMAT).to_string(),
        }
    }
}

/// A ready-to-execute statement with its two bound values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub sql: String,
    pub style: DateStyle,
    /// Value for `@P1`
    pub start: String,
    /// Value for `@P2`
    pub end: String,
}

/// Parse a form bound (`YYYY-MM-DD HH:MM:SS`)
pub fn parse_bound(value: &str) -> AppResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), INPUT_FORMAT)
        .map_err(|_| AppError::InvalidDateTime(value.to_string()))
}

/// Quote an identifier for use inside `[...]`
fn bracket(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}

/// Build the range query for a table.
///
/// Start after end is not an error; the query just matches nothing.
pub fn build_query(params: &QueryParameters) -> AppResult<BuiltQuery> {
    let style = DateStyle::for_table(&params.table);
    let start = style.format(&parse_bound(&params.start)?);
    let end = style.format(&parse_bound(&params.end)?);

    let code = style.code();
    let column = format!("TRY_CONVERT(DATETIME, DateAndTime, {code})");
    let sql = format!(
        "SELECT *\n\
         FROM {db}.dbo.{table}\n\
         WHERE {column} >= TRY_CONVERT(DATETIME, @P1, {code})\n\
         AND {column} <= TRY_CONVERT(DATETIME, @P2, {code})\n\
         ORDER BY {column} DESC",
        db = bracket(&params.database),
        table = bracket(&params.table),
    );

    Ok(BuiltQuery {
        sql,
        style,
        start,
        end,
    })
}

//! Cell addressing and cell content for the report sheet.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::data::CellValue;

/// Visual style applied to a written cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellStyle {
    /// Database name: bold 14pt, centered both ways
    Title,
    /// Table name: bold 12pt, centered both ways
    Subtitle,
    /// Range labels and values: bold, centered both ways
    Label,
    /// Column names: bold, centered
    Header,
    /// Data cells: centered
    Data,
    DataDateTime,
    DataDate,
    DataTime,
}

impl CellStyle {
    pub const ALL: [CellStyle; 8] = [
        CellStyle::Title,
        CellStyle::Subtitle,
        CellStyle::Label,
        CellStyle::Header,
        CellStyle::Data,
        CellStyle::DataDateTime,
        CellStyle::DataDate,
        CellStyle::DataTime,
    ];

    /// Font override, `None` keeps the workbook's default font
    pub fn font(self) -> Option<FontSpec> {
        match self {
            CellStyle::Title => Some(FontSpec { bold: true, size: Some(14.0) }),
            CellStyle::Subtitle => Some(FontSpec { bold: true, size: Some(12.0) }),
            CellStyle::Label | CellStyle::Header => Some(FontSpec { bold: true, size: None }),
            _ => None,
        }
    }

    pub fn vertical_center(self) -> bool {
        matches!(self, CellStyle::Title | CellStyle::Subtitle | CellStyle::Label)
    }

    pub fn number_format(self) -> NumberFormat {
        match self {
            CellStyle::DataDateTime => NumberFormat::Custom("yyyy-mm-dd hh:mm:ss"),
            CellStyle::DataDate => NumberFormat::Custom("yyyy-mm-dd"),
            // Built-in "h:mm:ss"
            CellStyle::DataTime => NumberFormat::Builtin(21),
            _ => NumberFormat::Builtin(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontSpec {
    pub bold: bool,
    pub size: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormat {
    Builtin(u32),
    Custom(&'static str),
}

/// Value stored in a cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Empty,
    Text(String),
    Number(f64),
    /// Whole numbers keep every digit, including beyond 2^53
    Integer(i64),
    Bool(bool),
}

/// One cell to be written, 1-based row and column
#[derive(Debug, Clone, PartialEq)]
pub struct CellWrite {
    pub row: u32,
    pub col: u32,
    pub content: CellContent,
    pub style: CellStyle,
}

impl CellWrite {
    pub fn text(reference: &str, text: &str, style: CellStyle) -> Option<Self> {
        let (row, col) = parse_ref(reference)?;
        Some(CellWrite {
            row,
            col,
            content: CellContent::Text(text.to_string()),
            style,
        })
    }

    /// Data cell for a fetched value
    pub fn data(row: u32, col: u32, value: &CellValue) -> Self {
        let (content, style) = match value {
            CellValue::Null => (CellContent::Empty, CellStyle::Data),
            CellValue::Bool(b) => (CellContent::Bool(*b), CellStyle::Data),
            CellValue::Int(i) => (CellContent::Integer(*i), CellStyle::Data),
            CellValue::Float(f) if f.is_finite() => (CellContent::Number(*f), CellStyle::Data),
            CellValue::Float(_) => (CellContent::Empty, CellStyle::Data),
            CellValue::Text(s) => (CellContent::Text(s.clone()), CellStyle::Data),
            // Excel has no serial before 1900, such values stay readable as text
            CellValue::DateTime(dt) => match excel_serial(dt) {
                Some(serial) => (CellContent::Number(serial), CellStyle::DataDateTime),
                None => (
                    CellContent::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
                    CellStyle::Data,
                ),
            },
            CellValue::Date(d) => match excel_date_serial(d) {
                Some(serial) => (CellContent::Number(serial), CellStyle::DataDate),
                None => (CellContent::Text(d.format("%Y-%m-%d").to_string()), CellStyle::Data),
            },
            CellValue::Time(t) => (CellContent::Number(excel_time_fraction(t)), CellStyle::DataTime),
        };
        CellWrite {
            row,
            col,
            content,
            style,
        }
    }

    pub fn reference(&self) -> String {
        cell_ref(self.row, self.col)
    }
}

/// Column letters for a 1-based column index
pub fn column_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// A1-style reference for a 1-based row and column
pub fn cell_ref(row: u32, col: u32) -> String {
    format!("{}{row}", column_letters(col))
}

/// Parse an A1-style reference into 1-based (row, col); `$` markers are ignored
pub fn parse_ref(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let col = letters
        .chars()
        .try_fold(0u32, |acc, c| {
            acc.checked_mul(26)?
                .checked_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)
        })?;
    let row: u32 = digits.parse().ok()?;
    (row > 0).then_some((row, col))
}

/// Excel serial number (1900 date system) for a date-time, `None` before 1900
pub fn excel_serial(dt: &NaiveDateTime) -> Option<f64> {
    Some(excel_date_serial(&dt.date())? + excel_time_fraction(&dt.time()))
}

/// Day serial counting the phantom 1900-02-29 Excel inherited from Lotus,
/// so January and February 1900 are one lower than later dates suggest
fn excel_date_serial(date: &NaiveDate) -> Option<f64> {
    let first = NaiveDate::from_ymd_opt(1900, 1, 1)?;
    if *date < first {
        return None;
    }
    let epoch = if *date < NaiveDate::from_ymd_opt(1900, 3, 1)? {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    Some((*date - epoch).num_days() as f64)
}

fn excel_time_fraction(time: &NaiveTime) -> f64 {
    time.num_seconds_from_midnight() as f64 / 86400.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letters(1), "A");
        assert_eq!(column_letters(15), "O");
        assert_eq!(column_letters(26), "Z");
        assert_eq!(column_letters(27), "AA");
        assert_eq!(column_letters(703), "AAA");
    }

    #[test]
    fn test_parse_ref() {
        assert_eq!(parse_ref("A6"), Some((6, 1)));
        assert_eq!(parse_ref("O2"), Some((2, 15)));
        assert_eq!(parse_ref("$AB$10"), Some((10, 28)));
        assert_eq!(parse_ref("A0"), None);
        assert_eq!(parse_ref("12"), None);
        assert_eq!(parse_ref("A"), None);
    }

    #[test]
    fn test_ref_roundtrip_edges() {
        for (row, col) in [(1, 1), (9, 26), (10, 27), (1048576, 16384)] {
            assert_eq!(parse_ref(&cell_ref(row, col)), Some((row, col)));
        }
    }

    #[test]
    fn test_excel_serial() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(excel_serial(&dt), Some(45292.5));
    }

    #[test]
    fn test_excel_serial_around_1900() {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(excel_date_serial(&date(1900, 1, 1)), Some(1.0));
        assert_eq!(excel_date_serial(&date(1900, 2, 28)), Some(59.0));
        assert_eq!(excel_date_serial(&date(1900, 3, 1)), Some(61.0));
        assert_eq!(excel_date_serial(&date(1899, 12, 31)), None);
    }

    #[test]
    fn test_pre_1900_values_become_text() {
        let dt = NaiveDate::from_ymd_opt(1899, 6, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let cell = CellWrite::data(10, 1, &CellValue::DateTime(dt));
        assert_eq!(cell.content, CellContent::Text("1899-06-01 08:30:00".to_string()));
        assert_eq!(cell.style, CellStyle::Data);

        let cell = CellWrite::data(10, 2, &CellValue::Date(dt.date()));
        assert_eq!(cell.content, CellContent::Text("1899-06-01".to_string()));
    }

    #[test]
    fn test_large_integers_stay_exact() {
        let cell = CellWrite::data(10, 1, &CellValue::Int(9_007_199_254_740_993));
        assert_eq!(cell.content, CellContent::Integer(9_007_199_254_740_993));
    }

    #[test]
    fn test_data_cell_styles() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let cell = CellWrite::data(10, 1, &CellValue::DateTime(dt));
        assert_eq!(cell.style, CellStyle::DataDateTime);
        assert_eq!(cell.content, CellContent::Number(45292.0));

        let cell = CellWrite::data(10, 2, &CellValue::Null);
        assert_eq!(cell.content, CellContent::Empty);
        assert_eq!(cell.reference(), "B10");

        let cell = CellWrite::data(10, 3, &CellValue::Float(f64::NAN));
        assert_eq!(cell.content, CellContent::Empty);
    }
}

//! Worksheet editing: merges written cells into `sheetData` and wires in a
//! drawing reference.

use std::collections::BTreeMap;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Reader;

use crate::error::{AppError, AppResult};

use super::cell::{cell_ref, parse_ref, CellContent, CellWrite};
use super::styles::StyleIds;
use super::xml::{self, encode_cell_text, XmlWriter};

const RELATIONSHIPS_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Worksheet children that must come after `<drawing>`
const AFTER_DRAWING: &[&str] = &[
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

type CellEvents = Vec<Event<'static>>;

struct RowEntry {
    /// Original `<row>` element, `None` for rows created here
    start: Option<BytesStart<'static>>,
    cells: BTreeMap<u32, CellEvents>,
}

/// Inclusive cell range, 1-based (row, col) corners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    first: (u32, u32),
    last: (u32, u32),
}

impl Bounds {
    fn parse(reference: &str) -> Option<Self> {
        let (a, b) = reference.split_once(':').unwrap_or((reference, reference));
        Some(Bounds {
            first: parse_ref(a)?,
            last: parse_ref(b)?,
        })
    }

    fn of_cells(cells: &[CellWrite]) -> Option<Self> {
        cells.iter().fold(None, |acc, c| {
            let cell = Bounds {
                first: (c.row, c.col),
                last: (c.row, c.col),
            };
            Some(acc.map_or(cell, |b: Bounds| b.union(cell)))
        })
    }

    fn union(self, other: Bounds) -> Bounds {
        Bounds {
            first: (
                self.first.0.min(other.first.0),
                self.first.1.min(other.first.1),
            ),
            last: (self.last.0.max(other.last.0), self.last.1.max(other.last.1)),
        }
    }

    fn to_ref(self) -> String {
        let first = cell_ref(self.first.0, self.first.1);
        if self.first == self.last {
            first
        } else {
            format!("{first}:{}", cell_ref(self.last.0, self.last.1))
        }
    }
}

/// Write `cells` into the worksheet part and, when `drawing_rel` is given,
/// reference that drawing relationship from the sheet
pub fn apply_cells(
    sheet: &[u8],
    cells: &[CellWrite],
    styles: &StyleIds,
    drawing_rel: Option<&str>,
) -> AppResult<Vec<u8>> {
    let mut reader = xml::reader(sheet);
    let mut w = XmlWriter::new();
    let mut depth = 0usize;
    let mut prefix = String::new();
    let mut rel_prefix = String::from("r");
    let mut drawing_done = drawing_rel.is_none();
    let mut saw_sheet_data = false;
    let edits = Bounds::of_cells(cells);

    while let Some(event) = xml::next(&mut reader)? {
        match event {
            Event::Start(e) if depth == 0 => {
                prefix = xml::prefix_of(e.name());
                let root = match declared_prefix(&e, RELATIONSHIPS_NS)? {
                    Some(p) => {
                        rel_prefix = p;
                        e.into_owned()
                    }
                    None if drawing_rel.is_some() => {
                        xml::with_attr(&e, &format!("xmlns:{rel_prefix}"), RELATIONSHIPS_NS)?
                    }
                    None => e.into_owned(),
                };
                w.start(root)?;
                depth = 1;
            }
            Event::Start(e) if depth == 1 && xml::local_name(&e) == "sheetData" => {
                saw_sheet_data = true;
                let rows = read_rows(&mut reader)?;
                write_sheet_data(&mut w, e, rows, cells, styles, &prefix)?;
            }
            Event::Empty(e) if depth == 1 && xml::local_name(&e) == "sheetData" => {
                saw_sheet_data = true;
                write_sheet_data(&mut w, e, BTreeMap::new(), cells, styles, &prefix)?;
            }
            Event::Empty(e) if depth == 1 && xml::local_name(&e) == "dimension" => {
                let old = xml::attr(&e, "ref")?.and_then(|r| Bounds::parse(&r));
                let merged = match (old, edits) {
                    (Some(a), Some(b)) => Some(a.union(b)),
                    (a, b) => a.or(b),
                };
                match merged {
                    Some(bounds) => w.empty(xml::with_attr(&e, "ref", &bounds.to_ref())?)?,
                    None => w.empty(e)?,
                }
            }
            Event::Start(e) => {
                if depth == 1 {
                    insert_drawing(&mut w, &e, &mut drawing_done, drawing_rel, &prefix, &rel_prefix)?;
                }
                w.start(e)?;
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 1 {
                    insert_drawing(&mut w, &e, &mut drawing_done, drawing_rel, &prefix, &rel_prefix)?;
                }
                w.empty(e)?;
            }
            Event::End(e) => {
                depth -= 1;
                if depth == 0 && !drawing_done {
                    if let Some(id) = drawing_rel {
                        write_drawing(&mut w, &prefix, &rel_prefix, id)?;
                        drawing_done = true;
                    }
                }
                w.event(Event::End(e))?;
            }
            other => w.event(other)?,
        }
    }

    if !saw_sheet_data {
        return Err(AppError::Workbook("worksheet has no sheetData".to_string()));
    }
    Ok(w.into_inner())
}

/// Prefix bound to `namespace` on this element, if any
fn declared_prefix(e: &BytesStart<'_>, namespace: &str) -> AppResult<Option<String>> {
    for attribute in e.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        if let Some(p) = key.strip_prefix("xmlns:") {
            if attribute.unescape_value()? == namespace {
                return Ok(Some(p.to_string()));
            }
        }
    }
    Ok(None)
}

fn insert_drawing(
    w: &mut XmlWriter,
    e: &BytesStart<'_>,
    done: &mut bool,
    drawing_rel: Option<&str>,
    prefix: &str,
    rel_prefix: &str,
) -> AppResult<()> {
    if *done {
        return Ok(());
    }
    let name = xml::local_name(e);
    if name == "drawing" {
        // sheet already references a drawing; the caller appended to it
        *done = true;
    } else if AFTER_DRAWING.contains(&name.as_ref()) {
        if let Some(id) = drawing_rel {
            write_drawing(w, prefix, rel_prefix, id)?;
        }
        *done = true;
    }
    Ok(())
}

fn write_drawing(w: &mut XmlWriter, prefix: &str, rel_prefix: &str, id: &str) -> AppResult<()> {
    let mut drawing = BytesStart::new(format!("{prefix}drawing"));
    drawing.push_attribute((format!("{rel_prefix}:id").as_str(), id));
    w.empty(drawing)
}

/// Read `<row>` elements up to the closing `</sheetData>`
fn read_rows(reader: &mut Reader<&[u8]>) -> AppResult<BTreeMap<u32, RowEntry>> {
    let mut rows = BTreeMap::new();
    let mut next_row = 1;
    loop {
        let event = xml::next(reader)?
            .ok_or_else(|| AppError::Workbook("unterminated sheetData".to_string()))?;
        match event {
            Event::End(_) => return Ok(rows),
            Event::Start(e) if xml::local_name(&e) == "row" => {
                let r = row_number(&e, next_row)?;
                next_row = r + 1;
                let cells = read_cells(reader, r)?;
                rows.insert(
                    r,
                    RowEntry {
                        start: Some(e.into_owned()),
                        cells,
                    },
                );
            }
            Event::Empty(e) if xml::local_name(&e) == "row" => {
                let r = row_number(&e, next_row)?;
                next_row = r + 1;
                rows.insert(
                    r,
                    RowEntry {
                        start: Some(e.into_owned()),
                        cells: BTreeMap::new(),
                    },
                );
            }
            Event::Start(e) => {
                collect_element(reader, e)?;
            }
            _ => {}
        }
    }
}

fn row_number(e: &BytesStart<'_>, fallback: u32) -> AppResult<u32> {
    Ok(xml::attr(e, "r")?
        .and_then(|r| r.parse().ok())
        .unwrap_or(fallback))
}

/// Read the cells of one row up to its closing tag
fn read_cells(reader: &mut Reader<&[u8]>, row: u32) -> AppResult<BTreeMap<u32, CellEvents>> {
    let mut cells = BTreeMap::new();
    let mut next_col = 1;
    loop {
        let event = xml::next(reader)?
            .ok_or_else(|| AppError::Workbook(format!("unterminated row {row}")))?;
        match event {
            Event::End(_) => return Ok(cells),
            Event::Start(e) if xml::local_name(&e) == "c" => {
                let col = cell_column(&e, next_col)?;
                next_col = col + 1;
                cells.insert(col, collect_element(reader, e)?);
            }
            Event::Empty(e) if xml::local_name(&e) == "c" => {
                let col = cell_column(&e, next_col)?;
                next_col = col + 1;
                cells.insert(col, vec![Event::Empty(e.into_owned())]);
            }
            Event::Start(e) => {
                collect_element(reader, e)?;
            }
            _ => {}
        }
    }
}

fn cell_column(e: &BytesStart<'_>, fallback: u32) -> AppResult<u32> {
    Ok(xml::attr(e, "r")?
        .and_then(|r| parse_ref(&r))
        .map(|(_, col)| col)
        .unwrap_or(fallback))
}

/// Owned events of an element whose start tag was just read
fn collect_element(reader: &mut Reader<&[u8]>, start: BytesStart<'_>) -> AppResult<CellEvents> {
    let mut events = vec![Event::Start(start.into_owned())];
    let mut depth = 1;
    while depth > 0 {
        let event = xml::next(reader)?
            .ok_or_else(|| AppError::Workbook("unterminated element".to_string()))?;
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            _ => {}
        }
        events.push(event.into_owned());
    }
    Ok(events)
}

fn write_sheet_data(
    w: &mut XmlWriter,
    start: BytesStart<'_>,
    mut rows: BTreeMap<u32, RowEntry>,
    cells: &[CellWrite],
    styles: &StyleIds,
    prefix: &str,
) -> AppResult<()> {
    for cell in cells {
        let entry = rows.entry(cell.row).or_insert_with(|| RowEntry {
            start: None,
            cells: BTreeMap::new(),
        });
        entry
            .cells
            .insert(cell.col, cell_events(cell, styles.get(cell.style), prefix));
    }

    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    if rows.is_empty() {
        return w.empty(start);
    }
    w.start(start)?;
    for (r, entry) in rows {
        let row_start = match &entry.start {
            // cell extents changed, so any cached spans are stale
            Some(s) => xml::with_attr(&xml::without_attrs(s, &["spans"])?, "r", &r.to_string())?,
            None => {
                let mut s = BytesStart::new(format!("{prefix}row"));
                s.push_attribute(("r", r.to_string().as_str()));
                s
            }
        };
        if entry.cells.is_empty() {
            w.empty(row_start)?;
            continue;
        }
        let row_name = String::from_utf8_lossy(row_start.name().as_ref()).into_owned();
        w.start(row_start)?;
        for events in entry.cells.into_values() {
            for event in events {
                w.event(event)?;
            }
        }
        w.end(&row_name)?;
    }
    w.end(&name)
}

fn cell_events(cell: &CellWrite, style: u32, prefix: &str) -> CellEvents {
    let c_name = format!("{prefix}c");
    let mut c = BytesStart::new(c_name.clone());
    c.push_attribute(("r", cell.reference().as_str()));
    c.push_attribute(("s", style.to_string().as_str()));

    let value = |value: String| {
        vec![
            Event::Start(BytesStart::new(format!("{prefix}v"))),
            Event::Text(BytesText::from_escaped(value)),
            Event::End(BytesEnd::new(format!("{prefix}v"))),
        ]
    };
    let body = match &cell.content {
        CellContent::Empty => return vec![Event::Empty(c)],
        CellContent::Number(n) => value(n.to_string()),
        CellContent::Integer(i) => value(i.to_string()),
        CellContent::Bool(b) => {
            c.push_attribute(("t", "b"));
            value(if *b { "1" } else { "0" }.to_string())
        }
        CellContent::Text(s) => {
            c.push_attribute(("t", "inlineStr"));
            let s = encode_cell_text(s);
            let mut t = BytesStart::new(format!("{prefix}t"));
            if s.trim() != s.as_ref() {
                t.push_attribute(("xml:space", "preserve"));
            }
            vec![
                Event::Start(BytesStart::new(format!("{prefix}is"))),
                Event::Start(t),
                Event::Text(BytesText::new(&s).into_owned()),
                Event::End(BytesEnd::new(format!("{prefix}t"))),
                Event::End(BytesEnd::new(format!("{prefix}is"))),
            ]
        }
    };

    let mut events = vec![Event::Start(c)];
    events.extend(body);
    events.push(Event::End(BytesEnd::new(c_name)));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::cell::CellStyle;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><dimension ref="A1:B6"/><sheetData><row r="1" spans="1:2"><c r="A1" t="s"><v>0</v></c></row><row r="6" spans="1:2"><c r="A6" t="s"><v>1</v></c><c r="B6"><v>3</v></c></row></sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/><legacyDrawing r:id="rId1"/></worksheet>"#;

    fn apply(sheet: &str, cells: &[CellWrite], drawing: Option<&str>) -> String {
        let out = apply_cells(sheet.as_bytes(), cells, &StyleIds::default(), drawing).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_replaces_cells_and_keeps_others() {
        let cells = vec![CellWrite::text("A6", "KINLEY_MIS_DB", CellStyle::Title).unwrap()];
        let out = apply(SHEET, &cells, None);

        assert!(out.contains(r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#));
        assert!(out.contains(
            r#"<row r="6"><c r="A6" s="0" t="inlineStr"><is><t>KINLEY_MIS_DB</t></is></c><c r="B6"><v>3</v></c></row>"#
        ));
        assert!(out.contains(r#"<legacyDrawing r:id="rId1"/>"#));
    }

    #[test]
    fn test_new_rows_are_sorted_and_dimension_grows() {
        let cells = vec![
            CellWrite {
                row: 10,
                col: 3,
                content: CellContent::Number(2.5),
                style: CellStyle::Data,
            },
            CellWrite {
                row: 9,
                col: 1,
                content: CellContent::Bool(true),
                style: CellStyle::Header,
            },
            CellWrite {
                row: 10,
                col: 1,
                content: CellContent::Empty,
                style: CellStyle::Data,
            },
        ];
        let out = apply(SHEET, &cells, None);

        assert!(out.contains(r#"<dimension ref="A1:C10"/>"#));
        let row6 = out.find(r#"<row r="6">"#).unwrap();
        let row9 = out.find(r#"<row r="9">"#).unwrap();
        let row10 = out.find(r#"<row r="10">"#).unwrap();
        assert!(row6 < row9 && row9 < row10);
        assert!(out.contains(r#"<c r="A9" s="0" t="b"><v>1</v></c>"#));
        assert!(out.contains(r#"<row r="10"><c r="A10" s="0"/><c r="C10" s="0"><v>2.5</v></c></row>"#));
    }

    #[test]
    fn test_text_is_escaped() {
        let cells = vec![CellWrite::text("B8", " a<b & c ", CellStyle::Label).unwrap()];
        let out = apply(SHEET, &cells, None);
        assert!(out.contains(r#"<t xml:space="preserve"> a&lt;b &amp; c </t>"#));
    }

    #[test]
    fn test_control_characters_are_encoded() {
        let cells = vec![
            CellWrite::text("A9", "Flow\u{1B}Rate", CellStyle::Header).unwrap(),
            CellWrite::text("A10", "FT\u{1}101 _x0041_", CellStyle::Data).unwrap(),
        ];
        let out = apply(SHEET, &cells, None);

        assert!(out.contains("<t>Flow_x001B_Rate</t>"));
        assert!(out.contains("<t>FT_x0001_101 _x005F_x0041_</t>"));
        assert!(!out.chars().any(|c| c < ' ' && !matches!(c, '\t' | '\n' | '\r')));

        // the rewritten part reads back cleanly
        let mut reader = xml::reader(out.as_bytes());
        while xml::next(&mut reader).unwrap().is_some() {}
    }

    #[test]
    fn test_integers_are_written_exactly() {
        let cells = vec![CellWrite {
            row: 10,
            col: 1,
            content: CellContent::Integer(9_007_199_254_740_993),
            style: CellStyle::Data,
        }];
        let out = apply(SHEET, &cells, None);
        assert!(out.contains(r#"<c r="A10" s="0"><v>9007199254740993</v></c>"#));
    }

    #[test]
    fn test_drawing_goes_before_legacy_drawing() {
        let out = apply(SHEET, &[], Some("rId2"));
        assert!(out.contains(r#"<drawing r:id="rId2"/><legacyDrawing r:id="rId1"/>"#));
    }

    #[test]
    fn test_drawing_appended_and_namespace_declared() {
        let sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/><pageMargins left="0.7"/></worksheet>"#;
        let cells = vec![CellWrite::text("A7", "mis_tab", CellStyle::Subtitle).unwrap()];
        let out = apply(sheet, &cells, Some("rId1"));

        assert!(out.starts_with(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#
        ));
        assert!(out.contains(r#"<sheetData><row r="7">"#));
        assert!(out.ends_with(r#"<pageMargins left="0.7"/><drawing r:id="rId1"/></worksheet>"#));
    }

    #[test]
    fn test_existing_drawing_is_not_duplicated() {
        let sheet = r#"<worksheet xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheetData/><drawing r:id="rId5"/></worksheet>"#;
        let out = apply(sheet, &[], Some("rId9"));
        assert_eq!(out.matches("<drawing").count(), 1);
    }

    #[test]
    fn test_missing_sheet_data_is_an_error() {
        let out = apply_cells(b"<worksheet/>", &[], &StyleIds::default(), None);
        assert!(matches!(out, Err(AppError::Workbook(_))));
    }

    #[test]
    fn test_bounds() {
        let a = Bounds::parse("A1:B6").unwrap();
        let b = Bounds::parse("C10").unwrap();
        assert_eq!(a.union(b).to_ref(), "A1:C10");
        assert_eq!(Bounds::parse("D4").unwrap().to_ref(), "D4");
    }
}

//! Adds the report's cell formats to a workbook stylesheet.
//!
//! Existing fonts, number formats and cell formats keep their indices; new
//! entries are appended so template cells render exactly as before.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};

use crate::error::{AppError, AppResult};

use super::cell::{CellStyle, FontSpec, NumberFormat};
use super::xml::{self, XmlWriter};

/// First id Excel leaves free for custom number formats
const FIRST_CUSTOM_NUM_FMT: u32 = 164;

/// Cell format index (`s` attribute) for each report style
#[derive(Debug, Clone, Default)]
pub struct StyleIds(HashMap<CellStyle, u32>);

impl StyleIds {
    pub fn get(&self, style: CellStyle) -> u32 {
        self.0.get(&style).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct Scan {
    prefix: String,
    has_num_fmts: bool,
    has_fonts: bool,
    has_cell_xfs: bool,
    num_fmts: u32,
    max_num_fmt_id: u32,
    fonts: u32,
    xfs: u32,
    /// Child elements of the default font, reused for the new fonts
    base_font: Vec<Event<'static>>,
}

fn scan(styles: &[u8]) -> AppResult<Scan> {
    let mut reader = xml::reader(styles);
    let mut path: Vec<String> = Vec::new();
    let mut scan = Scan::default();

    while let Some(event) = xml::next(&mut reader)? {
        match &event {
            Event::Start(e) | Event::Empty(e) => {
                let name = xml::local_name(e).into_owned();
                match (path.last().map(String::as_str), name.as_str()) {
                    (None, "styleSheet") => scan.prefix = xml::prefix_of(e.name()),
                    (Some("styleSheet"), "numFmts") => scan.has_num_fmts = true,
                    (Some("styleSheet"), "fonts") => scan.has_fonts = true,
                    (Some("styleSheet"), "cellXfs") => scan.has_cell_xfs = true,
                    (Some("numFmts"), "numFmt") => {
                        scan.num_fmts += 1;
                        let id = xml::attr(e, "numFmtId")?.and_then(|v| v.parse().ok());
                        scan.max_num_fmt_id = scan.max_num_fmt_id.max(id.unwrap_or(0));
                    }
                    (Some("fonts"), "font") => scan.fonts += 1,
                    (Some("cellXfs"), "xf") => scan.xfs += 1,
                    (Some("font"), _) if scan.fonts == 1 && path.len() == 3 => {
                        if matches!(event, Event::Empty(_)) {
                            scan.base_font.push(event.clone().into_owned());
                        }
                    }
                    _ => {}
                }
                if matches!(event, Event::Start(_)) {
                    path.push(name);
                }
            }
            Event::End(_) => {
                path.pop();
            }
            _ => {}
        }
    }

    if !scan.has_fonts || !scan.has_cell_xfs {
        return Err(AppError::Workbook(
            "stylesheet lacks fonts or cell formats".to_string(),
        ));
    }
    Ok(scan)
}

struct Xf {
    num_fmt_id: u32,
    font_id: u32,
    vertical_center: bool,
}

/// What gets appended to each stylesheet collection
struct Plan {
    fonts: Vec<FontSpec>,
    num_fmts: Vec<(u32, &'static str)>,
    xfs: Vec<Xf>,
    ids: StyleIds,
}

fn plan(scan: &Scan) -> Plan {
    let first_custom = FIRST_CUSTOM_NUM_FMT.max(scan.max_num_fmt_id + 1);
    let mut fonts: Vec<FontSpec> = Vec::new();
    let mut num_fmts: Vec<(u32, &'static str)> = Vec::new();
    let mut xfs = Vec::new();
    let mut ids = HashMap::new();

    for style in CellStyle::ALL {
        let font_id = match style.font() {
            None => 0,
            Some(spec) => {
                let index = fonts.iter().position(|f| *f == spec).unwrap_or_else(|| {
                    fonts.push(spec);
                    fonts.len() - 1
                });
                scan.fonts + index as u32
            }
        };
        let num_fmt_id = match style.number_format() {
            NumberFormat::Builtin(id) => id,
            NumberFormat::Custom(code) => match num_fmts.iter().find(|(_, c)| *c == code) {
                Some((id, _)) => *id,
                None => {
                    let id = first_custom + num_fmts.len() as u32;
                    num_fmts.push((id, code));
                    id
                }
            },
        };
        ids.insert(style, scan.xfs + xfs.len() as u32);
        xfs.push(Xf {
            num_fmt_id,
            font_id,
            vertical_center: style.vertical_center(),
        });
    }

    Plan {
        fonts,
        num_fmts,
        xfs,
        ids: StyleIds(ids),
    }
}

/// Append the report formats to `styles`, returning the new part and the
/// cell format index of every [`CellStyle`]
pub fn register_styles(styles: &[u8]) -> AppResult<(Vec<u8>, StyleIds)> {
    let scan = scan(styles)?;
    let plan = plan(&scan);
    let p = scan.prefix.as_str();

    let mut reader = xml::reader(styles);
    let mut w = XmlWriter::new();
    let mut path: Vec<String> = Vec::new();

    while let Some(event) = xml::next(&mut reader)? {
        match event {
            Event::Start(e) => {
                let name = xml::local_name(&e).into_owned();
                if path.len() == 1 {
                    if name == "fonts" && !scan.has_num_fmts && !plan.num_fmts.is_empty() {
                        write_num_fmts_block(&mut w, p, &plan)?;
                    }
                    match collection_count(&scan, &plan, &name) {
                        Some(count) => w.start(xml::with_attr(&e, "count", &count.to_string())?)?,
                        None => w.start(e)?,
                    }
                } else {
                    w.start(e)?;
                }
                path.push(name);
            }
            Event::Empty(e) if path.len() == 1 => {
                let name = xml::local_name(&e).into_owned();
                if name == "fonts" && !scan.has_num_fmts && !plan.num_fmts.is_empty() {
                    write_num_fmts_block(&mut w, p, &plan)?;
                }
                match collection_count(&scan, &plan, &name) {
                    Some(count) => {
                        let full_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        w.start(xml::with_attr(&e, "count", &count.to_string())?)?;
                        write_additions(&mut w, p, &scan, &plan, &name)?;
                        w.end(&full_name)?;
                    }
                    None => w.empty(e)?,
                }
            }
            Event::End(e) => {
                path.pop();
                if path.len() == 1 {
                    let name = String::from_utf8_lossy(e.local_name().into_inner()).into_owned();
                    write_additions(&mut w, p, &scan, &plan, &name)?;
                }
                w.event(Event::End(e))?;
            }
            other => w.event(other)?,
        }
    }

    Ok((w.into_inner(), plan.ids))
}

fn collection_count(scan: &Scan, plan: &Plan, name: &str) -> Option<usize> {
    match name {
        "numFmts" => Some(scan.num_fmts as usize + plan.num_fmts.len()),
        "fonts" => Some(scan.fonts as usize + plan.fonts.len()),
        "cellXfs" => Some(scan.xfs as usize + plan.xfs.len()),
        _ => None,
    }
}

fn write_additions(
    w: &mut XmlWriter,
    p: &str,
    scan: &Scan,
    plan: &Plan,
    collection: &str,
) -> AppResult<()> {
    match collection {
        "numFmts" => write_num_fmts(w, p, plan),
        "fonts" => plan
            .fonts
            .iter()
            .try_for_each(|spec| write_font(w, p, spec, &scan.base_font)),
        "cellXfs" => plan.xfs.iter().try_for_each(|xf| write_xf(w, p, xf)),
        _ => Ok(()),
    }
}

fn write_num_fmts_block(w: &mut XmlWriter, p: &str, plan: &Plan) -> AppResult<()> {
    let mut start = BytesStart::new(format!("{p}numFmts"));
    start.push_attribute(("count", plan.num_fmts.len().to_string().as_str()));
    w.start(start)?;
    write_num_fmts(w, p, plan)?;
    w.end(&format!("{p}numFmts"))
}

fn write_num_fmts(w: &mut XmlWriter, p: &str, plan: &Plan) -> AppResult<()> {
    for (id, code) in &plan.num_fmts {
        let mut e = BytesStart::new(format!("{p}numFmt"));
        e.push_attribute(("numFmtId", id.to_string().as_str()));
        e.push_attribute(("formatCode", *code));
        w.empty(e)?;
    }
    Ok(())
}

fn write_font(
    w: &mut XmlWriter,
    p: &str,
    spec: &FontSpec,
    base: &[Event<'static>],
) -> AppResult<()> {
    w.start(BytesStart::new(format!("{p}font")))?;
    if spec.bold {
        w.empty(BytesStart::new(format!("{p}b")))?;
    }
    if let Some(size) = spec.size {
        let mut sz = BytesStart::new(format!("{p}sz"));
        sz.push_attribute(("val", size.to_string().as_str()));
        w.empty(sz)?;
    }
    for child in base {
        if let Event::Empty(e) = child {
            let name = xml::local_name(e);
            if (name == "b" && spec.bold) || (name == "sz" && spec.size.is_some()) {
                continue;
            }
        }
        w.event(child.clone())?;
    }
    w.end(&format!("{p}font"))
}

fn write_xf(w: &mut XmlWriter, p: &str, xf: &Xf) -> AppResult<()> {
    let mut e = BytesStart::new(format!("{p}xf"));
    e.push_attribute(("numFmtId", xf.num_fmt_id.to_string().as_str()));
    e.push_attribute(("fontId", xf.font_id.to_string().as_str()));
    e.push_attribute(("fillId", "0"));
    e.push_attribute(("borderId", "0"));
    e.push_attribute(("xfId", "0"));
    if xf.num_fmt_id != 0 {
        e.push_attribute(("applyNumberFormat", "1"));
    }
    if xf.font_id != 0 {
        e.push_attribute(("applyFont", "1"));
    }
    e.push_attribute(("applyAlignment", "1"));
    w.start(e)?;

    let mut alignment = BytesStart::new(format!("{p}alignment"));
    alignment.push_attribute(("horizontal", "center"));
    if xf.vertical_center {
        alignment.push_attribute(("vertical", "center"));
    }
    w.empty(alignment)?;
    w.end(&format!("{p}xf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font><sz val="11"/><color theme="1"/><name val="Calibri"/><family val="2"/></font><font><b/><sz val="20"/><name val="Arial"/></font></fonts><fills count="1"><fill><patternFill patternType="none"/></fill></fills><borders count="1"><border/></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs></styleSheet>"#;

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_appends_after_existing_entries() {
        let (out, ids) = register_styles(STYLES.as_bytes()).unwrap();
        let out = text(out);

        // two template xfs come first
        assert_eq!(ids.get(CellStyle::Title), 2);
        assert_eq!(ids.get(CellStyle::DataTime), 9);
        assert!(out.contains(r#"<cellXfs count="10">"#));
        // bold 14, bold 12, bold
        assert!(out.contains(r#"<fonts count="5">"#));
        assert!(out.contains(r#"<font><b/><sz val="14"/><color theme="1"/><name val="Calibri"/><family val="2"/></font>"#));
        assert!(out.contains(r#"<font><b/><sz val="11"/><color theme="1"/>"#));
        // original entries untouched
        assert!(out.contains(r#"<font><b/><sz val="20"/><name val="Arial"/></font>"#));
    }

    #[test]
    fn test_inserts_num_fmts_before_fonts() {
        let (out, _) = register_styles(STYLES.as_bytes()).unwrap();
        let out = text(out);
        let num_fmts = out.find("<numFmts").unwrap();
        assert!(num_fmts < out.find("<fonts").unwrap());
        assert!(out.contains(
            r#"<numFmts count="2"><numFmt numFmtId="164" formatCode="yyyy-mm-dd hh:mm:ss"/><numFmt numFmtId="165" formatCode="yyyy-mm-dd"/></numFmts>"#
        ));
    }

    #[test]
    fn test_custom_ids_follow_existing_formats() {
        let styles = STYLES.replace(
            "<fonts count=\"2\">",
            r#"<numFmts count="1"><numFmt numFmtId="170" formatCode="0.000"/></numFmts><fonts count="2">"#,
        );
        let (out, _) = register_styles(styles.as_bytes()).unwrap();
        let out = text(out);
        assert!(out.contains(r#"<numFmts count="3">"#));
        assert!(out.contains(r#"numFmtId="171" formatCode="yyyy-mm-dd hh:mm:ss""#));
        assert!(out.contains(r#"numFmtId="172" formatCode="yyyy-mm-dd""#));
    }

    #[test]
    fn test_alignment_per_style() {
        let (out, _) = register_styles(STYLES.as_bytes()).unwrap();
        let out = text(out);
        // title: bold 14 font is index 2
        assert!(out.contains(
            r#"<xf numFmtId="0" fontId="2" fillId="0" borderId="0" xfId="0" applyFont="1" applyAlignment="1"><alignment horizontal="center" vertical="center"/></xf>"#
        ));
        // plain data cell
        assert!(out.contains(
            r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0" applyAlignment="1"><alignment horizontal="center"/></xf>"#
        ));
    }

    #[test]
    fn test_prefixed_stylesheet() {
        let styles = r#"<x:styleSheet xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><x:fonts count="1"><x:font><x:sz val="11"/></x:font></x:fonts><x:cellXfs count="1"><x:xf numFmtId="0" fontId="0"/></x:cellXfs></x:styleSheet>"#;
        let (out, ids) = register_styles(styles.as_bytes()).unwrap();
        let out = text(out);
        assert_eq!(ids.get(CellStyle::Title), 1);
        assert!(out.contains("<x:numFmts count=\"2\">"));
        assert!(out.contains("<x:font><x:b/><x:sz val=\"14\"/></x:font>"));
        assert!(out.ends_with("</x:cellXfs></x:styleSheet>"));
    }

    #[test]
    fn test_rejects_stylesheet_without_cell_formats() {
        let styles = r#"<styleSheet><fonts count="0"/></styleSheet>"#;
        assert!(matches!(
            register_styles(styles.as_bytes()),
            Err(AppError::Workbook(_))
        ));
    }
}

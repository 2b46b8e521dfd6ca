//! Places a picture on the report sheet.

use std::fs;
use std::path::Path;

use log::info;
use quick_xml::events::Event;

use crate::error::{AppError, AppResult};

use super::package::{relative_target, resolve_target, XlsxPackage, REL_DRAWING, REL_IMAGE};
use super::xml::{self, XmlWriter};

const DRAWING_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.drawing+xml";
const XDR_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Top-left anchor cell `O2`, zero-based
const ANCHOR_COL: u32 = 14;
const ANCHOR_ROW: u32 = 1;
/// 80 px at 96 dpi, in EMU
const PICTURE_EMU: u64 = 80 * 9525;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
}

impl ImageFormat {
    /// Detect the format from the file's leading bytes
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.starts_with(b"BM") {
            Some(ImageFormat::Bmp)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
        }
    }
}

/// First `{stem}{n}.{ext}` whose number no existing part uses
fn free_part_name(package: &XlsxPackage, stem: &str, ext: &str) -> String {
    (1..)
        .find(|n| {
            let taken = format!("{stem}{n}.").to_ascii_lowercase();
            !package
                .part_names()
                .any(|p| p.to_ascii_lowercase().starts_with(&taken))
        })
        .map(|n: u32| format!("{stem}{n}.{ext}"))
        .unwrap_or_default()
}

/// Embed the image at `image` into `sheet_part`.
///
/// Returns the relationship id the sheet must reference with a `<drawing>`
/// element, or `None` when the sheet already had a drawing that the picture
/// was appended to.
pub fn embed_image(
    package: &mut XlsxPackage,
    sheet_part: &str,
    image: &Path,
) -> AppResult<Option<String>> {
    let bytes = fs::read(image)?;
    let format =
        ImageFormat::detect(&bytes).ok_or_else(|| AppError::UnsupportedImage(image.to_path_buf()))?;

    let media_part = free_part_name(package, "xl/media/image", format.extension());
    package.set_part(&media_part, bytes);

    let mut sheet_rels = package.relationships(sheet_part)?;
    let existing = sheet_rels
        .by_type(REL_DRAWING)
        .map(|rel| resolve_target(sheet_part, &rel.target))
        .filter(|part| package.contains(part));

    let (drawing_part, new_sheet_rel) = match existing {
        Some(part) => (part, None),
        None => {
            let part = free_part_name(package, "xl/drawings/drawing", "xml");
            let id = sheet_rels.add(REL_DRAWING, &relative_target(sheet_part, &part));
            package.set_relationships(sheet_part, &sheet_rels)?;
            (part, Some(id))
        }
    };

    let mut drawing_rels = package.relationships(&drawing_part)?;
    let image_rel = drawing_rels.add(REL_IMAGE, &relative_target(&drawing_part, &media_part));
    package.set_relationships(&drawing_part, &drawing_rels)?;

    let drawing = match package.part(&drawing_part) {
        Some(existing) => append_anchor(existing, &image_rel)?,
        None => new_drawing(&image_rel),
    };
    package.set_part(&drawing_part, drawing);

    let mut types = package.content_types()?;
    types.ensure_default(format.extension(), format.content_type());
    types.set_override(&drawing_part, DRAWING_CONTENT_TYPE);
    package.set_content_types(&types)?;

    info!("Embedded {} as {media_part} in {drawing_part}", image.display());
    Ok(new_sheet_rel)
}

fn anchor_xml(picture_id: u32, image_rel: &str) -> String {
    format!(
        concat!(
            r#"<xdr:oneCellAnchor xmlns:xdr="{xdr}" xmlns:a="{a}" xmlns:r="{r}">"#,
            "<xdr:from><xdr:col>{col}</xdr:col><xdr:colOff>0</xdr:colOff>",
            "<xdr:row>{row}</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>",
            r#"<xdr:ext cx="{emu}" cy="{emu}"/>"#,
            r#"<xdr:pic><xdr:nvPicPr><xdr:cNvPr id="{id}" name="Picture {id}"/>"#,
            r#"<xdr:cNvPicPr><a:picLocks noChangeAspect="1"/></xdr:cNvPicPr></xdr:nvPicPr>"#,
            r#"<xdr:blipFill><a:blip r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill>"#,
            r#"<xdr:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{emu}" cy="{emu}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></xdr:spPr></xdr:pic>"#,
            "<xdr:clientData/></xdr:oneCellAnchor>"
        ),
        xdr = XDR_NS,
        a = A_NS,
        r = R_NS,
        col = ANCHOR_COL,
        row = ANCHOR_ROW,
        emu = PICTURE_EMU,
        id = picture_id,
        rel = image_rel,
    )
}

fn new_drawing(image_rel: &str) -> Vec<u8> {
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>{}<xdr:wsDr xmlns:xdr="{XDR_NS}" xmlns:a="{A_NS}">{}</xdr:wsDr>"#,
        "\n",
        anchor_xml(1, image_rel)
    );
    xml.into_bytes()
}

/// Add an anchor as the last child of an existing drawing part
fn append_anchor(drawing: &[u8], image_rel: &str) -> AppResult<Vec<u8>> {
    let mut max_id = 0u32;
    let mut reader = xml::reader(drawing);
    while let Some(event) = xml::next(&mut reader)? {
        if let Event::Start(e) | Event::Empty(e) = event {
            if xml::local_name(&e) == "cNvPr" {
                let id = xml::attr(&e, "id")?.and_then(|v| v.parse().ok());
                max_id = max_id.max(id.unwrap_or(0));
            }
        }
    }

    let mut reader = xml::reader(drawing);
    let mut w = XmlWriter::new();
    let mut depth = 0usize;
    while let Some(event) = xml::next(&mut reader)? {
        match event {
            Event::Start(e) => {
                depth += 1;
                w.start(e)?;
            }
            Event::End(e) => {
                depth -= 1;
                if depth == 0 {
                    w.raw(&anchor_xml(max_id + 1, image_rel))?;
                }
                w.event(Event::End(e))?;
            }
            Event::Empty(e) if depth == 0 => {
                // empty root: reopen it to hold the anchor
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                w.start(e)?;
                w.raw(&anchor_xml(max_id + 1, image_rel))?;
                w.end(&name)?;
            }
            other => w.event(other)?,
        }
    }
    Ok(w.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::package::CONTENT_TYPES_PART;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const SHEET: &str = "xl/worksheets/sheet1.xml";

    fn package(extra: Vec<(&str, &str)>) -> XlsxPackage {
        let mut parts = vec![
            (
                CONTENT_TYPES_PART.to_string(),
                br#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#.to_vec(),
            ),
            (SHEET.to_string(), b"<worksheet><sheetData/></worksheet>".to_vec()),
        ];
        parts.extend(
            extra
                .into_iter()
                .map(|(n, d)| (n.to_string(), d.as_bytes().to_vec())),
        );
        XlsxPackage::from_parts(parts)
    }

    fn part_text(package: &XlsxPackage, name: &str) -> String {
        String::from_utf8(package.part(name).unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_detect_formats() {
        assert_eq!(ImageFormat::detect(PNG), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::detect(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::detect(b"GIF89a...."), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::detect(b"BM\x36\x00"), Some(ImageFormat::Bmp));
        assert_eq!(ImageFormat::detect(b"<svg/>"), None);
        assert_eq!(ImageFormat::detect(b""), None);
    }

    #[test]
    fn test_embed_creates_drawing() {
        let tmp = tempfile::tempdir().unwrap();
        let image = tmp.path().join("logo.png");
        fs::write(&image, PNG).unwrap();

        let mut pkg = package(vec![]);
        let rel = embed_image(&mut pkg, SHEET, &image).unwrap();
        assert_eq!(rel.as_deref(), Some("rId1"));

        assert_eq!(pkg.part("xl/media/image1.png"), Some(PNG));
        let drawing = part_text(&pkg, "xl/drawings/drawing1.xml");
        assert!(drawing.contains("<xdr:col>14</xdr:col>"));
        assert!(drawing.contains("<xdr:row>1</xdr:row>"));
        assert!(drawing.contains(r#"<xdr:ext cx="762000" cy="762000"/>"#));
        assert!(drawing.contains(r#"r:embed="rId1""#));

        let sheet_rels = part_text(&pkg, "xl/worksheets/_rels/sheet1.xml.rels");
        assert!(sheet_rels.contains(r#"Target="../drawings/drawing1.xml""#));
        let drawing_rels = part_text(&pkg, "xl/drawings/_rels/drawing1.xml.rels");
        assert!(drawing_rels.contains(r#"Target="../media/image1.png""#));

        let types = pkg.content_types().unwrap();
        assert!(types.has_default("png"));
        assert_eq!(
            types.override_for("xl/drawings/drawing1.xml"),
            Some(DRAWING_CONTENT_TYPE)
        );
    }

    #[test]
    fn test_embed_appends_to_existing_drawing() {
        let tmp = tempfile::tempdir().unwrap();
        let image = tmp.path().join("logo.gif");
        fs::write(&image, b"GIF89a\x01\x00").unwrap();

        let mut pkg = package(vec![
            ("xl/media/image1.png", "png"),
            (
                "xl/worksheets/_rels/sheet1.xml.rels",
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing" Target="../drawings/drawing1.xml"/></Relationships>"#,
            ),
            (
                "xl/drawings/drawing1.xml",
                r#"<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing"><xdr:twoCellAnchor><xdr:pic><xdr:nvPicPr><xdr:cNvPr id="3" name="Logo"/></xdr:nvPicPr></xdr:pic></xdr:twoCellAnchor></xdr:wsDr>"#,
            ),
        ]);

        let rel = embed_image(&mut pkg, SHEET, &image).unwrap();
        assert_eq!(rel, None);

        assert!(pkg.contains("xl/media/image2.gif"));
        let drawing = part_text(&pkg, "xl/drawings/drawing1.xml");
        assert!(drawing.starts_with("<xdr:wsDr"));
        assert!(drawing.contains(r#"<xdr:cNvPr id="3" name="Logo"/>"#));
        assert!(drawing.contains(r#"<xdr:cNvPr id="4" name="Picture 4"/>"#));
        assert!(drawing.ends_with("</xdr:oneCellAnchor></xdr:wsDr>"));
        assert!(pkg.content_types().unwrap().has_default("gif"));
    }

    #[test]
    fn test_unsupported_image() {
        let tmp = tempfile::tempdir().unwrap();
        let image = tmp.path().join("logo.png");
        fs::write(&image, b"not an image").unwrap();

        let mut pkg = package(vec![]);
        assert!(matches!(
            embed_image(&mut pkg, SHEET, &image),
            Err(AppError::UnsupportedImage(_))
        ));
        assert!(!pkg.contains("xl/media/image1.png"));
    }
}

//! In-memory view of an `.xlsx` package: the zip parts plus the
//! relationship and content-type bookkeeping needed to edit them.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use log::debug;
use quick_xml::events::{BytesDecl, BytesStart, Event};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{AppError, AppResult};

use super::xml::{self, XmlWriter};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const ROOT_RELS_PART: &str = "_rels/.rels";

const PACKAGE_RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

pub const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub const REL_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";
pub const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// All parts of a package, kept in archive order
#[derive(Debug, Clone)]
pub struct XlsxPackage {
    parts: Vec<(String, Vec<u8>)>,
}

impl XlsxPackage {
    pub fn open(path: &Path) -> AppResult<Self> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;
        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            parts.push((name, data));
        }
        debug!("Opened {} ({} parts)", path.display(), parts.len());
        Ok(XlsxPackage { parts })
    }

    #[cfg(test)]
    pub(crate) fn from_parts(parts: Vec<(String, Vec<u8>)>) -> Self {
        XlsxPackage { parts }
    }

    fn index(&self, name: &str) -> Option<usize> {
        let name = name.trim_start_matches('/');
        self.parts
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index(name).is_some()
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.index(name).map(|i| self.parts[i].1.as_slice())
    }

    fn require(&self, name: &str) -> AppResult<&[u8]> {
        self.part(name)
            .ok_or_else(|| AppError::Workbook(format!("missing part {name}")))
    }

    /// Replace a part, or append it when new
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.index(name) {
            Some(i) => self.parts[i].1 = data,
            None => self
                .parts
                .push((name.trim_start_matches('/').to_string(), data)),
        }
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(n, _)| n.as_str())
    }

    /// Relationships of a part; an absent rels part is an empty set
    pub fn relationships(&self, part: &str) -> AppResult<Relationships> {
        match self.part(&rels_path(part)) {
            Some(data) => Relationships::parse(data),
            None => Ok(Relationships::default()),
        }
    }

    pub fn set_relationships(&mut self, part: &str, rels: &Relationships) -> AppResult<()> {
        let data = rels.to_xml()?;
        self.set_part(&rels_path(part), data);
        Ok(())
    }

    pub fn content_types(&self) -> AppResult<ContentTypes> {
        ContentTypes::parse(self.require(CONTENT_TYPES_PART)?)
    }

    pub fn set_content_types(&mut self, types: &ContentTypes) -> AppResult<()> {
        let data = types.to_xml()?;
        self.set_part(CONTENT_TYPES_PART, data);
        Ok(())
    }

    /// Main workbook part, found through the package relationships
    pub fn workbook_part(&self) -> AppResult<String> {
        let rels = Relationships::parse(self.require(ROOT_RELS_PART)?)?;
        let rel = rels
            .by_type(REL_OFFICE_DOCUMENT)
            .ok_or_else(|| AppError::Workbook("no workbook in package".to_string()))?;
        Ok(resolve_target("", &rel.target))
    }

    /// Worksheet shown when the workbook is opened (`activeTab`, else the first)
    pub fn active_sheet_part(&self) -> AppResult<String> {
        let workbook = self.workbook_part()?;
        let mut reader = xml::reader(self.require(&workbook)?);
        let mut active_tab = 0usize;
        let mut sheet_ids = Vec::new();

        while let Some(event) = xml::next(&mut reader)? {
            if let Event::Start(e) | Event::Empty(e) = event {
                match xml::local_name(&e).as_ref() {
                    "workbookView" => {
                        if let Some(tab) = xml::attr(&e, "activeTab")? {
                            active_tab = tab.parse().unwrap_or(0);
                        }
                    }
                    "sheet" => {
                        if let Some(id) = xml::attr(&e, "id")? {
                            sheet_ids.push(id);
                        }
                    }
                    _ => {}
                }
            }
        }

        let id = sheet_ids
            .get(active_tab)
            .or_else(|| sheet_ids.first())
            .ok_or_else(|| AppError::Workbook("workbook has no sheets".to_string()))?;
        let rels = self.relationships(&workbook)?;
        let rel = rels
            .by_id(id)
            .ok_or_else(|| AppError::Workbook(format!("no relationship {id} for sheet")))?;
        Ok(resolve_target(&workbook, &rel.target))
    }

    /// Stylesheet part of the workbook
    pub fn styles_part(&self) -> AppResult<String> {
        let workbook = self.workbook_part()?;
        let rels = self.relationships(&workbook)?;
        let rel = rels
            .by_type(REL_STYLES)
            .ok_or_else(|| AppError::Workbook("workbook has no stylesheet".to_string()))?;
        Ok(resolve_target(&workbook, &rel.target))
    }

    /// Write the package to a new file; an existing file is never replaced
    pub fn save_new(&self, path: &Path) -> AppResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => AppError::ReportExists(path.to_path_buf()),
                _ => AppError::Io(e),
            })?;

        if let Err(e) = self.write_to(file) {
            let _ = fs::remove_file(path);
            return Err(e);
        }
        Ok(())
    }

    fn write_to(&self, file: File) -> AppResult<()> {
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(file);
        for (name, data) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }
        let mut file = zip.finish()?;
        file.flush()?;
        Ok(())
    }
}

/// Path of the relationships part belonging to `part`
pub fn rels_path(part: &str) -> String {
    let part = part.trim_start_matches('/');
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that owns it
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = source_part
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    // drop the source file name
    segments.pop();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Relative target from `source_part` to `target_part`, as written in rels
pub fn relative_target(source_part: &str, target_part: &str) -> String {
    let source: Vec<&str> = source_part.trim_start_matches('/').split('/').collect();
    let target: Vec<&str> = target_part.trim_start_matches('/').split('/').collect();
    let source_dir = &source[..source.len().saturating_sub(1)];

    let common = source_dir
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<&str> = vec![".."; source_dir.len() - common];
    parts.extend(&target[common..]);
    parts.join("/")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub target_mode: Option<String>,
}

/// Contents of a `.rels` part
#[derive(Debug, Clone, Default)]
pub struct Relationships {
    items: Vec<Relationship>,
}

impl Relationships {
    pub fn parse(data: &[u8]) -> AppResult<Self> {
        let mut reader = xml::reader(data);
        let mut items = Vec::new();
        while let Some(event) = xml::next(&mut reader)? {
            if let Event::Start(e) | Event::Empty(e) = event {
                if xml::local_name(&e) != "Relationship" {
                    continue;
                }
                let (Some(id), Some(rel_type), Some(target)) = (
                    xml::attr(&e, "Id")?,
                    xml::attr(&e, "Type")?,
                    xml::attr(&e, "Target")?,
                ) else {
                    continue;
                };
                items.push(Relationship {
                    id,
                    rel_type,
                    target,
                    target_mode: xml::attr(&e, "TargetMode")?,
                });
            }
        }
        Ok(Relationships { items })
    }

    pub fn by_id(&self, id: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| r.id == id)
    }

    pub fn by_type(&self, rel_type: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| r.rel_type == rel_type)
    }

    /// First unused `rIdN`
    pub fn next_id(&self) -> String {
        let mut n = self.items.len() + 1;
        loop {
            let id = format!("rId{n}");
            if self.by_id(&id).is_none() {
                return id;
            }
            n += 1;
        }
    }

    /// Add an internal relationship and return its id
    pub fn add(&mut self, rel_type: &str, target: &str) -> String {
        let id = self.next_id();
        self.items.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            target_mode: None,
        });
        id
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn to_xml(&self) -> AppResult<Vec<u8>> {
        let mut w = XmlWriter::new();
        w.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        let mut root = BytesStart::new("Relationships");
        root.push_attribute(("xmlns", PACKAGE_RELS_NS));
        w.start(root)?;
        for rel in &self.items {
            let mut e = BytesStart::new("Relationship");
            e.push_attribute(("Id", rel.id.as_str()));
            e.push_attribute(("Type", rel.rel_type.as_str()));
            e.push_attribute(("Target", rel.target.as_str()));
            if let Some(mode) = &rel.target_mode {
                e.push_attribute(("TargetMode", mode.as_str()));
            }
            w.empty(e)?;
        }
        w.end("Relationships")?;
        Ok(w.into_inner())
    }
}

/// Contents of `[Content_Types].xml`
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    /// (extension, content type)
    defaults: Vec<(String, String)>,
    /// (part name with leading slash, content type)
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn parse(data: &[u8]) -> AppResult<Self> {
        let mut reader = xml::reader(data);
        let mut types = ContentTypes::default();
        while let Some(event) = xml::next(&mut reader)? {
            if let Event::Start(e) | Event::Empty(e) = event {
                let content_type = xml::attr(&e, "ContentType")?;
                match (xml::local_name(&e).as_ref(), content_type) {
                    ("Default", Some(ct)) => {
                        if let Some(ext) = xml::attr(&e, "Extension")? {
                            types.defaults.push((ext, ct));
                        }
                    }
                    ("Override", Some(ct)) => {
                        if let Some(part) = xml::attr(&e, "PartName")? {
                            types.overrides.push((part, ct));
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(types)
    }

    pub fn has_default(&self, extension: &str) -> bool {
        self.defaults
            .iter()
            .any(|(ext, _)| ext.eq_ignore_ascii_case(extension))
    }

    pub fn ensure_default(&mut self, extension: &str, content_type: &str) {
        if !self.has_default(extension) {
            self.defaults
                .push((extension.to_string(), content_type.to_string()));
        }
    }

    pub fn set_override(&mut self, part: &str, content_type: &str) {
        let part_name = format!("/{}", part.trim_start_matches('/'));
        match self
            .overrides
            .iter_mut()
            .find(|(p, _)| p.eq_ignore_ascii_case(&part_name))
        {
            Some((_, ct)) => *ct = content_type.to_string(),
            None => self.overrides.push((part_name, content_type.to_string())),
        }
    }

    #[cfg(test)]
    pub fn override_for(&self, part: &str) -> Option<&str> {
        let part_name = format!("/{}", part.trim_start_matches('/'));
        self.overrides
            .iter()
            .find(|(p, _)| p.eq_ignore_ascii_case(&part_name))
            .map(|(_, ct)| ct.as_str())
    }

    pub fn to_xml(&self) -> AppResult<Vec<u8>> {
        let mut w = XmlWriter::new();
        w.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        let mut root = BytesStart::new("Types");
        root.push_attribute(("xmlns", CONTENT_TYPES_NS));
        w.start(root)?;
        for (ext, ct) in &self.defaults {
            let mut e = BytesStart::new("Default");
            e.push_attribute(("Extension", ext.as_str()));
            e.push_attribute(("ContentType", ct.as_str()));
            w.empty(e)?;
        }
        for (part, ct) in &self.overrides {
            let mut e = BytesStart::new("Override");
            e.push_attribute(("PartName", part.as_str()));
            e.push_attribute(("ContentType", ct.as_str()));
            w.empty(e)?;
        }
        w.end("Types")?;
        Ok(w.into_inner())
    }
}

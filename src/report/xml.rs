//! Small quick-xml helpers shared by the package editors.

use std::borrow::Cow;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};

use crate::error::{AppError, AppResult};

/// Reader over an in-memory part
pub(crate) fn reader(xml: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    reader
}

/// Next event, `None` at end of document
pub(crate) fn next<'a>(reader: &mut Reader<&'a [u8]>) -> AppResult<Option<Event<'a>>> {
    match reader.read_event()? {
        Event::Eof => Ok(None),
        event => Ok(Some(event)),
    }
}

/// Event writer appending to a byte buffer
pub(crate) struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl XmlWriter {
    pub(crate) fn new() -> Self {
        XmlWriter {
            inner: Writer::new(Vec::new()),
        }
    }

    pub(crate) fn event<'a>(&mut self, event: impl Into<Event<'a>>) -> AppResult<()> {
        self.inner.write_event(event).map_err(AppError::Io)
    }

    pub(crate) fn start(&mut self, start: BytesStart<'_>) -> AppResult<()> {
        self.event(Event::Start(start))
    }

    pub(crate) fn empty(&mut self, start: BytesStart<'_>) -> AppResult<()> {
        self.event(Event::Empty(start))
    }

    pub(crate) fn end(&mut self, name: &str) -> AppResult<()> {
        self.event(Event::End(BytesEnd::new(name.to_string())))
    }

    /// Copy raw, already well-formed XML
    pub(crate) fn raw(&mut self, xml: &str) -> AppResult<()> {
        self.event(Event::Text(BytesText::from_escaped(xml.to_string())))
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

/// Local (unprefixed) name of an element
pub(crate) fn local_name<'a>(start: &'a BytesStart<'_>) -> Cow<'a, str> {
    String::from_utf8_lossy(start.local_name().into_inner())
}

/// Namespace prefix of an element including the colon, or an empty string
pub(crate) fn prefix_of(name: QName<'_>) -> String {
    name.prefix()
        .map(|p| format!("{}:", String::from_utf8_lossy(p.as_ref())))
        .unwrap_or_default()
}

/// Attribute value by local name
pub(crate) fn attr(start: &BytesStart<'_>, local: &str) -> AppResult<Option<String>> {
    for attribute in start.attributes() {
        let attribute = attribute?;
        if attribute.key.local_name().as_ref() == local.as_bytes() {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Copy of an element with one attribute set (added or replaced)
pub(crate) fn with_attr(start: &BytesStart<'_>, key: &str, value: &str) -> AppResult<BytesStart<'static>> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut copy = BytesStart::new(name);
    let mut replaced = false;
    for attribute in start.attributes() {
        let attribute = attribute?;
        if attribute.key.as_ref() == key.as_bytes() {
            if !replaced {
                copy.push_attribute((key, value));
                replaced = true;
            }
        } else {
            copy.push_attribute(attribute);
        }
    }
    if !replaced {
        copy.push_attribute((key, value));
    }
    Ok(copy)
}

/// Copy of an element without the named attributes
pub(crate) fn without_attrs(start: &BytesStart<'_>, keys: &[&str]) -> AppResult<BytesStart<'static>> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut copy = BytesStart::new(name);
    for attribute in start.attributes() {
        let attribute = attribute?;
        if !keys.iter().any(|k| attribute.key.as_ref() == k.as_bytes()) {
            copy.push_attribute(attribute);
        }
    }
    Ok(copy)
}

/// Characters XML 1.0 cannot carry, even as character references
fn is_restricted(c: char) -> bool {
    matches!(
        c,
        '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}'
    )
}

/// `_xHHHH_` at the start of `s`
fn starts_with_ooxml_escape(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 7
        && b[0] == b'_'
        && b[1] == b'x'
        && b[2..6].iter().all(u8::is_ascii_hexdigit)
        && b[6] == b'_'
}

/// Encode cell text the way spreadsheet readers decode it: restricted
/// characters become `_xHHHH_` and a literal `_xHHHH_` is protected as
/// `_x005F_xHHHH_`
pub(crate) fn encode_cell_text(text: &str) -> Cow<'_, str> {
    if !text.chars().any(is_restricted) && !text.contains("_x") {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for (i, c) in text.char_indices() {
        if is_restricted(c) {
            out.push_str(&format!("_x{:04X}_", c as u32));
        } else if c == '_' && starts_with_ooxml_escape(&text[i..]) {
            out.push_str("_x005F_");
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

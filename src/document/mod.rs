//! Configuration documents
//!
//! A configuration file is an XML document with three meaningful levels:
//! the root element, its section elements, and the setting elements
//! directly beneath each section. Only the `Value` attribute of a setting
//! can be changed; every other node is kept exactly as read so that an
//! untouched document serializes back to the same markup.

mod encoding;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::Utf8Error;

use std::borrow::Cow;

use quick_xml::escape::escape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use serde::{Serialize, Serializer};
use thiserror::Error;

pub use encoding::{encode_for_disk, normalize_newlines, Bom, UTF8_BOM};

/// The only attribute the merge reads or writes
pub const VALUE_ATTR: &str = "Value";

/// Declaration written at the top of every saved document
pub const XML_DECLARATION: &[u8] = b"<?xml version='1.0' encoding='utf-8'?>";

/// Errors decoding in-memory document content
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("invalid UTF-8: {0}")]
    Decode(#[from] Utf8Error),

    #[error("malformed XML: {0}")]
    Parse(String),
}

/// Errors loading or saving a document on disk.
///
/// Every variant names the file involved.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("{} is not valid UTF-8: {source}", path.display())]
    Decode { path: PathBuf, source: Utf8Error },

    #[error("{} is not well-formed XML: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

impl DocumentError {
    fn from_content(path: &Path, err: ContentError) -> Self {
        match err {
            ContentError::Decode(source) => DocumentError::Decode {
                path: path.to_path_buf(),
                source,
            },
            ContentError::Parse(message) => DocumentError::Parse {
                path: path.to_path_buf(),
                message,
            },
        }
    }

    /// File the error refers to
    pub fn path(&self) -> &Path {
        match self {
            DocumentError::Read { path, .. }
            | DocumentError::Decode { path, .. }
            | DocumentError::Parse { path, .. }
            | DocumentError::Write { path, .. } => path,
        }
    }

    /// Short machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentError::Read { .. } => "read",
            DocumentError::Decode { .. } => "decode",
            DocumentError::Parse { .. } => "parse",
            DocumentError::Write { .. } => "write",
        }
    }
}

/// Identity of a setting: its section tag and its own tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SettingKey {
    pub section: String,
    pub setting: String,
}

impl SettingKey {
    pub fn new(section: impl Into<String>, setting: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            setting: setting.into(),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.section, self.setting)
    }
}

impl Serialize for SettingKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A setting element found directly beneath a section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting {
    section: String,
    tag: String,
    attributes: Vec<(String, String)>,
    /// Index of the element's start event in the document body
    event: usize,
}

impl Setting {
    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn key(&self) -> SettingKey {
        SettingKey::new(self.section.as_str(), self.tag.as_str())
    }

    /// Unescaped attribute value
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The `Value` attribute, if present
    pub fn value(&self) -> Option<&str> {
        self.attribute(VALUE_ATTR)
    }

    fn to_start(&self) -> BytesStart<'static> {
        let mut start = BytesStart::new(self.tag.clone());
        for (key, value) in &self.attributes {
            start.push_attribute(Attribute {
                key: QName(key.as_bytes()),
                value: Cow::Owned(escape_attribute(value).into_bytes()),
            });
        }
        start
    }
}

/// A parsed configuration file
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    /// Comments, processing instructions and doctype before the root
    prolog: Vec<Event<'static>>,
    /// The root element, from its start tag through its end tag
    body: Vec<Event<'static>>,
    /// Comments and processing instructions after the root
    epilog: Vec<Event<'static>>,
    settings: Vec<Setting>,
    bom: Bom,
}

impl ConfigDocument {
    /// Read and parse a file
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let bytes = fs::read(path).map_err(|source| DocumentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes).map_err(|e| DocumentError::from_content(path, e))
    }

    /// Parse raw file bytes, remembering whether they carried a BOM
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContentError> {
        let (bom, content) = Bom::strip(bytes);
        let text = std::str::from_utf8(content)?;
        Self::parse(&normalize_newlines(text), bom)
    }

    fn parse(text: &str, bom: Bom) -> Result<Self, ContentError> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(false);
        reader.check_end_names(true);

        let mut doc = Self {
            prolog: Vec::new(),
            body: Vec::new(),
            epilog: Vec::new(),
            settings: Vec::new(),
            bom,
        };
        let mut depth = 0usize;
        let mut root_closed = false;
        let mut section = String::new();

        loop {
            let event = reader.read_event().map_err(|e| {
                ContentError::Parse(format!("{} at byte {}", e, reader.buffer_position()))
            })?;

            match &event {
                Event::Eof => break,
                // A fresh declaration is written on save
                Event::Decl(_) => continue,
                Event::Start(start) | Event::Empty(start) => {
                    if depth == 0 && root_closed {
                        return Err(ContentError::Parse(format!(
                            "second root element <{}>",
                            element_name(start)
                        )));
                    }
                    let attributes = read_attributes(start)?;
                    let level = depth + 1;
                    match level {
                        2 => section = element_name(start),
                        3 => doc.settings.push(Setting {
                            section: section.clone(),
                            tag: element_name(start),
                            attributes,
                            event: doc.body.len(),
                        }),
                        _ => {}
                    }
                    if matches!(event, Event::Start(_)) {
                        depth = level;
                    } else if depth == 0 {
                        root_closed = true;
                    }
                    doc.body.push(event.into_owned());
                }
                Event::End(end) => {
                    if depth == 0 {
                        return Err(ContentError::Parse(format!(
                            "unexpected closing tag </{}>",
                            String::from_utf8_lossy(end.name().as_ref())
                        )));
                    }
                    depth -= 1;
                    if depth == 0 {
                        root_closed = true;
                    }
                    doc.body.push(event.into_owned());
                }
                Event::Text(text) if depth == 0 => {
                    if !text.iter().all(u8::is_ascii_whitespace) {
                        return Err(ContentError::Parse(
                            "text outside the root element".to_string(),
                        ));
                    }
                }
                Event::CData(_) if depth == 0 => {
                    return Err(ContentError::Parse(
                        "CDATA outside the root element".to_string(),
                    ));
                }
                Event::Text(text) => {
                    text.unescape().map_err(|e| {
                        ContentError::Parse(format!(
                            "bad text at byte {}: {}",
                            reader.buffer_position(),
                            e
                        ))
                    })?;
                    doc.body.push(event.into_owned());
                }
                _ if depth == 0 => {
                    if root_closed {
                        doc.epilog.push(event.into_owned());
                    } else {
                        doc.prolog.push(event.into_owned());
                    }
                }
                _ => doc.body.push(event.into_owned()),
            }
        }

        if depth != 0 {
            return Err(ContentError::Parse("unclosed element at end of input".to_string()));
        }
        if doc.body.is_empty() {
            return Err(ContentError::Parse("no root element".to_string()));
        }

        Ok(doc)
    }

    /// BOM state of the file this document was read from
    pub fn bom(&self) -> Bom {
        self.bom
    }

    /// Settings in document order
    pub fn settings(&self) -> &[Setting] {
        &self.settings
    }

    /// Replace the `Value` of the setting at `index`.
    ///
    /// Returns the previous value when the stored string actually changed.
    /// Settings without a `Value` attribute are never touched.
    pub fn set_value(&mut self, index: usize, value: &str) -> Option<String> {
        let setting = self.settings.get_mut(index)?;
        let slot = setting
            .attributes
            .iter_mut()
            .find(|(key, _)| key == VALUE_ATTR)?;
        if slot.1 == value {
            return None;
        }
        let previous = std::mem::replace(&mut slot.1, value.to_string());

        let start = setting.to_start();
        let event = &mut self.body[setting.event];
        *event = if matches!(*event, Event::Start(_)) {
            Event::Start(start)
        } else {
            Event::Empty(start)
        };
        Some(previous)
    }

    /// Serialize as LF-terminated XML with a declaration and trailing newline
    pub fn to_xml(&self) -> io::Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        writer.get_mut().extend_from_slice(XML_DECLARATION);
        writer.get_mut().push(b'\n');

        for event in &self.prolog {
            write_event(&mut writer, event)?;
            writer.get_mut().push(b'\n');
        }
        for event in &self.body {
            write_event(&mut writer, event)?;
        }
        for event in &self.epilog {
            writer.get_mut().push(b'\n');
            write_event(&mut writer, event)?;
        }
        writer.get_mut().push(b'\n');

        Ok(writer.into_inner())
    }

    /// Bytes as they are written to disk: original BOM state, CRLF endings
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        Ok(encode_for_disk(&self.to_xml()?, self.bom))
    }

    /// Overwrite `path` with this document
    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        let write_err = |source| DocumentError::Write {
            path: path.to_path_buf(),
            source,
        };
        let bytes = self.to_bytes().map_err(write_err)?;
        fs::write(path, bytes).map_err(write_err)
    }
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn read_attributes(start: &BytesStart<'_>) -> Result<Vec<(String, String)>, ContentError> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| {
            ContentError::Parse(format!("bad attribute on <{}>: {}", element_name(start), e))
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if attr.value.contains(&b'<') {
            return Err(ContentError::Parse(format!(
                "'<' in value of {} on <{}>",
                key,
                element_name(start)
            )));
        }
        let value = attr.unescape_value().map_err(|e| {
            ContentError::Parse(format!(
                "bad value for {} on <{}>: {}",
                key,
                element_name(start),
                e
            ))
        })?;
        attributes.push((key, value.into_owned()));
    }
    Ok(attributes)
}

/// Escape markup characters plus tab, newline and carriage return, so
/// whitespace inside a value survives line-ending conversion on save
fn escape_attribute(value: &str) -> String {
    escape(value)
        .replace('\t', "&#9;")
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: &Event<'_>) -> io::Result<()> {
    writer
        .write_event(event)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Settings>
  <!-- layout -->
  <Display>
    <RulerDataType Value="1" />
    <Font Name="Arial" Value="12"></Font>
    <Caption>text</Caption>
  </Display>
  <Volume>
    <Opacity Value="50"/>
  </Volume>
</Settings>
"#;

    fn sample_crlf() -> Vec<u8> {
        SAMPLE.replace('\n', "\r\n").into_bytes()
    }

    fn keys(doc: &ConfigDocument) -> Vec<String> {
        doc.settings().iter().map(|s| s.key().to_string()).collect()
    }

    #[test]
    fn test_parse_collects_settings_in_order() {
        let doc = ConfigDocument::from_bytes(&sample_crlf()).unwrap();
        assert_eq!(
            keys(&doc),
            vec![
                "Display/RulerDataType",
                "Display/Font",
                "Display/Caption",
                "Volume/Opacity"
            ]
        );
        assert_eq!(doc.settings()[1].value(), Some("12"));
        assert_eq!(doc.settings()[1].attribute("Name"), Some("Arial"));
        assert_eq!(doc.settings()[2].value(), None);
        assert_eq!(doc.bom(), Bom::Absent);
    }

    #[test]
    fn test_parse_detects_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"<Root><A><B Value=\"x\"/></A></Root>");
        let doc = ConfigDocument::from_bytes(&bytes).unwrap();
        assert_eq!(doc.bom(), Bom::Present);
        assert_eq!(keys(&doc), vec!["A/B"]);
    }

    #[test]
    fn test_deeper_elements_are_not_settings() {
        let doc = ConfigDocument::from_bytes(
            b"<Root><A><B Value=\"1\"><C Value=\"2\"/></B></A><D Value=\"3\"/></Root>",
        )
        .unwrap();
        assert_eq!(keys(&doc), vec!["A/B"]);
    }

    #[test]
    fn test_unescapes_attribute_values() {
        let doc =
            ConfigDocument::from_bytes(b"<R><S><T Value=\"a &amp; &quot;b&quot;\"/></S></R>")
                .unwrap();
        assert_eq!(doc.settings()[0].value(), Some("a & \"b\""));
    }

    #[test]
    fn test_invalid_utf8_is_decode_error() {
        let err = ConfigDocument::from_bytes(b"<R><S><T Value=\"\xFF\"/></S></R>").unwrap_err();
        assert!(matches!(err, ContentError::Decode(_)));
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        for input in [
            "<R><S></R>",
            "<R><S>",
            "",
            "<R/><Q/>",
            "<R/>trailing",
            "</R>",
            "<R><S><T Value=\"1\" Value=\"2\"/></S></R>",
            "<R><S><T Value=\"&bogus;\"/></S></R>",
            "<R><S><T Value=\"a<b\"/></S></R>",
            "<R><S><T>a & b</T></S></R>",
            "<R><S><T>&bogus;</T></S></R>",
        ] {
            let err = ConfigDocument::from_bytes(input.as_bytes()).unwrap_err();
            assert!(
                matches!(err, ContentError::Parse(_)),
                "expected parse error for {:?}, got {:?}",
                input,
                err
            );
        }
    }

    #[test]
    fn test_set_value_reports_only_real_changes() {
        let mut doc = ConfigDocument::from_bytes(&sample_crlf()).unwrap();
        assert_eq!(doc.set_value(0, "1"), None);
        assert_eq!(doc.set_value(0, "3"), Some("1".to_string()));
        assert_eq!(doc.settings()[0].value(), Some("3"));
        // Caption has no Value attribute
        assert_eq!(doc.set_value(2, "x"), None);
        assert_eq!(doc.settings()[2].value(), None);
        assert_eq!(doc.set_value(99, "x"), None);
    }

    #[test]
    fn test_to_xml_preserves_layout() {
        let mut doc = ConfigDocument::from_bytes(&sample_crlf()).unwrap();
        doc.set_value(0, "3");
        let xml = String::from_utf8(doc.to_xml().unwrap()).unwrap();
        assert_eq!(
            xml,
            r#"<?xml version='1.0' encoding='utf-8'?>
<Settings>
  <!-- layout -->
  <Display>
    <RulerDataType Value="3"/>
    <Font Name="Arial" Value="12"></Font>
    <Caption>text</Caption>
  </Display>
  <Volume>
    <Opacity Value="50"/>
  </Volume>
</Settings>
"#
        );
    }

    #[test]
    fn test_set_value_writes_whitespace_as_char_refs() {
        let mut doc = ConfigDocument::from_bytes(
            b"<R><S><K Note=\"a&#10;b&#9;c\" Value=\"old\"/></S></R>",
        )
        .unwrap();
        doc.set_value(0, "x\r\ny");
        let xml = String::from_utf8(doc.to_xml().unwrap()).unwrap();
        assert!(xml.contains(r#"<K Note="a&#10;b&#9;c" Value="x&#13;&#10;y"/>"#));

        let reparsed = ConfigDocument::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(reparsed.settings()[0].value(), Some("x\r\ny"));
        assert_eq!(reparsed.settings()[0].attribute("Note"), Some("a\nb\tc"));
    }

    #[test]
    fn test_set_value_escapes_and_keeps_element_form() {
        let mut doc = ConfigDocument::from_bytes(&sample_crlf()).unwrap();
        doc.set_value(1, "<big> & \"bold\"");
        let xml = String::from_utf8(doc.to_xml().unwrap()).unwrap();
        assert!(xml.contains(
            "<Font Name=\"Arial\" Value=\"&lt;big&gt; &amp; &quot;bold&quot;\"></Font>"
        ));

        let reparsed = ConfigDocument::from_bytes(xml.as_bytes()).unwrap();
        assert_eq!(reparsed.settings()[1].value(), Some("<big> & \"bold\""));
    }

    #[test]
    fn test_prolog_and_epilog_comments_survive() {
        let doc = ConfigDocument::from_bytes(b"<!-- head -->\n<R><S/></R>\n<!-- tail -->\n").unwrap();
        let xml = String::from_utf8(doc.to_xml().unwrap()).unwrap();
        assert_eq!(
            xml,
            "<?xml version='1.0' encoding='utf-8'?>\n<!-- head -->\n<R><S/></R>\n<!-- tail -->\n"
        );
    }

    #[test]
    fn test_to_bytes_restores_bom_and_crlf() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(&sample_crlf());
        let doc = ConfigDocument::from_bytes(&bytes).unwrap();
        let out = doc.to_bytes().unwrap();

        assert!(out.starts_with(UTF8_BOM));
        assert!(out.ends_with(b"</Settings>"));
        let text = std::str::from_utf8(&out[UTF8_BOM.len()..]).unwrap();
        assert_eq!(text.matches("\r\n").count(), text.matches('\n').count());
    }

    #[test]
    fn test_saved_document_reloads_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Layout.xml");
        let mut doc = ConfigDocument::from_bytes(&sample_crlf()).unwrap();
        doc.set_value(3, "75");
        doc.save(&path).unwrap();

        let reloaded = ConfigDocument::load(&path).unwrap();
        assert_eq!(reloaded.settings(), doc.settings());
        assert_eq!(reloaded.to_bytes().unwrap(), std::fs::read(&path).unwrap());
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.xml");
        let err = ConfigDocument::load(&missing).unwrap_err();
        assert_eq!(err.kind(), "read");
        assert_eq!(err.path(), missing.as_path());

        let broken = dir.path().join("broken.tmp");
        std::fs::write(&broken, "<R><S></R>").unwrap();
        let err = ConfigDocument::load(&broken).unwrap_err();
        assert_eq!(err.kind(), "parse");
        assert!(err.to_string().contains("broken.tmp"));
    }
}

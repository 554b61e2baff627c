//! Byte-level encoding of configuration files
//!
//! Files are UTF-8, optionally prefixed with a byte-order mark, and are
//! always written back with CRLF line endings.

use serde::Serialize;

/// UTF-8 byte-order mark
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Whether a file starts with a UTF-8 byte-order mark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bom {
    Present,
    Absent,
}

impl Bom {
    /// Detect the BOM from the first three bytes
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(UTF8_BOM) {
            Bom::Present
        } else {
            Bom::Absent
        }
    }

    pub fn is_present(self) -> bool {
        self == Bom::Present
    }

    /// Split raw file bytes into the BOM state and the remaining content
    pub fn strip(bytes: &[u8]) -> (Self, &[u8]) {
        match Self::detect(bytes) {
            Bom::Present => (Bom::Present, &bytes[UTF8_BOM.len()..]),
            Bom::Absent => (Bom::Absent, bytes),
        }
    }
}

/// Apply XML end-of-line handling: `\r\n` and lone `\r` become `\n`.
pub fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    out
}

/// Turn serialized LF-terminated XML into the on-disk byte layout.
///
/// One trailing newline is dropped, the BOM is prepended when the
/// original file had one, and every `\n` becomes `\r\n`.
pub fn encode_for_disk(xml: &[u8], bom: Bom) -> Vec<u8> {
    let body = xml.strip_suffix(b"\n").unwrap_or(xml);
    let newlines = body.iter().filter(|&&b| b == b'\n').count();

    let mut out = Vec::with_capacity(UTF8_BOM.len() + body.len() + newlines);
    if bom.is_present() {
        out.extend_from_slice(UTF8_BOM);
    }
    for &byte in body {
        if byte == b'\n' {
            out.extend_from_slice(b"\r\n");
        } else {
            out.push(byte);
        }
    }
    out
}

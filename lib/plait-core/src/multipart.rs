//! `multipart/form-data` bodies.
//!
//! A [`Form`] is encoded when a request carries it, and decoded again by
//! [`crate::Body::form_data`].
//!
//! ```
//! use plait_core::{Form, Part};
//!
//! let form = Form::with_boundary("xyz")
//!     .part(Part::text("name", "John Doe"))
//!     .part(Part::file("avatar", "photo.jpg", vec![0xFF, 0xD8]));
//!
//! let (content_type, body) = form.into_body();
//! let decoded = Form::parse(&content_type, &body).expect("valid multipart");
//! assert_eq!(decoded.parts().len(), 2);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};

use crate::{Error, Result};

const CRLF: &[u8] = b"\r\n";
const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Extension to media type, consulted by [`Part::file`].
const MEDIA_TYPES: &[(&str, &str)] = &[
    ("bmp", "image/bmp"),
    ("csv", "text/csv"),
    ("gif", "image/gif"),
    ("gz", "application/gzip"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("json", "application/json"),
    ("md", "text/markdown"),
    ("mp3", "audio/mpeg"),
    ("mp4", "video/mp4"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("tar", "application/x-tar"),
    ("txt", "text/plain"),
    ("wasm", "application/wasm"),
    ("webp", "image/webp"),
    ("xml", "application/xml"),
    ("zip", "application/zip"),
];

fn media_type_for(filename: &str) -> &'static str {
    let Some((_, extension)) = filename.rsplit_once('.') else {
        return OCTET_STREAM;
    };
    MEDIA_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(extension))
        .map_or(OCTET_STREAM, |&(_, media_type)| media_type)
}

/// One field of a [`Form`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

impl Part {
    /// A field with neither filename nor content type.
    #[must_use]
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: None,
            data: data.into(),
        }
    }

    /// A UTF-8 text field.
    #[must_use]
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value.into()).with_content_type(TEXT_PLAIN_UTF8)
    }

    /// An opaque binary field.
    #[must_use]
    pub fn bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::new(name, data).with_content_type(OCTET_STREAM)
    }

    /// A file upload; the media type follows the filename extension.
    #[must_use]
    pub fn file(
        name: impl Into<String>,
        filename: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let filename = filename.into();
        let media_type = media_type_for(&filename);
        Self::new(name, data)
            .with_filename(filename)
            .with_content_type(media_type)
    }

    /// Sets the filename sent in `Content-Disposition`.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Sets the part's `Content-Type`.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Field name from the `Content-Disposition` header.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filename, for file uploads.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Content type, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Raw field bytes.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    fn write_to(&self, boundary: &str, out: &mut BytesMut) {
        let mut head = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"",
            self.name
        );
        if let Some(filename) = &self.filename {
            head.push_str(&format!("; filename=\"{filename}\""));
        }
        head.push_str("\r\n");
        if let Some(content_type) = &self.content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        head.push_str("\r\n");

        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(&self.data);
        out.extend_from_slice(CRLF);
    }
}

/// An ordered list of [`Part`]s sharing one boundary.
#[derive(Debug, Clone)]
pub struct Form {
    boundary: String,
    parts: Vec<Part>,
}

impl Default for Form {
    fn default() -> Self {
        Self::new()
    }
}

impl Form {
    /// An empty form with a generated boundary.
    #[must_use]
    pub fn new() -> Self {
        Self::with_boundary(fresh_boundary())
    }

    /// An empty form using `boundary`, which must not occur in any part.
    #[must_use]
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    /// Appends a part.
    #[must_use]
    pub fn part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Shorthand for `self.part(Part::text(name, value))`.
    #[must_use]
    pub fn text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.part(Part::text(name, value))
    }

    /// Shorthand for `self.part(Part::file(name, filename, data))`.
    #[must_use]
    pub fn file(
        self,
        name: impl Into<String>,
        filename: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.part(Part::file(name, filename, data))
    }

    /// Boundary delimiting the parts.
    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Parts, in insertion order.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// `multipart/form-data; boundary=...`
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Encodes the form, returning the `Content-Type` value with the bytes.
    #[must_use]
    pub fn into_body(self) -> (String, Bytes) {
        let mut out = BytesMut::new();
        for part in &self.parts {
            part.write_to(&self.boundary, &mut out);
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (self.content_type(), out.freeze())
    }

    /// Decodes a `multipart/form-data` body.
    ///
    /// The boundary is taken from the `boundary` parameter of `content_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conversion`] when the boundary is missing or the body
    /// is not well-formed multipart.
    pub fn parse(content_type: &str, body: &[u8]) -> Result<Self> {
        let boundary = boundary_of(content_type)
            .ok_or_else(|| Error::conversion("multipart content type without boundary"))?;
        let opening = format!("--{boundary}").into_bytes();
        let separator = [CRLF, opening.as_slice()].concat();

        let start = position(body, &opening, 0)
            .ok_or_else(|| Error::conversion("multipart body without opening boundary"))?;
        let mut at = start + opening.len();
        let mut parts = Vec::new();

        // After each boundary comes either `--` (the end) or a line break.
        while !body.get(at..).unwrap_or_default().starts_with(b"--") {
            at = skip_line_break(body, at)
                .ok_or_else(|| Error::conversion("malformed multipart boundary line"))?;

            let blank = position(body, b"\r\n\r\n", at)
                .ok_or_else(|| Error::conversion("multipart part without header terminator"))?;
            let data_at = blank + 4;
            let data_end = position(body, &separator, data_at)
                .ok_or_else(|| Error::conversion("multipart body without closing boundary"))?;

            let head = body.get(at..blank).unwrap_or_default();
            let data = body.get(data_at..data_end).unwrap_or_default();
            parts.push(read_part(head, Bytes::copy_from_slice(data))?);

            at = data_end + separator.len();
        }

        Ok(Self {
            boundary: boundary.to_string(),
            parts,
        })
    }
}

/// The value of `key=value` pairs after the first `;`, quotes stripped.
fn parameters(header_value: &str) -> impl Iterator<Item = (&str, &str)> {
    header_value.split(';').skip(1).filter_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        Some((key.trim(), value.trim().trim_matches('"')))
    })
}

fn boundary_of(content_type: &str) -> Option<&str> {
    parameters(content_type)
        .find(|(key, _)| key.eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

fn position(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    let found = haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)?;
    Some(from + found)
}

fn skip_line_break(body: &[u8], at: usize) -> Option<usize> {
    let rest = body.get(at..)?;
    if rest.starts_with(CRLF) {
        Some(at + 2)
    } else {
        rest.starts_with(b"\n").then_some(at + 1)
    }
}

fn read_part(head: &[u8], data: Bytes) -> Result<Part> {
    let head = std::str::from_utf8(head)
        .map_err(|e| Error::conversion(format!("multipart headers are not UTF-8: {e}")))?;

    let mut part = Part::new(String::new(), data);
    let mut named = false;

    for line in head.split("\r\n").filter(|line| !line.is_empty()) {
        let (header, value) = line
            .split_once(':')
            .ok_or_else(|| Error::conversion(format!("malformed multipart header: {line}")))?;
        let header = header.trim();
        let value = value.trim();

        if header.eq_ignore_ascii_case("content-type") {
            part.content_type = Some(value.to_string());
        } else if header.eq_ignore_ascii_case("content-disposition") {
            for (key, param) in parameters(value) {
                if key.eq_ignore_ascii_case("name") {
                    part.name = param.to_string();
                    named = true;
                } else if key.eq_ignore_ascii_case("filename") {
                    part.filename = Some(param.to_string());
                }
            }
        }
    }

    if named {
        Ok(part)
    } else {
        Err(Error::conversion("multipart part without a name"))
    }
}

fn fresh_boundary() -> String {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("----PlaitBoundary{nanos:x}{sequence:04x}")
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    #[test]
    fn part_constructors_pick_media_types() {
        check!(Part::text("field", "v").content_type() == Some(TEXT_PLAIN_UTF8));
        check!(Part::bytes("raw", vec![1, 2]).content_type() == Some(OCTET_STREAM));
        check!(Part::new("bare", "v").content_type().is_none());

        let upload = Part::file("upload", "Photo.JPG", vec![0xFF, 0xD8]);
        check!(upload.filename() == Some("Photo.JPG"));
        check!(upload.content_type() == Some("image/jpeg"));
    }

    #[test]
    fn media_type_falls_back_to_octet_stream() {
        check!(media_type_for("notes.md") == "text/markdown");
        check!(media_type_for("archive.unknown") == OCTET_STREAM);
        check!(media_type_for("README") == OCTET_STREAM);
    }

    #[test]
    fn generated_boundaries_differ() {
        let first = Form::new();
        let second = Form::new();
        check!(first.boundary().starts_with("----PlaitBoundary"));
        check!(first.boundary() != second.boundary());
    }

    #[test]
    fn encoded_layout() {
        let (content_type, body) = Form::with_boundary("sep")
            .text("field", "value")
            .file("upload", "a.txt", "file content")
            .into_body();

        check!(content_type == "multipart/form-data; boundary=sep");
        let shown = String::from_utf8_lossy(&body).replace("\r\n", "\\r\\n\n");
        insta::assert_snapshot!(shown.trim_end(), @r#"
        --sep\r\n
        Content-Disposition: form-data; name="field"\r\n
        Content-Type: text/plain; charset=utf-8\r\n
        \r\n
        value\r\n
        --sep\r\n
        Content-Disposition: form-data; name="upload"; filename="a.txt"\r\n
        Content-Type: text/plain\r\n
        \r\n
        file content\r\n
        --sep--\r\n
        "#);
    }

    #[test]
    fn parse_keeps_line_breaks_inside_data() {
        let original = Form::with_boundary("b0und")
            .text("name", "John")
            .file("upload", "notes.txt", "line one\r\nline two");
        let expected = original.parts().to_vec();
        let (content_type, body) = original.into_body();

        let parsed = Form::parse(&content_type, &body).expect("parse");
        check!(parsed.boundary() == "b0und");
        check!(parsed.parts() == expected.as_slice());
    }

    #[test]
    fn parse_quoted_boundary_and_bare_part() {
        let body = b"--abc\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--abc--\r\n";
        let parsed = Form::parse("multipart/form-data; boundary=\"abc\"", body).expect("parse");

        let_assert!([part] = parsed.parts());
        check!(part.name() == "a");
        check!(part.content_type().is_none());
        check!(part.data().as_ref() == b"1");
    }

    #[test]
    fn parse_rejects_malformed_input() {
        let cases: [(&str, &[u8]); 4] = [
            ("multipart/form-data", b"--x--"),
            ("multipart/form-data; boundary=x", b"garbage"),
            (
                "multipart/form-data; boundary=x",
                b"--x\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nunterminated",
            ),
            (
                "multipart/form-data; boundary=x",
                b"--x\r\nContent-Type: text/plain\r\n\r\nanonymous\r\n--x--",
            ),
        ];
        for (content_type, body) in cases {
            let_assert!(Err(Error::Conversion(_)) = Form::parse(content_type, body));
        }
    }
}

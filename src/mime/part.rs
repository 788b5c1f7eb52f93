//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mimecrypt.
//
// Mimecrypt is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mimecrypt is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mimecrypt. If not, see <http://www.gnu.org/licenses/>.

//! The owned MIME tree which both engines transform.
//!
//! Parsing is deliberately forgiving: real mail has LF-only line endings,
//! missing close delimiters, header blocks with no blank line after them, and
//! so on. Nothing here ever fails; the worst case is that something which
//! claims to be a multipart is treated as an opaque leaf.
//!
//! Every parsed part remembers the exact bytes it was parsed from. As long as
//! a part is not modified, serialising it reproduces those bytes, which is
//! what lets `multipart/signed` content verify after a round trip through
//! this model.

use std::collections::BTreeSet;
use std::fmt;

use rand::{distributions::Alphanumeric, Rng};

use super::content_encoding::ContentTransferEncoding;
use super::header::{
    parse_content_disposition, parse_content_type, ContentDisposition,
    ContentType,
};
use crate::crypt::trust::{EncryptionInfo, SignatureInfo};

/// Multiparts nested deeper than this are not split into children at parse
/// time.
const MAX_PARSE_DEPTH: u32 = 20;

/// A single header field.
///
/// The value is kept in its raw form, including the whitespace after the
/// colon and any folding, so that unmodified headers serialise exactly as
/// they were received. Folds are always stored with CRLF line endings.
#[derive(Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    raw_value: Vec<u8>,
}

impl Header {
    pub fn new(name: &str, value: &str) -> Self {
        let mut raw_value = Vec::with_capacity(value.len() + 1);
        raw_value.push(b' ');
        raw_value.extend_from_slice(value.as_bytes());
        Header {
            name: name.to_owned(),
            raw_value,
        }
    }

    /// Whether this header has the given name, ignoring case.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn raw_value(&self) -> &[u8] {
        &self.raw_value
    }

    /// The unfolded value, with surrounding whitespace removed.
    pub fn value(&self) -> String {
        let unfolded = self
            .raw_value
            .iter()
            .copied()
            .filter(|&b| b'\r' != b && b'\n' != b)
            .collect::<Vec<u8>>();
        String::from_utf8_lossy(&unfolded).trim().to_owned()
    }

    fn write_to(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(self.name.as_bytes());
        dst.push(b':');
        dst.extend_from_slice(&self.raw_value);
        dst.extend_from_slice(b"\r\n");
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Multipart {
    pub boundary: String,
    pub preamble: Vec<u8>,
    pub parts: Vec<Part>,
    /// Everything after the close delimiter, including the line ending which
    /// terminates it.
    pub epilogue: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    /// The content of a leaf part, still in its transfer encoding.
    Leaf(Vec<u8>),
    Multipart(Multipart),
}

/// A node in a MIME tree.
///
/// The decoration fields are filled in by `unwrap` and `wrap`; parsing leaves
/// them empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Part {
    headers: Vec<Header>,
    body: Body,
    raw: Option<Vec<u8>>,

    pub signature_info: Option<SignatureInfo>,
    pub encryption_info: Option<EncryptionInfo>,
    /// Lower-case names of the headers which were covered by a signature.
    pub signed_headers: BTreeSet<String>,
    /// Lower-case names of the headers which were inside a ciphertext.
    pub encrypted_headers: BTreeSet<String>,
}

impl Part {
    /// Parses a complete message or body part.
    pub fn parse(data: &[u8]) -> Self {
        parse_part(data, 0)
    }

    /// Creates a new leaf part with the given content type and already
    /// transfer-encoded content.
    pub fn leaf(content_type: &ContentType, content: Vec<u8>) -> Self {
        Part {
            headers: vec![Header::new(
                "Content-Type",
                &content_type.to_string(),
            )],
            body: Body::Leaf(content),
            raw: None,
            signature_info: None,
            encryption_info: None,
            signed_headers: BTreeSet::new(),
            encrypted_headers: BTreeSet::new(),
        }
    }

    /// Creates a new multipart with the given content type and children.
    ///
    /// A fresh boundary is generated and added to the content type.
    pub fn multipart(content_type: ContentType, parts: Vec<Part>) -> Self {
        let boundary = generate_boundary();
        let content_type = content_type.with_parm("boundary", &boundary);
        Part {
            headers: vec![Header::new(
                "Content-Type",
                &content_type.to_string(),
            )],
            body: Body::Multipart(Multipart {
                boundary,
                preamble: vec![],
                parts,
                epilogue: b"\r\n".to_vec(),
            }),
            raw: None,
            signature_info: None,
            encryption_info: None,
            signed_headers: BTreeSet::new(),
            encrypted_headers: BTreeSet::new(),
        }
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&Header> {
        self.headers.iter().find(|h| h.is(name))
    }

    pub fn header_value(&self, name: &str) -> Option<String> {
        self.header(name).map(Header::value)
    }

    /// Appends a header, leaving any existing ones with the same name.
    pub fn add_header(&mut self, header: Header) {
        self.raw = None;
        self.headers.push(header);
    }

    /// Replaces every header named `name` with a single one holding `value`.
    ///
    /// The new header takes the position of the first old one, or goes at
    /// the end if there was none.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.raw = None;
        let header = Header::new(name, value);
        match self.headers.iter().position(|h| h.is(name)) {
            Some(pos) => {
                self.headers[pos] = header;
                let mut ix = 0;
                self.headers.retain(|h| {
                    ix += 1;
                    ix - 1 <= pos || !h.is(name)
                });
            },
            None => self.headers.push(header),
        }
    }

    /// Removes and returns every header named `name`.
    pub fn remove_header(&mut self, name: &str) -> Vec<Header> {
        self.take_headers(|h| h.is(name))
    }

    /// Removes and returns every header matching `pred`, in order.
    pub fn take_headers(
        &mut self,
        mut pred: impl FnMut(&Header) -> bool,
    ) -> Vec<Header> {
        if !self.headers.iter().any(|h| pred(h)) {
            return vec![];
        }

        self.raw = None;
        let (taken, kept): (Vec<Header>, Vec<Header>) =
            self.headers.drain(..).partition(|h| pred(h));
        self.headers = kept;
        taken
    }

    /// Appends `headers` to this part.
    ///
    /// Existing headers sharing a name with one of the new headers are
    /// renamed to `X-Old-<Name>` if `keep_old` is set, and removed otherwise.
    /// An old header identical in value to a new one is always removed.
    /// Returns the lower-case names of the new headers.
    pub fn adopt_headers(
        &mut self,
        headers: Vec<Header>,
        keep_old: bool,
    ) -> BTreeSet<String> {
        self.raw = None;
        let names = headers
            .iter()
            .map(|h| h.name.to_ascii_lowercase())
            .collect::<BTreeSet<_>>();

        let mut old = self.take_headers(|h| {
            names.contains(&h.name.to_ascii_lowercase())
        });
        if keep_old {
            old.retain(|h| {
                !h.is("MIME-Version")
                    && !headers
                        .iter()
                        .any(|n| n.is(&h.name) && n.value() == h.value())
            });
            for h in &mut old {
                h.name = format!("X-Old-{}", h.name);
            }
            self.headers.extend(old);
        }

        self.headers.extend(headers);
        names
    }

    /// Replaces the content of this part with that of `inner`.
    ///
    /// This is how a wrapper part (`multipart/signed`, `multipart/encrypted`
    /// or a whole encrypted message) is replaced by what it protects while
    /// keeping the outer headers the inner part does not redefine. The outer
    /// `Content-*` headers always go away. Returns the lower-case names of
    /// the headers of `inner`.
    pub fn replace_with(
        &mut self,
        inner: Part,
        keep_old: bool,
    ) -> BTreeSet<String> {
        self.take_headers(is_content_header);
        let names = self.adopt_headers(inner.headers, keep_old);
        self.body = inner.body;
        self.raw = None;
        names
    }

    /// The content type, defaulting to `text/plain` as per RFC 2045.
    pub fn content_type(&self) -> ContentType {
        self.header("Content-Type")
            .and_then(|h| parse_content_type(h.raw_value()))
            .unwrap_or_else(ContentType::text_plain)
    }

    pub fn set_content_type(&mut self, content_type: &ContentType) {
        self.set_header("Content-Type", &content_type.to_string());
    }

    pub fn content_disposition(&self) -> Option<ContentDisposition> {
        self.header("Content-Disposition")
            .and_then(|h| parse_content_disposition(h.raw_value()))
    }

    pub fn is_attachment(&self) -> bool {
        self.content_disposition()
            .map_or(false, |cd| cd.is_attachment())
    }

    /// The file name from `Content-Disposition`, or failing that the legacy
    /// `name` parameter of `Content-Type`.
    pub fn filename(&self) -> Option<String> {
        self.content_disposition()
            .and_then(|cd| cd.filename().map(str::to_owned))
            .or_else(|| self.content_type().parm("name").map(str::to_owned))
    }

    pub fn content_transfer_encoding(&self) -> ContentTransferEncoding {
        self.header("Content-Transfer-Encoding")
            .and_then(|h| ContentTransferEncoding::parse(h.raw_value()))
            .unwrap_or_default()
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.body, Body::Multipart(_))
    }

    /// The still-encoded content of a leaf part.
    pub fn leaf_body(&self) -> Option<&[u8]> {
        match self.body {
            Body::Leaf(ref data) => Some(data),
            Body::Multipart(_) => None,
        }
    }

    /// The content of a leaf part with its transfer encoding removed.
    pub fn decoded_body(&self) -> Option<Vec<u8>> {
        self.leaf_body()
            .map(|data| self.content_transfer_encoding().decode(data))
    }

    /// Replaces the body with leaf content, already transfer-encoded.
    pub fn set_body(&mut self, content: Vec<u8>) {
        self.raw = None;
        self.body = Body::Leaf(content);
    }

    pub fn children(&self) -> &[Part] {
        match self.body {
            Body::Leaf(_) => &[],
            Body::Multipart(ref m) => &m.parts,
        }
    }

    /// Mutable access to the children of this part.
    ///
    /// Since the children may be changed through the returned reference, the
    /// retained raw form of this part is discarded.
    pub fn children_mut(&mut self) -> &mut Vec<Part> {
        self.raw = None;
        if let Body::Leaf(_) = self.body {
            // A leaf has no children, but a caller may still want to push
            // some; it becomes an empty multipart.
            self.body = Body::Multipart(Multipart {
                boundary: generate_boundary(),
                preamble: vec![],
                parts: vec![],
                epilogue: b"\r\n".to_vec(),
            });
        }

        match self.body {
            Body::Multipart(ref mut m) => &mut m.parts,
            Body::Leaf(_) => unreachable!(),
        }
    }

    /// The exact bytes this part was parsed from, if it is unmodified.
    pub fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// Serialises this part.
    ///
    /// Unmodified parsed parts reproduce their input exactly. Anything else
    /// is written with CRLF line endings.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut dst = Vec::new();
        self.write_to(&mut dst);
        dst
    }

    fn write_to(&self, dst: &mut Vec<u8>) {
        if let Some(ref raw) = self.raw {
            dst.extend_from_slice(raw);
            return;
        }

        for header in &self.headers {
            header.write_to(dst);
        }
        dst.extend_from_slice(b"\r\n");

        match self.body {
            Body::Leaf(ref data) => dst.extend_from_slice(data),
            Body::Multipart(ref m) => {
                if !m.preamble.is_empty() {
                    dst.extend_from_slice(&m.preamble);
                    dst.extend_from_slice(b"\r\n");
                }

                for (ix, part) in m.parts.iter().enumerate() {
                    if ix > 0 {
                        dst.extend_from_slice(b"\r\n");
                    }
                    dst.extend_from_slice(b"--");
                    dst.extend_from_slice(m.boundary.as_bytes());
                    dst.extend_from_slice(b"\r\n");
                    part.write_to(dst);
                }

                dst.extend_from_slice(b"\r\n--");
                dst.extend_from_slice(m.boundary.as_bytes());
                dst.extend_from_slice(b"--");
                dst.extend_from_slice(&m.epilogue);
            },
        }
    }

    /// Calls `f` on this part and every descendant, in depth-first
    /// pre-order.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Part)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }
}

pub fn is_content_header(header: &Header) -> bool {
    header
        .name
        .get(..8)
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case("Content-"))
}

fn generate_boundary() -> String {
    let random = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .collect::<String>();
    format!("=-{random}")
}

fn parse_part(data: &[u8], depth: u32) -> Part {
    let (headers, body_start) = parse_headers(data);
    let body = &data[body_start..];

    let multipart = headers
        .iter()
        .find(|h| h.is("Content-Type"))
        .and_then(|h| parse_content_type(h.raw_value()))
        .filter(|ct| ct.is_type("multipart") && depth < MAX_PARSE_DEPTH)
        .and_then(|ct| ct.parm("boundary").map(str::to_owned))
        .and_then(|boundary| parse_multipart(body, boundary, depth));

    Part {
        headers,
        body: multipart
            .map(Body::Multipart)
            .unwrap_or_else(|| Body::Leaf(body.to_vec())),
        raw: Some(data.to_vec()),
        signature_info: None,
        encryption_info: None,
        signed_headers: BTreeSet::new(),
        encrypted_headers: BTreeSet::new(),
    }
}

/// Splits `data` into lines, each including its line ending.
fn lines(data: &[u8]) -> impl Iterator<Item = (usize, &[u8])> + '_ {
    let mut pos = 0;
    std::iter::from_fn(move || {
        if pos >= data.len() {
            return None;
        }

        let start = pos;
        let end = memchr::memchr(b'\n', &data[start..])
            .map(|ix| start + ix + 1)
            .unwrap_or(data.len());
        pos = end;
        Some((start, &data[start..end]))
    })
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn is_header_name_char(b: u8) -> bool {
    b > b' ' && b < 0x7f && b':' != b
}

/// Parses the header block at the start of `data`.
///
/// Returns the headers and the offset at which the body starts. The block
/// ends at the first blank line (which is consumed) or at the first line
/// which is neither a header nor a continuation (which is not).
fn parse_headers(data: &[u8]) -> (Vec<Header>, usize) {
    let mut headers: Vec<Header> = Vec::new();

    for (start, line) in lines(data) {
        let content = trim_line_ending(line);
        if content.is_empty() {
            return (headers, start + line.len());
        }

        if matches!(content[0], b' ' | b'\t') {
            if let Some(last) = headers.last_mut() {
                last.raw_value.extend_from_slice(b"\r\n");
                last.raw_value.extend_from_slice(content);
                continue;
            }
        }

        let colon = content.iter().position(|&b| b':' == b);
        match colon {
            Some(colon)
                if colon > 0
                    && content[..colon]
                        .iter()
                        .copied()
                        .all(is_header_name_char) =>
            {
                headers.push(Header {
                    name: String::from_utf8_lossy(&content[..colon])
                        .into_owned(),
                    raw_value: content[colon + 1..].to_vec(),
                });
            },
            _ => return (headers, start),
        }
    }

    (headers, data.len())
}

/// A delimiter line found in a multipart body.
struct Delimiter {
    /// Where the delimiter starts, including the line break before it.
    start: usize,
    /// Where the content after the delimiter line starts.
    end: usize,
    close: bool,
}

fn find_delimiters(body: &[u8], boundary: &[u8]) -> Vec<Delimiter> {
    let mut delimiters = Vec::new();

    for (start, line) in lines(body) {
        let content = trim_line_ending(line);
        let rest = match content
            .strip_prefix(b"--")
            .and_then(|c| c.strip_prefix(boundary))
        {
            Some(rest) => rest,
            None => continue,
        };

        let (close, padding) = match rest.strip_prefix(b"--") {
            Some(padding) => (true, padding),
            None => (false, rest),
        };
        if !padding.iter().all(|&b| b' ' == b || b'\t' == b) {
            continue;
        }

        let line_break = if start >= 2 && b"\r\n" == &body[start - 2..start] {
            2
        } else if start >= 1 {
            1
        } else {
            0
        };

        delimiters.push(Delimiter {
            start: start - line_break,
            // The close delimiter keeps its line ending in the epilogue
            end: if close {
                start + content.len()
            } else {
                start + line.len()
            },
            close,
        });

        if close {
            break;
        }
    }

    delimiters
}

fn parse_multipart(
    body: &[u8],
    boundary: String,
    depth: u32,
) -> Option<Multipart> {
    let delimiters = find_delimiters(body, boundary.as_bytes());
    let first = delimiters.first()?;
    if first.close {
        return None;
    }

    let mut parts = Vec::new();
    let mut epilogue = b"\r\n".to_vec();
    for (ix, delim) in delimiters.iter().enumerate() {
        if delim.close {
            epilogue = body[delim.end..].to_vec();
            break;
        }

        // A missing close delimiter means the last part runs to the end
        let part_end = delimiters
            .get(ix + 1)
            .map_or(body.len(), |next| next.start);
        parts.push(parse_part(&body[delim.end..part_end], depth + 1));
    }

    Some(Multipart {
        preamble: body[..first.start].to_vec(),
        boundary,
        parts,
        epilogue,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const SIMPLE_MULTIPART: &[u8] = b"\
From: alice@a.example\r\n\
Subject: Test\r\n\x20folded\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
preamble\r\n\
--XYZ\r\n\
Content-Type: text/plain\r\n\
\r\n\
hello\r\n\
--XYZ\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=\"x.bin\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
aGVsbG8=\r\n\
--XYZ--\r\n\
epilogue\r\n";

    #[test]
    fn parse_simple_multipart() {
        let part = Part::parse(SIMPLE_MULTIPART);
        assert_eq!(
            Some("Test folded".to_owned()),
            part.header_value("subject")
        );
        assert!(part.content_type().is("multipart", "mixed"));

        let children = part.children();
        assert_eq!(2, children.len());
        assert_eq!(Some(&b"hello"[..]), children[0].leaf_body());
        assert!(!children[0].is_attachment());
        assert!(children[1].is_attachment());
        assert_eq!(Some("x.bin".to_owned()), children[1].filename());
        assert_eq!(Some(b"hello".to_vec()), children[1].decoded_body());

        match *part.body() {
            Body::Multipart(ref m) => {
                assert_eq!(b"preamble".to_vec(), m.preamble);
                assert_eq!(b"\r\nepilogue\r\n".to_vec(), m.epilogue);
            },
            Body::Leaf(_) => panic!("not parsed as multipart"),
        }
    }

    #[test]
    fn canonical_serialisation_is_exact() {
        let mut part = Part::parse(SIMPLE_MULTIPART);
        assert_eq!(SIMPLE_MULTIPART, &part.to_bytes()[..]);

        // Discard the retained bytes and make sure the regenerated form is
        // identical.
        part.children_mut();
        assert_eq!(None, part.raw());
        assert_eq!(SIMPLE_MULTIPART, &part.to_bytes()[..]);
    }

    #[test]
    fn raw_bytes_of_children_are_exact() {
        let data = b"Content-Type: multipart/signed; boundary=b\n\
                     \n\
                     --b\n\
                     Content-Type: text/plain\n\
                     \n\
                     trailing space  \n\
                     --b\n\
                     Content-Type: application/pgp-signature\n\
                     \n\
                     sig\n\
                     --b--\n";
        let part = Part::parse(data);
        assert_eq!(
            Some(&b"Content-Type: text/plain\n\ntrailing space  "[..]),
            part.children()[0].raw()
        );
    }

    #[test]
    fn parse_lenient_structure() {
        // No close delimiter, no blank line after the part headers
        let part = Part::parse(
            b"Content-Type: multipart/mixed; boundary=q\n\n\
              --q\nContent-Type: text/plain\nhello\n--q\n\nsecond\n",
        );
        assert_eq!(2, part.children().len());
        assert_eq!(Some(&b"hello"[..]), part.children()[0].leaf_body());
        assert_eq!(Some(&b"second\n"[..]), part.children()[1].leaf_body());

        // Boundary never appears
        let part =
            Part::parse(b"Content-Type: multipart/mixed; boundary=q\n\nhi\n");
        assert!(!part.is_multipart());
        assert!(part.children().is_empty());

        // Headers only
        let part = Part::parse(b"Subject: x");
        assert_eq!(Some("x".to_owned()), part.header_value("Subject"));
        assert_eq!(Some(&b""[..]), part.leaf_body());

        let part = Part::parse(b"");
        assert!(part.headers().is_empty());
        assert!(part.content_type().is("text", "plain"));
    }

    #[test]
    fn boundary_prefix_is_not_delimiter() {
        let part = Part::parse(
            b"Content-Type: multipart/mixed; boundary=ab\r\n\r\n\
              --ab\r\n\r\n--abc\r\n--ab--\r\n",
        );
        assert_eq!(1, part.children().len());
        assert_eq!(Some(&b"--abc"[..]), part.children()[0].leaf_body());
    }

    #[test]
    fn deep_nesting_stops_splitting() {
        let mut data = Vec::new();
        for i in 0..30 {
            data.extend_from_slice(
                format!(
                    "Content-Type: multipart/mixed; boundary=b{i}\r\n\
                     \r\n--b{i}\r\n"
                )
                .as_bytes(),
            );
        }
        data.extend_from_slice(b"\r\ninnermost");

        let part = Part::parse(&data);
        let mut depth = 0;
        let mut cursor = &part;
        while let Some(child) = cursor.children().first() {
            depth += 1;
            cursor = child;
        }
        assert_eq!(MAX_PARSE_DEPTH as usize, depth);
        assert_eq!(data, part.to_bytes());
    }

    #[test]
    fn header_mutation() {
        let mut part = Part::parse(SIMPLE_MULTIPART);
        part.set_header("subject", "Replaced");
        assert_eq!(None, part.raw());
        assert_eq!(Some("Replaced".to_owned()), part.header_value("Subject"));
        assert_eq!("subject", part.headers()[1].name);

        part.add_header(Header::new("X-A", "1"));
        part.add_header(Header::new("X-A", "2"));
        part.set_header("X-A", "3");
        assert_eq!(
            vec!["3".to_owned()],
            part.headers()
                .iter()
                .filter(|h| h.is("x-a"))
                .map(Header::value)
                .collect::<Vec<_>>()
        );

        let removed = part.remove_header("x-a");
        assert_eq!(1, removed.len());
        assert!(part.header("X-A").is_none());
    }

    #[test]
    fn replace_with_renames_collisions() {
        let mut outer = Part::parse(
            b"Subject: Outer\r\n\
              From: alice@a.example\r\n\
              MIME-Version: 1.0\r\n\
              Content-Type: multipart/encrypted; boundary=z\r\n\
              \r\n\
              --z\r\n\r\nx\r\n--z--\r\n",
        );
        let inner = Part::parse(
            b"Subject: Inner\r\n\
              MIME-Version: 1.0\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              secret\r\n",
        );

        let names = outer.replace_with(inner, true);
        assert_eq!(
            vec!["content-type", "mime-version", "subject"],
            names.iter().map(String::as_str).collect::<Vec<_>>()
        );
        assert_eq!(Some("Inner".to_owned()), outer.header_value("Subject"));
        assert_eq!(
            Some("Outer".to_owned()),
            outer.header_value("X-Old-Subject")
        );
        assert_eq!(
            Some("alice@a.example".to_owned()),
            outer.header_value("From")
        );
        assert!(outer.header("X-Old-MIME-Version").is_none());
        assert!(outer.content_type().is("text", "plain"));
        assert_eq!(Some(&b"secret\r\n"[..]), outer.leaf_body());

        let mut outer = Part::parse(b"Subject: Outer\r\n\r\n");
        outer.adopt_headers(vec![Header::new("Subject", "New")], false);
        assert_eq!(1, outer.headers().len());
        assert_eq!(Some("New".to_owned()), outer.header_value("Subject"));

        outer.adopt_headers(vec![Header::new("Subject", "New")], true);
        assert_eq!(1, outer.headers().len());
    }

    #[test]
    fn built_parts_reparse() {
        let text = Part::leaf(
            &ContentType::text_plain().with_parm("charset", "utf-8"),
            b"hello\r\n".to_vec(),
        );
        let mut attachment = Part::leaf(
            &ContentType::new("application", "octet-stream"),
            b"AAAA\r\n".to_vec(),
        );
        attachment.set_header(
            "Content-Disposition",
            &ContentDisposition::attachment(Some("a.bin")).to_string(),
        );
        let mixed = Part::multipart(
            ContentType::new("multipart", "mixed"),
            vec![text, attachment],
        );

        let bytes = mixed.to_bytes();
        let reparsed = Part::parse(&bytes);
        assert_eq!(2, reparsed.children().len());
        assert_eq!(
            Some("utf-8"),
            reparsed.children()[0].content_type().parm("charset")
        );
        assert_eq!(Some(&b"hello\r\n"[..]), reparsed.children()[0].leaf_body());
        assert_eq!(Some("a.bin".to_owned()), reparsed.children()[1].filename());
        assert_eq!(bytes, reparsed.to_bytes());
    }

    #[test]
    fn walk_visits_in_order() {
        let part = Part::parse(SIMPLE_MULTIPART);
        let mut types = Vec::new();
        part.walk(&mut |p| types.push(p.content_type().to_string()));
        assert_eq!(
            vec![
                "multipart/mixed; boundary=XYZ",
                "text/plain",
                "application/octet-stream",
            ],
            types
        );
    }
}

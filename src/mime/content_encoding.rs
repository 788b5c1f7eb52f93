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

//! Content transfer encodings and charset selection.

use std::fmt;

use super::quoted_printable::qp_decode;

/// RFC 2045 6.1 mechanism
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentTransferEncoding {
    SevenBit,
    EightBit,
    Binary,
    QuotedPrintable,
    Base64,
}

impl Default for ContentTransferEncoding {
    fn default() -> Self {
        ContentTransferEncoding::SevenBit
    }
}

impl ContentTransferEncoding {
    /// Parses a `Content-Transfer-Encoding` header value.
    ///
    /// Unknown mechanisms yield `None`, which callers treat as the identity
    /// encoding.
    pub fn parse(value: &[u8]) -> Option<Self> {
        let value = String::from_utf8_lossy(value);
        let value = value.trim();
        if value.eq_ignore_ascii_case("7bit") {
            Some(ContentTransferEncoding::SevenBit)
        } else if value.eq_ignore_ascii_case("8bit") {
            Some(ContentTransferEncoding::EightBit)
        } else if value.eq_ignore_ascii_case("binary") {
            Some(ContentTransferEncoding::Binary)
        } else if value.eq_ignore_ascii_case("quoted-printable") {
            Some(ContentTransferEncoding::QuotedPrintable)
        } else if value.eq_ignore_ascii_case("base64") {
            Some(ContentTransferEncoding::Base64)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ContentTransferEncoding::SevenBit => "7bit",
            ContentTransferEncoding::EightBit => "8bit",
            ContentTransferEncoding::Binary => "binary",
            ContentTransferEncoding::QuotedPrintable => "quoted-printable",
            ContentTransferEncoding::Base64 => "base64",
        }
    }

    /// Removes this transfer encoding from `data`.
    pub fn decode(self, data: &[u8]) -> Vec<u8> {
        match self {
            ContentTransferEncoding::SevenBit
            | ContentTransferEncoding::EightBit
            | ContentTransferEncoding::Binary => data.to_vec(),
            ContentTransferEncoding::QuotedPrintable => qp_decode(data),
            ContentTransferEncoding::Base64 => decode_base64(data),
        }
    }
}

impl fmt::Display for ContentTransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decodes base64 the way mail agents tolerate it.
///
/// Whitespace and other junk is discarded, and a malformed tail is dropped
/// instead of failing the whole body.
pub fn decode_base64(data: &[u8]) -> Vec<u8> {
    let filtered = data
        .iter()
        .copied()
        .filter(|&b| b.is_ascii_alphanumeric() || b'+' == b || b'/' == b)
        .collect::<Vec<u8>>();

    let config = base64::Config::new(base64::CharacterSet::Standard, false)
        .decode_allow_trailing_bits(true);
    // A lone trailing sextet can never decode to anything
    let usable = if 1 == filtered.len() % 4 {
        filtered.len() - 1
    } else {
        filtered.len()
    };

    base64::decode_config(&filtered[..usable], config).unwrap_or_default()
}

/// Encodes `data` as base64 with CRLF line endings every 76 characters.
///
/// The result always ends with a line ending unless `data` is empty.
pub fn encode_base64(data: &[u8]) -> Vec<u8> {
    let encoded = base64::encode(data);
    let mut out = Vec::with_capacity(encoded.len() + encoded.len() / 38 + 2);
    for line in encoded.as_bytes().chunks(76) {
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Chooses the first charset among `candidates` which can represent `text`
/// exactly.
///
/// `us-ascii` (or any alias of it) is only chosen if `text` is pure ASCII.
/// Unknown labels are skipped.
pub fn pick_charset<'a>(
    text: &[u8],
    candidates: &'a [String],
) -> Option<&'a str> {
    candidates
        .iter()
        .map(String::as_str)
        .find(|&label| charset_fits(text, label))
}

fn charset_fits(text: &[u8], label: &str) -> bool {
    if is_ascii_label(label) {
        return text.is_ascii();
    }

    encoding_rs::Encoding::for_label_no_replacement(label.as_bytes())
        .and_then(|enc| {
            enc.decode_without_bom_handling_and_without_replacement(text)
        })
        .is_some()
}

fn is_ascii_label(label: &str) -> bool {
    ["us-ascii", "ascii", "ansi_x3.4-1968", "iso646-us"]
        .iter()
        .any(|a| a.eq_ignore_ascii_case(label.trim()))
}

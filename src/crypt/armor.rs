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

//! ASCII armor (RFC 4880 6) and OpenPGP packet sniffing.

/// The armor lines which bracket protected text of some protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArmorMarkers {
    pub begin_signed: &'static str,
    pub end_signed: &'static str,
    pub begin_encrypted: &'static str,
    pub end_encrypted: &'static str,
    pub begin_signature: &'static str,
}

pub const OPENPGP_ARMOR: ArmorMarkers = ArmorMarkers {
    begin_signed: "-----BEGIN PGP SIGNED MESSAGE-----",
    end_signed: "-----END PGP SIGNATURE-----",
    begin_encrypted: "-----BEGIN PGP MESSAGE-----",
    end_encrypted: "-----END PGP MESSAGE-----",
    begin_signature: "-----BEGIN PGP SIGNATURE-----",
};

/// What a blob of possibly-OpenPGP data looks like.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SniffKind {
    Encrypted,
    Signature,
}

impl ArmorMarkers {
    /// Whether the whole of `text`, ignoring surrounding whitespace, is one
    /// armored ciphertext.
    pub fn is_encrypted(&self, text: &[u8]) -> bool {
        brackets(text, self.begin_encrypted, self.end_encrypted)
    }

    /// Whether the whole of `text`, ignoring surrounding whitespace, is one
    /// clearsigned message.
    pub fn is_clearsigned(&self, text: &[u8]) -> bool {
        brackets(text, self.begin_signed, self.end_signed)
    }
}

fn brackets(text: &[u8], begin: &str, end: &str) -> bool {
    let text = trim_ascii(text);
    text.len() >= begin.len() + end.len()
        && text.starts_with(begin.as_bytes())
        && text.ends_with(end.as_bytes())
}

pub fn trim_ascii(mut data: &[u8]) -> &[u8] {
    while let Some((first, rest)) = data.split_first() {
        if !first.is_ascii_whitespace() {
            break;
        }
        data = rest;
    }
    while let Some((last, rest)) = data.split_last() {
        if !last.is_ascii_whitespace() {
            break;
        }
        data = rest;
    }
    data
}

/// Classifies `data` by content alone.
///
/// Armored data is recognised by its first line. Binary data is recognised
/// by the tag and version of the first OpenPGP packet.
pub fn sniff(data: &[u8], markers: &ArmorMarkers) -> Option<SniffKind> {
    let text = trim_ascii(data);
    if text.starts_with(markers.begin_encrypted.as_bytes()) {
        Some(SniffKind::Encrypted)
    } else if text.starts_with(markers.begin_signed.as_bytes())
        || text.starts_with(markers.begin_signature.as_bytes())
    {
        Some(SniffKind::Signature)
    } else {
        sniff_packet(data)
    }
}

/// Looks at the first OpenPGP packet header (RFC 4880 4.2) of `data`.
fn sniff_packet(data: &[u8]) -> Option<SniffKind> {
    let (&ptag, rest) = data.split_first()?;
    if 0 == ptag & 0x80 {
        return None;
    }

    let (tag, length_len) = if 0 != ptag & 0x40 {
        let length_len = match *rest.first()? {
            0..=191 => 1,
            192..=223 => 2,
            255 => 5,
            _ => 1, // partial body length
        };
        (ptag & 0x3f, length_len)
    } else {
        let length_len = match ptag & 3 {
            0 => 1,
            1 => 2,
            2 => 4,
            _ => 0,
        };
        ((ptag >> 2) & 0x0f, length_len)
    };

    let first_body_byte = *rest.get(length_len)?;
    match (tag, first_body_byte) {
        // Public-key / symmetric-key encrypted session key, encrypted and
        // integrity protected data
        (1, 3) | (1, 6) | (3, 4..=6) | (18, 1) | (18, 2) => {
            Some(SniffKind::Encrypted)
        },
        // Signature, one-pass signature, compressed data
        (2, 3..=6) | (4, 3) | (4, 6) | (8, 0..=3) => Some(SniffKind::Signature),
        _ => None,
    }
}

/// Extracts the signed text from a clearsigned message (RFC 4880 7).
///
/// Dash-escaping is undone. The line break before the signature block is
/// part of the armor and is not included. Returns `None` if `text` is not a
/// complete clearsigned message.
pub fn dearmor_clearsigned(
    text: &[u8],
    markers: &ArmorMarkers,
) -> Option<Vec<u8>> {
    let text = trim_ascii(text);
    if !markers.is_clearsigned(text) {
        return None;
    }

    let mut lines = text.split(|&b| b'\n' == b);
    // The BEGIN line, then armor headers up to a blank line
    lines.next()?;
    for line in &mut lines {
        if trim_ascii(line).is_empty() {
            break;
        }
    }

    let mut out = Vec::with_capacity(text.len());
    let mut first = true;
    for line in lines {
        if line.starts_with(markers.begin_signature.as_bytes()) {
            if out.ends_with(b"\r") {
                out.pop();
            }
            return Some(out);
        }

        if !first {
            out.push(b'\n');
        }
        first = false;
        out.extend_from_slice(line.strip_prefix(b"- ").unwrap_or(line));
    }

    None
}

/// Applies dash-escaping to one line of clearsigned text.
pub fn dash_escape(line: &[u8], dst: &mut Vec<u8>) {
    if line.starts_with(b"-") {
        dst.extend_from_slice(b"- ");
    }
    dst.extend_from_slice(line);
}

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

/// A multipart message with alternatives and attachments, none of it
/// protected. One attachment is named like a signature but holds plain text.
pub static PLAIN_MULTIPART: &[u8] = include_bytes!("plain_multipart.eml");

/// A `multipart/mixed` holding two `multipart/encrypted` parts, neither of
/// them an attachment. The first decrypts to "Hi".
pub static EFAIL: &[u8] = include_bytes!("efail.eml");

/// A text part followed by three encrypted attachments:
///
/// - `notes.txt`, base64-encoded armor holding "meeting at noon";
/// - `backup.tar.GPG`, raw armor without a file name in the packet;
/// - `report.asc`, raw armor whose packet names "Q3 report.pdf".
pub static ENCRYPTED_ATTACHMENTS: &[u8] =
    include_bytes!("encrypted_attachments.eml");

/// A single text part labelled `us-ascii` containing armored ciphertext of
/// UTF-8 text.
pub static INLINE_ENCRYPTED: &[u8] = include_bytes!("inline_encrypted.eml");

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

use log::{debug, info};

use super::{Node, Unwrapper, WalkContext};
use crate::crypt::armor::{self, SniffKind};
use crate::crypt::backend::CryptoBackend;
use crate::crypt::trust::{EncryptionStatus, SignatureStatus};
use crate::mime::content_encoding::{encode_base64, ContentTransferEncoding};
use crate::mime::header::{ContentDisposition, ContentType};
use crate::mime::part::{is_content_header, Header, Part};
use crate::support::error::Error;

impl Unwrapper<'_> {
    /// Looks for OpenPGP data in an attachment.
    ///
    /// Attachments are judged only by their content. Their names and types
    /// are whatever the sender's client felt like.
    pub(super) fn visit_attachment(
        &mut self,
        part: &mut Part,
        ctx: WalkContext,
        node: Node,
    ) {
        let data = match part.decoded_body() {
            Some(data) => data,
            None => return,
        };

        let backends = self.backends;
        let sniffed = backends.iter().find_map(|backend| {
            backend.sniff(&data).map(|kind| (backend, kind))
        });
        let (backend, kind) = match sniffed {
            Some(found) => found,
            None => return,
        };

        if !self.options.unwrap_attachments {
            debug!(
                "{} Leaving protected attachment {:?} alone",
                self.log_prefix,
                part.filename()
            );
            return;
        }

        match kind {
            SniffKind::Encrypted => {
                if let Err(e) =
                    self.decrypt_attachment(part, ctx, node, backend, &data)
                {
                    self.fail_encryption(node, e);
                }
            },
            SniffKind::Signature => {
                if let Err(e) =
                    self.verify_attachment(part, ctx, node, backend, &data)
                {
                    self.fail_signature(node, e);
                }
            },
        }
    }

    fn decrypt_attachment(
        &mut self,
        part: &mut Part,
        ctx: WalkContext,
        node: Node,
        backend: &dyn CryptoBackend,
        data: &[u8],
    ) -> Result<(), Error> {
        if !ctx.allow_decrypt {
            return Err(self.forbid_decryption(ctx));
        }

        let decrypted = backend.decrypt(data, self.options.require_mdc)?;
        let trusted = is_trusted(decrypted.signature.status);
        let signed = self.adopt_signature(node, decrypted.signature);
        let status = decrypted.encryption.status;
        let packet_name = decrypted.encryption.filename.clone();
        self.adopt_encryption(node, decrypted.encryption);

        let enc_cover = match status {
            EncryptionStatus::Decrypted => Some(node.enc),
            // Armored, but only signed (`gpg --sign --armor`)
            EncryptionStatus::None
                if trusted && !decrypted.plaintext.is_empty() =>
            {
                ctx.enc_cover
            },
            _ => return Ok(()),
        };

        let filename = packet_name.or_else(|| {
            part.filename().map(|name| strip_crypto_suffix(&name).to_owned())
        });
        info!(
            "{} Opened attachment {:?} ({} bytes)",
            self.log_prefix,
            filename,
            decrypted.plaintext.len()
        );
        replace_attachment(part, &decrypted.plaintext, filename.as_deref());

        let sig_cover = if signed { Some(node.sig) } else { ctx.sig_cover };
        self.visit(part, ctx.inner(node, sig_cover, enc_cover));
        Ok(())
    }

    fn verify_attachment(
        &mut self,
        part: &mut Part,
        ctx: WalkContext,
        node: Node,
        backend: &dyn CryptoBackend,
        data: &[u8],
    ) -> Result<(), Error> {
        let markers = backend.armor();
        let (info, content, packet_name) = if markers.is_clearsigned(data) {
            let info = backend.verify(data, None)?;
            (info, backend.dearmor_clearsigned(data), None)
        } else if armor::trim_ascii(data)
            .starts_with(markers.begin_signature.as_bytes())
        {
            debug!(
                "{} Attachment {:?} is a detached signature",
                self.log_prefix,
                part.filename()
            );
            return Ok(());
        } else {
            // A signed message in the binary format; "decrypting" it
            // extracts the content.
            let decrypted = backend.decrypt(data, self.options.require_mdc)?;
            (
                decrypted.signature,
                Some(decrypted.plaintext),
                decrypted.encryption.filename,
            )
        };

        info!(
            "{} Signed attachment {:?}: {}",
            self.log_prefix,
            part.filename(),
            info.status
        );
        let trusted = is_trusted(info.status);
        let signed = self.adopt_signature(node, info);

        let content = match content {
            Some(content) if trusted && !content.is_empty() => content,
            _ => return Ok(()),
        };

        let filename = packet_name.or_else(|| {
            part.filename().map(|name| strip_crypto_suffix(&name).to_owned())
        });
        replace_attachment(part, &content, filename.as_deref());

        let sig_cover = if signed { Some(node.sig) } else { ctx.sig_cover };
        self.visit(part, ctx.inner(node, sig_cover, ctx.enc_cover));
        Ok(())
    }
}

/// Whether a signature verdict is good enough to show what was signed in
/// place of the attachment.
fn is_trusted(status: SignatureStatus) -> bool {
    matches!(
        status,
        SignatureStatus::Verified
            | SignatureStatus::Unverified
            | SignatureStatus::Signed
    )
}

/// Turns `part` into a base64 attachment holding `content`.
fn replace_attachment(
    part: &mut Part,
    content: &[u8],
    filename: Option<&str>,
) {
    part.take_headers(is_content_header);
    part.add_header(Header::new(
        "Content-Type",
        &ContentType::new("application", "octet-stream").to_string(),
    ));
    part.add_header(Header::new(
        "Content-Transfer-Encoding",
        ContentTransferEncoding::Base64.name(),
    ));
    part.add_header(Header::new(
        "Content-Disposition",
        &ContentDisposition::attachment(filename).to_string(),
    ));
    part.set_body(encode_base64(content));
}

/// Removes an extension conventionally given to OpenPGP files.
fn strip_crypto_suffix(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    for suffix in [".asc", ".gpg", ".pgp"] {
        if lower.len() > suffix.len() && lower.ends_with(suffix) {
            return &name[..name.len() - suffix.len()];
        }
    }
    name
}

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

use log::warn;

use super::{force_display, log_done, recipient_keys, Wrapper};
use crate::crypt::backend::{BackendOutput, KeyId};
use crate::crypt::trust::{EncryptionInfo, EncryptionStatus};
use crate::mime::content_encoding::ContentTransferEncoding;
use crate::mime::header::{ContentDisposition, ContentType};
use crate::mime::part::Part;
use crate::support::error::Error;

impl Wrapper<'_> {
    /// Encrypts `part` to `recipients` and `sender`.
    ///
    /// Produces `multipart/encrypted` (RFC 3156 4), or an armored text part
    /// if inline protection is preferred and possible.
    pub fn encrypt(
        &self,
        mut part: Part,
        sender: &KeyId,
        recipients: &[KeyId],
    ) -> Result<Part, Error> {
        let to_keys = recipient_keys(sender, recipients);

        if self.wants_inline(&part) {
            let text = part.decoded_body().unwrap_or_default();
            let output = self.run_encrypt(&text, &to_keys)?;
            part.set_header(
                "Content-Transfer-Encoding",
                ContentTransferEncoding::SevenBit.name(),
            );
            part.set_body(output.data);
            part.encryption_info = Some(self.encrypted_to(&to_keys));
            log_done(&self.log_prefix, "Encrypted inline", &to_keys);
            return Ok(part);
        }

        let prepared = self.prepare_wrap(&mut part);
        if !prepared.force_display.is_empty() {
            part = force_display(part, &prepared.force_display);
        }

        let output = self.run_encrypt(&part.to_bytes(), &to_keys)?;

        let mut version = Part::leaf(
            &ContentType::new("application", "pgp-encrypted"),
            b"Version: 1\r\n".to_vec(),
        );
        version.set_header(
            "Content-Description",
            "PGP/MIME version identification",
        );

        let mut ciphertext = Part::leaf(
            &ContentType::new("application", "octet-stream")
                .with_parm("name", "encrypted.asc"),
            output.data,
        );
        ciphertext
            .set_header("Content-Description", "OpenPGP encrypted message");
        let mut disposition = ContentDisposition::new("inline");
        disposition.set_parm("filename", "encrypted.asc");
        ciphertext.set_header("Content-Disposition", &disposition.to_string());

        let content_type = ContentType::new("multipart", "encrypted")
            .with_parm("protocol", self.backend.encryption_mime_type());
        let mut container =
            self.container(&prepared, content_type, vec![version, ciphertext]);
        container.encryption_info = Some(self.encrypted_to(&to_keys));
        container.encrypted_headers = prepared.protected;

        log_done(&self.log_prefix, "Encrypted", &to_keys);
        Ok(container)
    }

    fn run_encrypt(
        &self,
        payload: &[u8],
        to_keys: &[KeyId],
    ) -> Result<BackendOutput, Error> {
        let failure = || Error::EncryptionFailure {
            to_keys: to_keys.to_vec(),
        };

        match self.backend.encrypt(payload, to_keys, true) {
            Ok(output) if output.success() => Ok(output),
            Ok(output) => {
                warn!(
                    "{} Encryption failed with status {}",
                    self.log_prefix, output.status
                );
                Err(failure())
            },
            Err(e) => {
                warn!("{} Encryption failed: {}", self.log_prefix, e);
                Err(failure())
            },
        }
    }

    fn encrypted_to(&self, to_keys: &[KeyId]) -> EncryptionInfo {
        let mut info = EncryptionInfo::new(self.backend.protocol())
            .with_status(EncryptionStatus::Decrypted);
        info.description = "Encrypted".to_owned();
        info.details.have_keys = to_keys.iter().map(KeyId::to_string).collect();
        info
    }
}

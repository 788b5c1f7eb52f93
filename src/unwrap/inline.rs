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

//! ASCII-armored OpenPGP inside `text/plain` parts.

use log::{debug, info};

use super::{Node, Unwrapper, WalkContext};
use crate::crypt::armor;
use crate::crypt::backend::CryptoBackend;
use crate::crypt::trust::EncryptionStatus;
use crate::mime::content_encoding::{pick_charset, ContentTransferEncoding};
use crate::mime::part::Part;
use crate::support::error::Error;

impl Unwrapper<'_> {
    /// Decrypts or verifies a text part which consists of nothing but one
    /// armored block.
    ///
    /// Armor embedded in other text is left alone.
    pub(super) fn visit_text(
        &mut self,
        part: &mut Part,
        ctx: WalkContext,
        node: Node,
    ) {
        let text = match part.decoded_body() {
            Some(text) => text,
            None => return,
        };

        let backends = self.backends;
        for backend in backends.iter() {
            let markers = backend.armor();
            if markers.is_encrypted(&text) {
                if let Err(e) =
                    self.decrypt_inline(part, ctx, node, backend, &text)
                {
                    self.fail_encryption(node, e);
                }
                return;
            }

            if markers.is_clearsigned(&text) {
                let content = self.verify_clearsigned(node, backend, &text);
                self.set_text(part, content);
                return;
            }
        }
    }

    fn decrypt_inline(
        &mut self,
        part: &mut Part,
        ctx: WalkContext,
        node: Node,
        backend: &dyn CryptoBackend,
        text: &[u8],
    ) -> Result<(), Error> {
        if !ctx.allow_decrypt {
            return Err(self.forbid_decryption(ctx));
        }

        let decrypted = backend
            .decrypt(armor::trim_ascii(text), self.options.require_mdc)?;
        info!(
            "{} Inline encryption {}: {}",
            self.log_prefix,
            decrypted.encryption.status,
            decrypted.encryption.description
        );

        let signed = self.adopt_signature(node, decrypted.signature);
        let status = decrypted.encryption.status;
        self.adopt_encryption(node, decrypted.encryption);
        let opened = match status {
            EncryptionStatus::Decrypted => true,
            // Armored, but only signed
            EncryptionStatus::None => {
                signed && !decrypted.plaintext.is_empty()
            },
            _ => false,
        };
        if !opened {
            return Ok(());
        }

        let mut plaintext = decrypted.plaintext;
        if backend.armor().is_clearsigned(&plaintext) {
            plaintext = self.verify_clearsigned(node, backend, &plaintext);
        }

        self.set_text(part, plaintext);
        Ok(())
    }

    /// Verifies a clearsigned message and returns its text.
    ///
    /// The armor is removed even if verification fails; the verdict says
    /// what to think of the text.
    fn verify_clearsigned(
        &mut self,
        node: Node,
        backend: &dyn CryptoBackend,
        text: &[u8],
    ) -> Vec<u8> {
        match backend.verify(text, None) {
            Ok(info) => {
                info!(
                    "{} Inline signature {}: {}",
                    self.log_prefix, info.status, info.description
                );
                self.adopt_signature(node, info);
            },
            Err(e) => self.fail_signature(node, e),
        }

        backend
            .dearmor_clearsigned(text)
            .unwrap_or_else(|| text.to_vec())
    }

    /// Replaces the content of a text part with recovered `text`, labelled
    /// with the first configured charset that fits it.
    fn set_text(&self, part: &mut Part, text: Vec<u8>) {
        let mut content_type = part.content_type();
        match pick_charset(&text, &self.options.charsets) {
            Some(charset) => content_type.set_parm("charset", charset),
            None => debug!(
                "{} No configured charset fits the recovered text",
                self.log_prefix
            ),
        }
        part.set_content_type(&content_type);

        let cte = if text.is_ascii() {
            ContentTransferEncoding::SevenBit
        } else {
            ContentTransferEncoding::EightBit
        };
        part.set_header("Content-Transfer-Encoding", cte.name());
        part.set_body(text);
    }
}

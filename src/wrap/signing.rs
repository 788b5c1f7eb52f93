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

use super::{force_display, log_done, Wrapper};
use crate::crypt::backend::{BackendOutput, KeyId};
use crate::crypt::trust::{SignatureInfo, SignatureStatus};
use crate::mime::content_encoding::ContentTransferEncoding;
use crate::mime::header::{ContentDisposition, ContentType};
use crate::mime::normalise::normalise;
use crate::mime::part::Part;
use crate::support::error::Error;

impl Wrapper<'_> {
    /// Signs `part` with `sender`'s key.
    ///
    /// Produces `multipart/signed` (RFC 3156 5), or a clearsigned text part
    /// if inline protection is preferred and possible.
    pub fn sign(&self, mut part: Part, sender: &KeyId) -> Result<Part, Error> {
        if self.wants_inline(&part) {
            return self.clearsign(part, sender);
        }

        let prepared = self.prepare_wrap(&mut part);
        if !prepared.force_display.is_empty() {
            part = force_display(part, &prepared.force_display);
        }

        // What is signed is exactly what the first part will look like on
        // the wire.
        let signed_bytes = normalise(&part.to_bytes());
        let output = self.run_sign(&signed_bytes, sender, false)?;

        let mut signature = Part::leaf(
            &ContentType::new("application", "pgp-signature")
                .with_parm("name", "signature.asc"),
            output.data,
        );
        signature
            .set_header("Content-Description", "OpenPGP Digital Signature");
        signature.set_header(
            "Content-Disposition",
            &ContentDisposition::attachment(Some("signature.asc")).to_string(),
        );

        let content_type = ContentType::new("multipart", "signed")
            .with_parm("micalg", self.backend.micalg())
            .with_parm("protocol", self.backend.signature_mime_type());
        let mut container = self.container(
            &prepared,
            content_type,
            vec![Part::parse(&signed_bytes), signature],
        );
        container.signature_info = Some(self.signed_by(sender));
        container.signed_headers = prepared.protected;

        log_done(&self.log_prefix, "Signed", std::slice::from_ref(sender));
        Ok(container)
    }

    fn clearsign(&self, mut part: Part, sender: &KeyId) -> Result<Part, Error> {
        let text = normalise(&part.decoded_body().unwrap_or_default());
        let output = self.run_sign(&text, sender, true)?;

        let cte = if output.data.is_ascii() {
            ContentTransferEncoding::SevenBit
        } else {
            ContentTransferEncoding::EightBit
        };
        part.set_header("Content-Transfer-Encoding", cte.name());
        part.set_body(output.data);
        part.signature_info = Some(self.signed_by(sender));

        log_done(
            &self.log_prefix,
            "Clearsigned",
            std::slice::from_ref(sender),
        );
        Ok(part)
    }

    fn run_sign(
        &self,
        payload: &[u8],
        sender: &KeyId,
        clearsign: bool,
    ) -> Result<BackendOutput, Error> {
        let failure = || Error::SignatureFailure {
            from_key: sender.clone(),
        };

        match self.backend.sign(payload, sender, clearsign, true) {
            Ok(output) if output.success() => Ok(output),
            Ok(output) => {
                warn!(
                    "{} Signing with {} failed with status {}",
                    self.log_prefix, sender, output.status
                );
                Err(failure())
            },
            Err(e) => {
                warn!(
                    "{} Signing with {} failed: {}",
                    self.log_prefix, sender, e
                );
                Err(failure())
            },
        }
    }

    fn signed_by(&self, sender: &KeyId) -> SignatureInfo {
        let mut info = SignatureInfo::new(self.backend.protocol())
            .with_status(SignatureStatus::Verified);
        info.description = format!("Signed by {sender}");
        info.details.keyinfo = Some(sender.to_string());
        info
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;
    use crate::crypt::armor::ArmorMarkers;
    use crate::crypt::backend::{CryptoBackend, Decrypted};
    use crate::crypt::fake::FakePgp;
    use crate::support::log_prefix::LogPrefix;
    use crate::wrap::policy::REQUIRED;

    /// Hands everything to a `FakePgp`, remembering what it was asked to
    /// sign.
    struct Recording {
        pgp: FakePgp,
        signed: Mutex<Vec<Vec<u8>>>,
    }

    impl CryptoBackend for Recording {
        fn protocol(&self) -> &str {
            self.pgp.protocol()
        }

        fn armor(&self) -> &ArmorMarkers {
            self.pgp.armor()
        }

        fn verify(
            &self,
            payload: &[u8],
            signature: Option<&[u8]>,
        ) -> Result<SignatureInfo, Error> {
            self.pgp.verify(payload, signature)
        }

        fn decrypt(
            &self,
            payload: &[u8],
            require_mdc: bool,
        ) -> Result<Decrypted, Error> {
            self.pgp.decrypt(payload, require_mdc)
        }

        fn sign(
            &self,
            payload: &[u8],
            from_key: &KeyId,
            clearsign: bool,
            armor: bool,
        ) -> Result<BackendOutput, Error> {
            self.signed.lock().unwrap().push(payload.to_vec());
            self.pgp.sign(payload, from_key, clearsign, armor)
        }

        fn encrypt(
            &self,
            payload: &[u8],
            to_keys: &[KeyId],
            armor: bool,
        ) -> Result<BackendOutput, Error> {
            self.pgp.encrypt(payload, to_keys, armor)
        }
    }

    fn recording() -> Recording {
        Recording {
            pgp: FakePgp::new(&["alice"], &["alice"]),
            signed: Mutex::new(vec![]),
        }
    }

    #[test]
    fn clearsigning_signs_normalised_text() {
        let backend = recording();
        let wrapper =
            Wrapper::new(&backend, &REQUIRED, LogPrefix::new("t".to_owned()))
                .prefer_inline(true);
        let part = Part::leaf(
            &ContentType::text_plain(),
            b"line one   \nline two".to_vec(),
        );

        let signed = wrapper.sign(part, &KeyId::new("alice")).unwrap();
        assert_eq!(
            vec![b"line one\r\nline two\r\n".to_vec()],
            *backend.signed.lock().unwrap()
        );
        let body = signed.decoded_body().unwrap();
        assert!(backend.armor().is_clearsigned(&body));
        assert_eq!(
            SignatureStatus::Verified,
            backend.verify(&body, None).unwrap().status
        );
    }

    #[test]
    fn detached_signature_covers_first_part_bytes() {
        let backend = recording();
        let wrapper =
            Wrapper::new(&backend, &REQUIRED, LogPrefix::new("t".to_owned()));
        let part = Part::parse(
            b"Subject: Hi\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              trailing   \n",
        );

        let signed = wrapper.sign(part, &KeyId::new("alice")).unwrap();
        let payloads = backend.signed.lock().unwrap();
        assert_eq!(1, payloads.len());
        assert_eq!(normalise(&payloads[0]), payloads[0]);
        assert_eq!(payloads[0], signed.children()[0].to_bytes());
    }
}

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

//! A deterministic stand-in for OpenPGP, used by the tests.
//!
//! It provides no security whatsoever. "Ciphertext" is base64 with the
//! recipient list in an armor header, and a "signature" is a keyed hash of
//! the signed bytes. Detached signatures cover exactly the bytes given, so
//! callers which forget to canonicalise get a bad signature, as they would
//! from a real implementation. Clearsigned text is canonicalised the way
//! RFC 4880 7.1 prescribes.

use std::collections::BTreeSet;

use super::armor::{self, ArmorMarkers, OPENPGP_ARMOR};
use super::backend::{BackendOutput, CryptoBackend, Decrypted, KeyId};
use super::trust::*;
use crate::mime::content_encoding::{decode_base64, encode_base64};
use crate::mime::normalise::normalise;
use crate::support::error::Error;

#[derive(Clone, Debug, Default)]
pub struct FakePgp {
    /// Keys we can sign with and decrypt for.
    secret_keys: BTreeSet<String>,
    /// Keys we can verify signatures of and encrypt to.
    public_keys: BTreeSet<String>,
    /// Secret keys whose passphrase is not available.
    locked_keys: BTreeSet<String>,
    /// If set, every signing operation fails.
    pub fail_sign: bool,
}

impl FakePgp {
    pub fn new(secret_keys: &[&str], public_keys: &[&str]) -> Self {
        FakePgp {
            secret_keys: secret_keys.iter().map(|&k| k.to_owned()).collect(),
            public_keys: public_keys.iter().map(|&k| k.to_owned()).collect(),
            locked_keys: BTreeSet::new(),
            fail_sign: false,
        }
    }

    pub fn lock(mut self, key: &str) -> Self {
        self.locked_keys.insert(key.to_owned());
        self
    }

    /// Encrypts `payload` the way an attachment would be, with a file name
    /// in the literal data.
    pub fn encrypt_file(
        &self,
        payload: &[u8],
        to_keys: &[&str],
        filename: &str,
    ) -> Vec<u8> {
        encrypted_armor(
            payload,
            &[("To", &to_keys.join(",")), ("Filename", filename)],
        )
    }

    /// Encrypts `payload` without integrity protection.
    pub fn encrypt_without_mdc(
        &self,
        payload: &[u8],
        to_keys: &[&str],
    ) -> Vec<u8> {
        encrypted_armor(payload, &[("To", &to_keys.join(",")), ("MDC", "no")])
    }

    /// Creates a signature over `payload` without checking whether we hold
    /// the key.
    pub fn forge_signature(&self, payload: &[u8], key: &str) -> Vec<u8> {
        signature_armor(key, payload)
    }

    fn verify_signature_block(
        &self,
        text: &[u8],
        signature: &[u8],
    ) -> Result<SignatureInfo, Error> {
        let (headers, body) = split_armor(
            signature,
            OPENPGP_ARMOR.begin_signature,
            OPENPGP_ARMOR.end_signed,
        )
        .ok_or_else(|| Error::Backend("malformed signature".to_owned()))?;

        let key = header(&headers, "Key")
            .ok_or_else(|| Error::Backend("signature has no key".to_owned()))?;

        let mut info = SignatureInfo::new("openpgp");
        info.details.keyinfo = Some(key.to_owned());
        if key.contains('@') {
            info.details.email = Some(key.to_owned());
        }

        if !self.public_keys.contains(key) {
            info.status = SignatureStatus::Unknown;
            info.description = format!("No public key for {key}");
            return Ok(info);
        }

        let expected = checksum(key, text);
        if expected.as_bytes() == armor::trim_ascii(&body) {
            info.status = SignatureStatus::Verified;
            info.description = format!("Good signature from {key}");
        } else {
            info.status = SignatureStatus::Invalid;
            info.description = format!("BAD signature from {key}");
        }

        Ok(info)
    }
}

fn fnv1a(data: &[u8], mut hash: u64) -> u64 {
    for &b in data {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn checksum(key: &str, text: &[u8]) -> String {
    let hash = fnv1a(key.as_bytes(), 0xcbf2_9ce4_8422_2325);
    let hash = fnv1a(&[0], hash);
    format!("{:016x}", fnv1a(text, hash))
}

/// The text a clearsignature covers: canonical line endings, no trailing
/// whitespace, and no line break after the last line.
fn clearsigned_text(text: &[u8]) -> Vec<u8> {
    let mut text = normalise(text);
    if text.ends_with(b"\r\n") {
        text.truncate(text.len() - 2);
    }
    text
}

fn signature_armor(key: &str, text: &[u8]) -> Vec<u8> {
    format!(
        "{}\r\nKey: {}\r\n\r\n{}\r\n{}\r\n",
        OPENPGP_ARMOR.begin_signature,
        key,
        checksum(key, text),
        OPENPGP_ARMOR.end_signed
    )
    .into_bytes()
}

fn encrypted_armor(payload: &[u8], headers: &[(&str, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(OPENPGP_ARMOR.begin_encrypted.as_bytes());
    out.extend_from_slice(b"\r\n");
    for &(name, value) in headers {
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&encode_base64(payload));
    out.extend_from_slice(OPENPGP_ARMOR.end_encrypted.as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

/// Splits an armored block into its headers and body.
fn split_armor(
    data: &[u8],
    begin: &str,
    end: &str,
) -> Option<(Vec<(String, String)>, Vec<u8>)> {
    let text = armor::trim_ascii(data);
    let text = text.strip_prefix(begin.as_bytes())?;
    let text = text.strip_suffix(end.as_bytes())?;
    let text = String::from_utf8_lossy(text);

    let mut headers = Vec::new();
    let mut lines = text.lines().skip(1);
    for line in &mut lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':')?;
        headers.push((name.trim().to_owned(), value.trim().to_owned()));
    }

    let body = lines.collect::<Vec<_>>().join("\n").into_bytes();
    Some((headers, body))
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|&&(ref n, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, ref v)| v.as_str())
}

impl CryptoBackend for FakePgp {
    fn protocol(&self) -> &str {
        "openpgp"
    }

    fn armor(&self) -> &ArmorMarkers {
        &OPENPGP_ARMOR
    }

    fn verify(
        &self,
        payload: &[u8],
        signature: Option<&[u8]>,
    ) -> Result<SignatureInfo, Error> {
        match signature {
            Some(signature) => self.verify_signature_block(payload, signature),
            None => {
                let text = self.dearmor_clearsigned(payload).ok_or_else(|| {
                    Error::Backend("not a clearsigned message".to_owned())
                })?;
                let payload = armor::trim_ascii(payload);
                let sig_start = payload
                    .windows(OPENPGP_ARMOR.begin_signature.len())
                    .position(|w| w == OPENPGP_ARMOR.begin_signature.as_bytes())
                    .ok_or_else(|| {
                        Error::Backend("no signature block".to_owned())
                    })?;
                self.verify_signature_block(
                    &clearsigned_text(&text),
                    &payload[sig_start..],
                )
            },
        }
    }

    fn decrypt(
        &self,
        payload: &[u8],
        require_mdc: bool,
    ) -> Result<Decrypted, Error> {
        let (headers, body) = split_armor(
            payload,
            OPENPGP_ARMOR.begin_encrypted,
            OPENPGP_ARMOR.end_encrypted,
        )
        .ok_or_else(|| Error::Backend("malformed ciphertext".to_owned()))?;

        let recipients = header(&headers, "To")
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_owned)
            .collect::<Vec<_>>();

        let mut result = Decrypted::default();
        for key in recipients {
            if self.locked_keys.contains(&key) {
                result.encryption.details.locked_keys.push(key);
            } else if self.secret_keys.contains(&key) {
                result.encryption.details.have_keys.push(key);
            } else {
                result.encryption.details.missing_keys.push(key);
            }
        }

        let details = &result.encryption.details;
        if details.have_keys.is_empty() {
            result.encryption.status = if details.locked_keys.is_empty() {
                EncryptionStatus::MissingKey
            } else {
                EncryptionStatus::LockedKey
            };
            return Ok(result);
        }

        if require_mdc && Some("no") == header(&headers, "MDC") {
            result.encryption.status = EncryptionStatus::Error;
            result.encryption.description =
                "Message is not integrity protected".to_owned();
            return Ok(result);
        }

        result.encryption.status = EncryptionStatus::Decrypted;
        result.encryption.filename =
            header(&headers, "Filename").map(str::to_owned);
        result.plaintext = decode_base64(&body);
        Ok(result)
    }

    fn sign(
        &self,
        payload: &[u8],
        from_key: &KeyId,
        clearsign: bool,
        armor: bool,
    ) -> Result<BackendOutput, Error> {
        if self.fail_sign || !self.secret_keys.contains(from_key.as_str()) {
            return Ok(BackendOutput {
                status: 2,
                data: vec![],
            });
        }

        if !armor {
            return Err(Error::Backend("binary output unsupported".to_owned()));
        }

        let data = if clearsign {
            let text = normalise(payload);
            let signature =
                signature_armor(from_key.as_str(), &clearsigned_text(&text));
            let mut data = format!(
                "{}\r\nHash: SHA256\r\n\r\n",
                OPENPGP_ARMOR.begin_signed
            )
            .into_bytes();
            for line in text.split(|&b| b'\n' == b).filter(|l| !l.is_empty()) {
                armor::dash_escape(line, &mut data);
                data.push(b'\n');
            }
            data.extend_from_slice(&signature);
            data
        } else {
            signature_armor(from_key.as_str(), payload)
        };

        Ok(BackendOutput { status: 0, data })
    }

    fn encrypt(
        &self,
        payload: &[u8],
        to_keys: &[KeyId],
        armor: bool,
    ) -> Result<BackendOutput, Error> {
        if to_keys.is_empty()
            || to_keys
                .iter()
                .any(|k| !self.public_keys.contains(k.as_str()))
        {
            return Ok(BackendOutput {
                status: 2,
                data: vec![],
            });
        }

        if !armor {
            return Err(Error::Backend("binary output unsupported".to_owned()));
        }

        let to = to_keys
            .iter()
            .map(KeyId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        Ok(BackendOutput {
            status: 0,
            data: encrypted_armor(payload, &[("To", &to)]),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn alice() -> FakePgp {
        FakePgp::new(&["alice"], &["alice", "bob"])
    }

    #[test]
    fn detached_signature_detects_changes() {
        let pgp = alice();
        let out = pgp
            .sign(b"hello\n", &KeyId::new("alice"), false, true)
            .unwrap();
        assert!(out.success());

        let info = pgp.verify(b"hello\n", Some(&out.data)).unwrap();
        assert_eq!(SignatureStatus::Verified, info.status);
        assert_eq!(Some("alice"), info.details.keyinfo.as_deref());

        // Canonicalisation is the caller's business
        let info = pgp.verify(b"hello  \r\n\r\n", Some(&out.data)).unwrap();
        assert_eq!(SignatureStatus::Invalid, info.status);

        let info = pgp.verify(b"hullo\n", Some(&out.data)).unwrap();
        assert_eq!(SignatureStatus::Invalid, info.status);

        assert_matches!(
            Err(Error::Backend(_)),
            pgp.verify(b"hello", Some(b"junk"))
        );
    }

    #[test]
    fn detached_signature_covers_exact_bytes() {
        let pgp = alice();
        let sig = pgp
            .sign(b"Hello\r\n", &KeyId::new("alice"), false, true)
            .unwrap()
            .data;
        for variant in [&b"Hello   \n\n\n"[..], b"Hello\n", b"Hello"] {
            let info = pgp.verify(variant, Some(&sig)).unwrap();
            assert_eq!(SignatureStatus::Invalid, info.status);
        }
        let info = pgp.verify(b"Hello\r\n", Some(&sig)).unwrap();
        assert_eq!(SignatureStatus::Verified, info.status);
    }

    #[test]
    fn unknown_signer() {
        let pgp = alice();
        let sig = pgp.forge_signature(b"x", "mallory");
        let info = pgp.verify(b"x", Some(&sig)).unwrap();
        assert_eq!(SignatureStatus::Unknown, info.status);
    }

    #[test]
    fn clearsign_round_trip() {
        let pgp = alice();
        let out = pgp
            .sign(b"line one\n-- \nsig", &KeyId::new("alice"), true, true)
            .unwrap();
        assert!(OPENPGP_ARMOR.is_clearsigned(&out.data));

        let info = pgp.verify(&out.data, None).unwrap();
        assert_eq!(SignatureStatus::Verified, info.status);
        assert_eq!(
            Some(b"line one\r\n--\r\nsig".to_vec()),
            pgp.dearmor_clearsigned(&out.data)
        );

        let tampered = String::from_utf8(out.data)
            .unwrap()
            .replace("line one", "line two");
        let info = pgp.verify(tampered.as_bytes(), None).unwrap();
        assert_eq!(SignatureStatus::Invalid, info.status);
    }

    #[test]
    fn encrypt_round_trip() {
        let pgp = alice();
        let out = pgp
            .encrypt(
                b"secret",
                &[KeyId::new("bob"), KeyId::new("alice")],
                true,
            )
            .unwrap();
        assert!(OPENPGP_ARMOR.is_encrypted(&out.data));

        let decrypted = pgp.decrypt(&out.data, true).unwrap();
        assert_eq!(EncryptionStatus::Decrypted, decrypted.encryption.status);
        assert_eq!(b"secret".to_vec(), decrypted.plaintext);
        assert_eq!(vec!["alice"], decrypted.encryption.details.have_keys);
        assert_eq!(vec!["bob"], decrypted.encryption.details.missing_keys);

        let bob = FakePgp::new(&[], &["bob"]);
        let decrypted = bob.decrypt(&out.data, true).unwrap();
        assert_eq!(EncryptionStatus::MissingKey, decrypted.encryption.status);
        assert!(decrypted.plaintext.is_empty());

        let locked = FakePgp::new(&[], &[]).lock("alice");
        let decrypted = locked.decrypt(&out.data, true).unwrap();
        assert_eq!(EncryptionStatus::LockedKey, decrypted.encryption.status);
    }

    #[test]
    fn encrypt_failures() {
        let pgp = alice();
        assert!(!pgp
            .encrypt(b"x", &[KeyId::new("carol")], true)
            .unwrap()
            .success());
        assert!(!pgp
            .sign(b"x", &KeyId::new("bob"), false, true)
            .unwrap()
            .success());

        let mut failing = alice();
        failing.fail_sign = true;
        assert!(!failing
            .sign(b"x", &KeyId::new("alice"), false, true)
            .unwrap()
            .success());
    }

    #[test]
    fn mdc_enforcement() {
        let pgp = alice();
        let ciphertext = pgp.encrypt_without_mdc(b"old", &["alice"]);
        let decrypted = pgp.decrypt(&ciphertext, true).unwrap();
        assert_eq!(EncryptionStatus::Error, decrypted.encryption.status);

        let decrypted = pgp.decrypt(&ciphertext, false).unwrap();
        assert_eq!(EncryptionStatus::Decrypted, decrypted.encryption.status);
        assert_eq!(b"old".to_vec(), decrypted.plaintext);
    }

    #[test]
    fn file_name_is_recovered() {
        let pgp = alice();
        let ciphertext = pgp.encrypt_file(b"data", &["alice"], "report.pdf");
        let decrypted = pgp.decrypt(&ciphertext, true).unwrap();
        assert_eq!(
            Some("report.pdf"),
            decrypted.encryption.filename.as_deref()
        );
    }
}

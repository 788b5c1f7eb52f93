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

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::armor::{self, ArmorMarkers, SniffKind};
use super::trust::{EncryptionInfo, SignatureInfo};
use crate::support::error::Error;

pub const DEFAULT_PROTOCOL: &str = "openpgp";

/// Identifies a key to a backend.
///
/// This is whatever the backend accepts: a fingerprint, a long key id, or an
/// e-mail address to look up.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(id: impl Into<String>) -> Self {
        KeyId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The result of a decryption.
#[derive(Clone, Debug, Default)]
pub struct Decrypted {
    /// The verdict on a signature embedded in the ciphertext, if any.
    pub signature: SignatureInfo,
    /// `encryption.filename` holds the file name stored in the literal data
    /// packet, if there was one.
    pub encryption: EncryptionInfo,
    pub plaintext: Vec<u8>,
}

/// Raw output of a signing or encrypting operation.
///
/// `status` is the backend's exit code; anything other than 0 is a failure,
/// in which case `data` should not be used.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendOutput {
    pub status: i32,
    pub data: Vec<u8>,
}

impl BackendOutput {
    pub fn success(&self) -> bool {
        0 == self.status
    }
}

/// An implementation of the cryptographic primitives of one protocol.
///
/// The engines only ever call into this trait; everything about keys,
/// keyrings and the actual mathematics lives behind it. Calls may block.
pub trait CryptoBackend: Send + Sync {
    /// The protocol name, e.g. `openpgp`.
    fn protocol(&self) -> &str;

    fn armor(&self) -> &ArmorMarkers;

    /// The `protocol` parameter of `multipart/signed`.
    fn signature_mime_type(&self) -> &str {
        "application/pgp-signature"
    }

    /// The `protocol` parameter of `multipart/encrypted`.
    fn encryption_mime_type(&self) -> &str {
        "application/pgp-encrypted"
    }

    /// The `micalg` parameter of `multipart/signed`.
    fn micalg(&self) -> &str {
        "pgp-sha256"
    }

    /// Determines whether `data`, with any transfer encoding already
    /// removed, holds protected data of this protocol, by content alone.
    fn sniff(&self, data: &[u8]) -> Option<SniffKind> {
        armor::sniff(data, self.armor())
    }

    /// Verifies a signature.
    ///
    /// With `signature`, `payload` is the exact signed content and
    /// `signature` the detached signature. Without it, `payload` is a
    /// clearsigned or otherwise self-contained signed message.
    fn verify(
        &self,
        payload: &[u8],
        signature: Option<&[u8]>,
    ) -> Result<SignatureInfo, Error>;

    fn decrypt(
        &self,
        payload: &[u8],
        require_mdc: bool,
    ) -> Result<Decrypted, Error>;

    fn sign(
        &self,
        payload: &[u8],
        from_key: &KeyId,
        clearsign: bool,
        armor: bool,
    ) -> Result<BackendOutput, Error>;

    fn encrypt(
        &self,
        payload: &[u8],
        to_keys: &[KeyId],
        armor: bool,
    ) -> Result<BackendOutput, Error>;

    /// Strips the armor from a clearsigned message, returning the text.
    fn dearmor_clearsigned(&self, text: &[u8]) -> Option<Vec<u8>> {
        armor::dearmor_clearsigned(text, self.armor())
    }
}

/// The available backends, keyed by protocol name.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn CryptoBackend>>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.backends.keys()).finish()
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, backend: Arc<dyn CryptoBackend>) -> Self {
        self.register(backend);
        self
    }

    /// Adds `backend`, replacing any existing one for the same protocol.
    pub fn register(&mut self, backend: Arc<dyn CryptoBackend>) {
        self.backends
            .insert(backend.protocol().to_owned(), backend);
    }

    pub fn get(&self, protocol: &str) -> Option<&dyn CryptoBackend> {
        self.backends.get(protocol).map(|b| &**b)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn CryptoBackend> + '_ {
        self.backends.values().map(|b| &**b)
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Selects the backend for a `multipart/signed` container with the
    /// given `protocol` parameter.
    pub fn for_signature_type(
        &self,
        mime_type: Option<&str>,
    ) -> Option<&dyn CryptoBackend> {
        self.select(mime_type, |b| b.signature_mime_type())
    }

    /// Selects the backend for a `multipart/encrypted` container with the
    /// given `protocol` parameter.
    pub fn for_encryption_type(
        &self,
        mime_type: Option<&str>,
    ) -> Option<&dyn CryptoBackend> {
        self.select(mime_type, |b| b.encryption_mime_type())
    }

    fn select(
        &self,
        mime_type: Option<&str>,
        backend_type: impl Fn(&dyn CryptoBackend) -> &str,
    ) -> Option<&dyn CryptoBackend> {
        mime_type
            .and_then(|mime_type| {
                self.iter().find(|&b| {
                    backend_type(b).eq_ignore_ascii_case(mime_type.trim())
                })
            })
            .or_else(|| self.get(DEFAULT_PROTOCOL))
    }
}

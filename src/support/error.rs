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

use std::io;

use thiserror::Error;

use crate::crypt::backend::KeyId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed message structure: {0}")]
    Parse(String),
    #[error("Crypto backend failed: {0}")]
    Backend(String),
    #[error("Decryption forbidden, MIME structure is suspicious")]
    DecryptionForbidden,
    #[error("Invalid trust status: {0}")]
    InvalidStatus(String),
    #[error("No crypto backend for protocol {0}")]
    NoBackend(String),
    #[error("Failed to sign message with key {from_key}")]
    SignatureFailure { from_key: KeyId },
    #[error("Failed to encrypt message to keys {}", key_list(.to_keys))]
    EncryptionFailure { to_keys: Vec<KeyId> },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

fn key_list(keys: &[KeyId]) -> String {
    keys.iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

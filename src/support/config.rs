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

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::Error;
use crate::wrap::policy::{self, HeaderPolicy};

/// The configuration for Mimecrypt.
///
/// This is typically stored in a file named `mimecrypt.toml` owned by
/// whatever embeds the library. Every section and every field is optional.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Options for decoding received mail.
    #[serde(default)]
    pub unwrap: UnwrapOptions,

    /// Options for protecting outgoing mail.
    #[serde(default)]
    pub wrap: WrapOptions,

    /// How to run GnuPG, if the GnuPG backend is used.
    #[serde(default)]
    pub gnupg: GnupgConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct UnwrapOptions {
    /// Whether attachments which sniff as OpenPGP data are decrypted or
    /// verified and replaced with their content.
    pub unwrap_attachments: bool,
    /// Whether the backend must reject ciphertext without a modification
    /// detection code.
    pub require_mdc: bool,
    /// If true, any part of a message may trigger decryption.
    ///
    /// This disables the EFail mitigation, which only allows decrypting the
    /// first part of each multipart level and explicit attachments. Do not
    /// set this unless nothing downstream ever renders remote content.
    pub efail_unsafe: bool,
    /// The deepest MIME nesting level which is examined at all.
    pub max_depth: u32,
    /// Candidate charsets, in order of preference, used to label text
    /// recovered from inline ciphertext or clearsigned blocks.
    pub charsets: Vec<String>,
}

impl Default for UnwrapOptions {
    fn default() -> Self {
        UnwrapOptions {
            unwrap_attachments: true,
            require_mdc: true,
            efail_unsafe: false,
            max_depth: 6,
            charsets: vec!["us-ascii".to_owned(), "utf-8".to_owned()],
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WrapMode {
    Sign,
    Encrypt,
    SignThenEncrypt,
}

/// Names one of the canned header policies.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyName {
    Required,
    Mild,
    Extreme,
}

impl PolicyName {
    pub fn policy(self) -> &'static HeaderPolicy {
        match self {
            PolicyName::Required => &policy::REQUIRED,
            PolicyName::Mild => &policy::MILD,
            PolicyName::Extreme => &policy::EXTREME,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct WrapOptions {
    pub mode: WrapMode,
    /// Which headers are moved inside the protected envelope and how the
    /// public copies are obscured.
    pub policy: PolicyName,
    /// If the message is a single `text/plain` part, sign and/or encrypt
    /// the text in place with ASCII armor instead of building PGP/MIME
    /// structure.
    pub prefer_inline: bool,
    /// The backend protocol to protect with.
    pub protocol: String,
}

impl Default for WrapOptions {
    fn default() -> Self {
        WrapOptions {
            mode: WrapMode::SignThenEncrypt,
            policy: PolicyName::Mild,
            prefer_inline: false,
            protocol: "openpgp".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct GnupgConfig {
    /// The `gpg` executable. Looked up on `PATH` if not absolute.
    pub binary: PathBuf,
    /// If set, passed as `--homedir`.
    pub homedir: Option<PathBuf>,
    /// Arguments placed first on every command line, ahead of those
    /// chosen here.
    pub extra_args: Vec<String>,
}

impl Default for GnupgConfig {
    fn default() -> Self {
        GnupgConfig {
            binary: PathBuf::from("gpg"),
            homedir: None,
            extra_args: vec![],
        }
    }
}

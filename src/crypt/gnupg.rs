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

//! A `CryptoBackend` which drives the `gpg` executable.
//!
//! Every operation runs one `gpg` process in batch mode. Inputs are written
//! to temporary files first so that there is never a pipe in both directions
//! which could deadlock. Verdicts are read from the machine-readable status
//! lines (`--status-fd`), never from the human-readable messages.

use std::ffi::OsString;
use std::io::Write;
use std::process::{Command, Stdio};

use chrono::prelude::*;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use super::armor::{ArmorMarkers, OPENPGP_ARMOR};
use super::backend::{BackendOutput, CryptoBackend, Decrypted, KeyId};
use super::trust::*;
use crate::support::config::GnupgConfig;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

const STATUS_PREFIX: &str = "[GNUPG:] ";

#[derive(Clone, Debug)]
pub struct GnuPg {
    config: GnupgConfig,
    log_prefix: LogPrefix,
}

/// One `[GNUPG:]` status line.
#[derive(Clone, Debug, PartialEq, Eq)]
struct StatusLine {
    keyword: String,
    /// Everything after the keyword.
    rest: String,
}

impl StatusLine {
    fn arg(&self, ix: usize) -> Option<&str> {
        self.rest.split_whitespace().nth(ix)
    }

    /// The text after the first argument, e.g. the user id of `GOODSIG`.
    fn tail(&self) -> &str {
        self.rest
            .trim_start()
            .split_once(' ')
            .map_or("", |(_, tail)| tail.trim())
    }
}

struct GpgOutput {
    code: i32,
    stdout: Vec<u8>,
    status: Vec<StatusLine>,
}

fn parse_status(stderr: &[u8]) -> Vec<StatusLine> {
    String::from_utf8_lossy(stderr)
        .lines()
        .filter_map(|line| line.strip_prefix(STATUS_PREFIX))
        .map(|line| {
            let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));
            StatusLine {
                keyword: keyword.to_owned(),
                rest: rest.to_owned(),
            }
        })
        .collect()
}

impl GnuPg {
    pub fn new(config: GnupgConfig) -> Self {
        GnuPg {
            config,
            log_prefix: LogPrefix::new("gnupg".to_owned()),
        }
    }

    fn run(
        &self,
        args: &[OsString],
        input: &[u8],
    ) -> Result<GpgOutput, Error> {
        let mut stdin = tempfile::tempfile()?;
        stdin.write_all(input)?;
        std::io::Seek::rewind(&mut stdin)?;

        let mut command = Command::new(&self.config.binary);
        command
            .args(&self.config.extra_args)
            .args(["--batch", "--no-tty", "--status-fd", "2"]);
        if let Some(ref homedir) = self.config.homedir {
            command.arg("--homedir").arg(homedir);
        }
        command
            .args(args)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("{} Running {:?}", self.log_prefix, command);
        let output = command.output().map_err(|e| {
            warn!(
                "{} Failed to run {}: {}",
                self.log_prefix,
                self.config.binary.display(),
                e
            );
            Error::Backend(format!("cannot run gpg: {e}"))
        })?;

        let code = output.status.code().unwrap_or(-1);
        if 0 != code {
            debug!("{} gpg exited with status {}", self.log_prefix, code);
        }

        Ok(GpgOutput {
            code,
            stdout: output.stdout,
            status: parse_status(&output.stderr),
        })
    }
}

lazy_static! {
    static ref NAME_EMAIL: Regex =
        Regex::new(r"^\s*(.*?)\s*<([^<>]+)>\s*$").unwrap();
}

/// Splits a user id of the form `Name <email>`.
fn split_uid(uid: &str) -> (Option<String>, Option<String>) {
    match NAME_EMAIL.captures(uid) {
        Some(c) => {
            let name = c.get(1).map(|m| m.as_str()).filter(|n| !n.is_empty());
            (name.map(str::to_owned), c.get(2).map(|m| m.as_str().to_owned()))
        },
        None if uid.contains('@') => (None, Some(uid.trim().to_owned())),
        None if uid.is_empty() => (None, None),
        None => (Some(uid.to_owned()), None),
    }
}

/// GnuPG writes timestamps either as seconds since the epoch or in ISO 8601
/// basic format.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(seconds) = s.parse::<i64>() {
        return Utc.timestamp_opt(seconds, 0).single();
    }

    NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| Utc.from_utc_datetime(&dt))
}

/// Undoes the percent-escaping of `PLAINTEXT` file names.
fn unescape_percent(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut ix = 0;
    while ix < bytes.len() {
        if b'%' == bytes[ix] {
            if let Some(b) = bytes
                .get(ix + 1..ix + 3)
                .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
            {
                out.push(b);
                ix += 3;
                continue;
            }
        }
        out.push(bytes[ix]);
        ix += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Derives a signature verdict from the status lines of a verification.
///
/// Returns a verdict of `none` if no signature was seen at all.
fn signature_info(status: &[StatusLine]) -> SignatureInfo {
    let mut info = SignatureInfo::new("openpgp");

    for line in status {
        let mut uid = None;
        match &line.keyword[..] {
            "GOODSIG" => {
                info.status = SignatureStatus::Unverified;
                uid = Some(line.tail());
            },
            "EXPSIG" | "EXPKEYSIG" => {
                info.status = SignatureStatus::Expired;
                uid = Some(line.tail());
            },
            "REVKEYSIG" => {
                info.status = SignatureStatus::Revoked;
                uid = Some(line.tail());
            },
            "BADSIG" => {
                info.status = SignatureStatus::Invalid;
                uid = Some(line.tail());
            },
            "ERRSIG" => {
                if SignatureStatus::None == info.status {
                    info.status = SignatureStatus::Error;
                }
                info.details.keyinfo = line.arg(0).map(str::to_owned);
                info.details.timestamp = line.arg(4).and_then(parse_timestamp);
            },
            "NO_PUBKEY" => {
                info.status = SignatureStatus::Unknown;
                info.details.keyinfo = line.arg(0).map(str::to_owned);
            },
            "VALIDSIG" => {
                info.details.keyinfo = line.arg(0).map(str::to_owned);
                info.details.timestamp = line.arg(2).and_then(parse_timestamp);
            },
            "TRUST_FULLY" | "TRUST_ULTIMATE" => {
                if SignatureStatus::Unverified == info.status {
                    info.status = SignatureStatus::Verified;
                }
            },
            _ => (),
        }

        if let Some(uid) = uid {
            let (name, email) = split_uid(uid);
            info.details.name = name;
            info.details.email = email;
            if info.details.keyinfo.is_none() {
                info.details.keyinfo = line.arg(0).map(str::to_owned);
            }
        }
    }

    info.description = match info.status {
        SignatureStatus::None => String::new(),
        status => status.to_string(),
    };
    info
}

/// Derives an encryption verdict from the status lines of a decryption.
///
/// Data which was only signed yields literal data without any sign of
/// decryption; its verdict is `none`. Also returns whether the plaintext
/// was integrity protected.
fn encryption_info(status: &[StatusLine]) -> (EncryptionInfo, bool) {
    let mut info = EncryptionInfo::new("openpgp");
    let mut recipients = Vec::<String>::new();
    let mut missing = Vec::<String>::new();
    let mut need_passphrase = Vec::<String>::new();
    let mut passphrase_failed = false;
    let mut encrypted = false;
    let mut literal = false;
    let mut okay = false;
    let mut failed = false;
    let mut mdc = false;

    for line in status {
        let arg0 = line.arg(0).map(str::to_owned);
        match &line.keyword[..] {
            "ENC_TO" => recipients.extend(arg0),
            "NO_SECKEY" => missing.extend(arg0),
            "NEED_PASSPHRASE" => need_passphrase.extend(arg0),
            "BAD_PASSPHRASE" | "MISSING_PASSPHRASE" => {
                passphrase_failed = true
            },
            "DECRYPTION_OKAY" => okay = true,
            "DECRYPTION_FAILED" => failed = true,
            "GOODMDC" => mdc = true,
            "DECRYPTION_INFO" => {
                // mdc_method, sym_algo, and for GnuPG 2.3+, aead_algo
                mdc |= line.arg(0).map_or(false, |m| "0" != m)
                    || line.arg(2).map_or(false, |a| "0" != a);
            },
            "PLAINTEXT" => {
                literal = true;
                info.filename = line
                    .arg(2)
                    .map(unescape_percent)
                    .filter(|f| !f.is_empty());
            },
            _ => (),
        }

        encrypted |= matches!(
            &line.keyword[..],
            "ENC_TO"
                | "NO_SECKEY"
                | "NEED_PASSPHRASE"
                | "BAD_PASSPHRASE"
                | "MISSING_PASSPHRASE"
                | "BEGIN_DECRYPTION"
                | "DECRYPTION_INFO"
                | "DECRYPTION_OKAY"
                | "DECRYPTION_FAILED"
        );
    }

    if literal && !encrypted {
        return (info, mdc);
    }

    for key in recipients {
        if missing.contains(&key) {
            info.details.missing_keys.push(key);
        } else if passphrase_failed && need_passphrase.contains(&key) {
            info.details.locked_keys.push(key);
        } else {
            info.details.have_keys.push(key);
        }
    }

    info.status = if okay && !failed {
        EncryptionStatus::Decrypted
    } else if passphrase_failed {
        EncryptionStatus::LockedKey
    } else if !info.details.missing_keys.is_empty()
        && info.details.have_keys.is_empty()
    {
        EncryptionStatus::MissingKey
    } else {
        EncryptionStatus::Error
    };
    info.description = info.status.to_string();

    (info, mdc)
}

impl CryptoBackend for GnuPg {
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
        let output = match signature {
            Some(signature) => {
                let mut sig_file = tempfile::NamedTempFile::new()?;
                sig_file.write_all(signature)?;
                sig_file.flush()?;
                self.run(
                    &[
                        "--verify".into(),
                        sig_file.path().into(),
                        "-".into(),
                    ],
                    payload,
                )?
            },
            None => self.run(&["--verify".into()], payload)?,
        };

        let mut info = signature_info(&output.status);
        if SignatureStatus::None == info.status {
            info.status = SignatureStatus::Error;
            info.description =
                format!("gpg found no signature (exit status {})", output.code);
        }
        Ok(info)
    }

    fn decrypt(
        &self,
        payload: &[u8],
        require_mdc: bool,
    ) -> Result<Decrypted, Error> {
        let output = self.run(&["--decrypt".into()], payload)?;
        let (mut encryption, mdc) = encryption_info(&output.status);
        let mut plaintext = output.stdout;

        if EncryptionStatus::Decrypted == encryption.status
            && require_mdc
            && !mdc
        {
            warn!(
                "{} Discarding plaintext without integrity protection",
                self.log_prefix
            );
            encryption.status = EncryptionStatus::Error;
            encryption.description =
                "Message is not integrity protected".to_owned();
        }

        // Plaintext of merely signed data is kept; the signature verdict
        // says what to think of it.
        if !matches!(
            encryption.status,
            EncryptionStatus::Decrypted | EncryptionStatus::None
        ) {
            plaintext.clear();
        }

        Ok(Decrypted {
            signature: signature_info(&output.status),
            encryption,
            plaintext,
        })
    }

    fn sign(
        &self,
        payload: &[u8],
        from_key: &KeyId,
        clearsign: bool,
        armor: bool,
    ) -> Result<BackendOutput, Error> {
        let mut args: Vec<OsString> =
            vec!["--local-user".into(), from_key.as_str().into()];
        if armor {
            args.push("--armor".into());
        }
        args.push(if clearsign {
            "--clearsign".into()
        } else {
            "--detach-sign".into()
        });

        let output = self.run(&args, payload)?;
        Ok(BackendOutput {
            status: output.code,
            data: output.stdout,
        })
    }

    fn encrypt(
        &self,
        payload: &[u8],
        to_keys: &[KeyId],
        armor: bool,
    ) -> Result<BackendOutput, Error> {
        let mut args: Vec<OsString> = vec!["--encrypt".into()];
        if armor {
            args.push("--armor".into());
        }
        for key in to_keys {
            args.push("--recipient".into());
            args.push(key.as_str().into());
        }

        let output = self.run(&args, payload)?;
        Ok(BackendOutput {
            status: output.code,
            data: output.stdout,
        })
    }
}

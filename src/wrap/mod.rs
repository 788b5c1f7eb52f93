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

//! The encode engine: protects an outgoing message with PGP/MIME.
//!
//! The protective container always takes over the outer headers of the
//! message, as rewritten by the `HeaderPolicy`, while the message itself
//! keeps the true values of the headers the policy wraps. Signing covers
//! the normalised serialised form of the message; encryption covers its
//! serialised form.

use std::collections::BTreeSet;

use log::{debug, info};

use crate::crypt::backend::{BackendRegistry, CryptoBackend, KeyId};
use crate::mime::header::{ContentDisposition, ContentType};
use crate::mime::part::{is_content_header, Header, Part};
use crate::support::config::{WrapMode, WrapOptions};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

pub mod encrypting;
pub mod policy;
pub mod signing;

use self::policy::HeaderPolicy;

/// Protects `part` according to `options`.
///
/// `sender` is the key signatures are made with; encryption is to every
/// key in `recipients` and to `sender`. The returned container carries
/// `signature_info` and/or `encryption_info` describing what was done.
pub fn wrap(
    part: Part,
    backends: &BackendRegistry,
    sender: &KeyId,
    recipients: &[KeyId],
    options: &WrapOptions,
) -> Result<Part, Error> {
    let backend = backends
        .get(&options.protocol)
        .ok_or_else(|| Error::NoBackend(options.protocol.clone()))?;
    let policy = options.policy.policy();

    let log_prefix = LogPrefix::new("wrap".to_owned());
    if let Some(message_id) = part.header_value("Message-ID") {
        log_prefix.set_message_id(message_id);
    }
    log_prefix.set_sender(sender.to_string());

    let wrapper = Wrapper::new(backend, policy, log_prefix.clone())
        .prefer_inline(options.prefer_inline);

    match options.mode {
        WrapMode::Sign => wrapper.sign(part, sender),
        WrapMode::Encrypt => wrapper.encrypt(part, sender, recipients),
        WrapMode::SignThenEncrypt => {
            // The public side of the signed layer never leaves the
            // ciphertext, so only the encryption layer obscures anything.
            let signing_policy = policy.without_obscuring();
            let signed = Wrapper::new(backend, &signing_policy, log_prefix)
                .prefer_inline(options.prefer_inline)
                .sign(part, sender)?;
            let signature_info = signed.signature_info.clone();
            let signed_headers = signed.signed_headers.clone();

            let mut encrypted = wrapper.encrypt(signed, sender, recipients)?;
            encrypted.signature_info = signature_info;
            encrypted.signed_headers = signed_headers;
            Ok(encrypted)
        },
    }
}

/// One protective layer, bound to a backend and a header policy.
pub struct Wrapper<'a> {
    backend: &'a dyn CryptoBackend,
    policy: &'a HeaderPolicy,
    prefer_inline: bool,
    log_prefix: LogPrefix,
}

/// The result of splitting a message's headers between it and its new
/// container.
struct Prepared {
    container_headers: Vec<Header>,
    /// True values of obscured headers which need to be shown to legacy
    /// clients.
    force_display: Vec<Header>,
    /// Lower-case names of the headers left on the protected message.
    protected: BTreeSet<String>,
}

impl<'a> Wrapper<'a> {
    pub fn new(
        backend: &'a dyn CryptoBackend,
        policy: &'a HeaderPolicy,
        log_prefix: LogPrefix,
    ) -> Self {
        Wrapper {
            backend,
            policy,
            prefer_inline: false,
            log_prefix,
        }
    }

    /// Whether a lone `text/plain` message is protected with inline armor
    /// instead of PGP/MIME structure.
    pub fn prefer_inline(mut self, prefer_inline: bool) -> Self {
        self.prefer_inline = prefer_inline;
        self
    }

    fn wants_inline(&self, part: &Part) -> bool {
        self.prefer_inline
            && !part.is_multipart()
            && part.content_type().is("text", "plain")
            && !part.is_attachment()
    }

    /// Splits the headers of `part` between it and the container about to
    /// be built around it.
    fn prepare_wrap(&self, part: &mut Part) -> Prepared {
        part.remove_header("MIME-Version");

        let mut prepared = Prepared {
            container_headers: vec![],
            force_display: vec![],
            protected: BTreeSet::new(),
        };
        let mut kept = Vec::new();

        for header in part.take_headers(|h| !is_content_header(h)) {
            if let Some(obscure) = self.policy.obscuring(&header.name) {
                match obscure.apply(&header, &self.log_prefix) {
                    Some(value) => prepared
                        .container_headers
                        .push(Header::new(&header.name, &value)),
                    None => debug!(
                        "{} Stripping {} from the public headers",
                        self.log_prefix, header.name
                    ),
                }

                if self.policy.is_force_displayed(&header.name) {
                    prepared.force_display.push(header.clone());
                }
                kept.push(header);
            } else {
                prepared.container_headers.push(header.clone());
                if self.policy.is_wrapped(&header.name) {
                    kept.push(header);
                }
            }
        }

        prepared.protected = kept
            .iter()
            .map(|h| h.name.to_ascii_lowercase())
            .collect();

        // Protected headers go before the content headers
        let content_headers = part.take_headers(|_| true);
        for header in kept.into_iter().chain(content_headers) {
            part.add_header(header);
        }

        prepared
    }

    /// Builds the new top-level part with the given content type around
    /// `children`.
    fn container(
        &self,
        prepared: &Prepared,
        content_type: ContentType,
        children: Vec<Part>,
    ) -> Part {
        let mut container = Part::multipart(content_type, children);
        let content_headers = container.take_headers(|_| true);
        container.add_header(Header::new("MIME-Version", "1.0"));
        for header in prepared
            .container_headers
            .iter()
            .cloned()
            .chain(content_headers)
        {
            container.add_header(header);
        }
        container
    }
}

/// Wraps `inner` in a `multipart/mixed` whose first part shows `headers`
/// to clients which do not understand protected headers.
///
/// The new part takes over every non-content header of `inner`.
fn force_display(mut inner: Part, headers: &[Header]) -> Part {
    let mut text = Vec::new();
    for header in headers {
        text.extend_from_slice(header.name.as_bytes());
        text.extend_from_slice(b": ");
        text.extend_from_slice(header.value().as_bytes());
        text.extend_from_slice(b"\r\n");
    }

    let mut legacy = Part::leaf(
        &ContentType::new("text", "rfc822-headers")
            .with_parm("protected-headers", "v1"),
        text,
    );
    legacy.set_header(
        "Content-Disposition",
        &ContentDisposition::new("inline").to_string(),
    );

    let taken = inner.take_headers(|h| !is_content_header(h));
    let mut mixed = Part::multipart(
        ContentType::new("multipart", "mixed")
            .with_parm("protected-headers", "v1"),
        vec![legacy, inner],
    );
    mixed.adopt_headers(taken, false);
    mixed
}

/// `recipients`, then `sender`, without duplicates.
fn recipient_keys(sender: &KeyId, recipients: &[KeyId]) -> Vec<KeyId> {
    let mut keys = Vec::with_capacity(recipients.len() + 1);
    for key in recipients.iter().chain(std::iter::once(sender)) {
        if !keys.contains(key) {
            keys.push(key.clone());
        }
    }
    keys
}

fn log_done(log_prefix: &LogPrefix, what: &str, keys: &[KeyId]) {
    info!(
        "{} {} with {}",
        log_prefix,
        what,
        keys.iter()
            .map(KeyId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
}

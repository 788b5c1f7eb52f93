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

//! The decode engine: verifies, decrypts and strips PGP/MIME protection from
//! a received message.
//!
//! The walk visits every part in declaration order. Each visited part gets a
//! signature node and an encryption node in the walk's `TrustArena`s;
//! verdicts bubble up through those as each part finishes, and the final
//! verdict of every node is copied onto its part.
//!
//! Once a wrapper (`multipart/signed`, `multipart/encrypted`, an encrypted
//! attachment) has been opened, the part is overwritten with the content and
//! visited again one level deeper. Everything found under a wrapper starts
//! out with a copy of the wrapper's verdict.
//!
//! Nothing here fails. Problems become `error` verdicts on the part they
//! concern, and the rest of the message is processed as usual.

use std::collections::BTreeSet;

use log::{debug, info, warn};

use crate::crypt::backend::{BackendRegistry, DEFAULT_PROTOCOL};
use crate::crypt::trust::*;
use crate::mime::normalise::normalise;
use crate::mime::part::Part;
use crate::support::config::UnwrapOptions;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

mod attachment;
mod inline;

/// Unwraps `part` and returns the result.
pub fn unwrap(
    mut part: Part,
    backends: &BackendRegistry,
    options: &UnwrapOptions,
) -> Part {
    Unwrapper::new(backends, options).unwrap(&mut part);
    part
}

/// Holds the state of unwrapping one message.
pub struct Unwrapper<'a> {
    backends: &'a BackendRegistry,
    options: &'a UnwrapOptions,
    log_prefix: LogPrefix,
    signatures: SignatureArena,
    encryptions: EncryptionArena,
}

/// Where in the tree the walk currently is.
#[derive(Clone, Copy, Debug)]
struct WalkContext {
    depth: u32,
    sibling_index: usize,
    /// Whether the current part may be decrypted at all. See
    /// `Unwrapper::visit_children`.
    allow_decrypt: bool,
    sig_parent: Option<TrustId>,
    enc_parent: Option<TrustId>,
    /// The innermost wrapper whose signature verdict covers this part.
    sig_cover: Option<TrustId>,
    /// The innermost wrapper whose encryption verdict covers this part.
    enc_cover: Option<TrustId>,
}

impl WalkContext {
    fn root() -> Self {
        WalkContext {
            depth: 0,
            sibling_index: 0,
            allow_decrypt: true,
            sig_parent: None,
            enc_parent: None,
            sig_cover: None,
            enc_cover: None,
        }
    }

    fn child(
        self,
        sibling_index: usize,
        allow_decrypt: bool,
        node: Node,
    ) -> Self {
        WalkContext {
            depth: self.depth + 1,
            sibling_index,
            allow_decrypt,
            sig_parent: Some(node.sig),
            enc_parent: Some(node.enc),
            ..self
        }
    }

    /// The context for the content of an opened wrapper, which replaced the
    /// wrapper in the same position.
    fn inner(
        self,
        node: Node,
        sig_cover: Option<TrustId>,
        enc_cover: Option<TrustId>,
    ) -> Self {
        WalkContext {
            depth: self.depth + 1,
            sig_parent: Some(node.sig),
            enc_parent: Some(node.enc),
            sig_cover,
            enc_cover,
            ..self
        }
    }
}

/// The trust nodes of the part being visited.
#[derive(Clone, Copy, Debug)]
struct Node {
    sig: TrustId,
    enc: TrustId,
}

impl<'a> Unwrapper<'a> {
    pub fn new(
        backends: &'a BackendRegistry,
        options: &'a UnwrapOptions,
    ) -> Self {
        Unwrapper {
            backends,
            options,
            log_prefix: LogPrefix::new("unwrap".to_owned()),
            signatures: SignatureArena::new(),
            encryptions: EncryptionArena::new(),
        }
    }

    pub fn with_log_prefix(mut self, log_prefix: LogPrefix) -> Self {
        self.log_prefix = log_prefix;
        self
    }

    /// Unwraps `part` in place.
    pub fn unwrap(&mut self, part: &mut Part) {
        if let Some(message_id) = part.header_value("Message-ID") {
            self.log_prefix.set_message_id(message_id);
        }
        if let Some(from) = part.header_value("From") {
            self.log_prefix.set_sender(from);
        }

        self.signatures = SignatureArena::new();
        self.encryptions = EncryptionArena::new();
        self.visit(part, WalkContext::root());

        info!(
            "{} Done: signature {}, encryption {}",
            self.log_prefix,
            part.signature_info
                .as_ref()
                .map_or(SignatureStatus::None, |i| i.status),
            part.encryption_info
                .as_ref()
                .map_or(EncryptionStatus::None, |i| i.status),
        );
    }

    fn visit(&mut self, part: &mut Part, ctx: WalkContext) {
        if ctx.depth > self.options.max_depth {
            debug!(
                "{} Not examining part nested {} levels deep",
                self.log_prefix, ctx.depth
            );
            return;
        }

        // Container boilerplate has no opinion of its own to pass on
        let bubbly = !part.is_multipart();
        let sig_info = ctx.sig_cover.map_or_else(
            || SignatureInfo::new(DEFAULT_PROTOCOL),
            |cover| self.signatures.info(cover).clone(),
        );
        let enc_info = ctx.enc_cover.map_or_else(
            || EncryptionInfo::new(DEFAULT_PROTOCOL),
            |cover| self.encryptions.info(cover).clone(),
        );
        let node = Node {
            sig: self.signatures.add(sig_info, ctx.sig_parent, bubbly),
            enc: self.encryptions.add(enc_info, ctx.enc_parent, bubbly),
        };

        let content_type = part.content_type();
        if content_type.is("multipart", "signed") {
            if let Err(e) = self.visit_signed(part, ctx, node) {
                self.fail_signature(node, e);
            }
        } else if content_type.is("multipart", "encrypted") {
            if let Err(e) = self.visit_encrypted(part, ctx, node) {
                self.fail_encryption(node, e);
            }
        } else if part.is_multipart() {
            self.visit_children(part, ctx, node);
        } else if part.is_attachment() {
            self.visit_attachment(part, ctx, node);
        } else if content_type.is("text", "plain") {
            self.visit_text(part, ctx, node);
        }

        self.signatures.mix_bubbles(node.sig);
        self.signatures.bubble_up(node.sig, ctx.sig_parent);
        self.encryptions.mix_bubbles(node.enc);
        self.encryptions.bubble_up(node.enc, ctx.enc_parent);

        part.signature_info = Some(self.signatures.info(node.sig).clone());
        part.encryption_info = Some(self.encryptions.info(node.enc).clone());
    }

    /// Visits the children of a plain multipart.
    ///
    /// Only the first child and explicit attachments may be decrypted
    /// (unless `efail_unsafe` is set). Otherwise an attacker could wrap a
    /// captured ciphertext between parts of their own which leak whatever
    /// is rendered between them (EFail).
    fn visit_children(
        &mut self,
        part: &mut Part,
        ctx: WalkContext,
        node: Node,
    ) {
        for (ix, child) in part.children_mut().iter_mut().enumerate() {
            let allow_decrypt = ctx.allow_decrypt
                && (self.options.efail_unsafe
                    || 0 == ix
                    || child.is_attachment());
            self.visit(child, ctx.child(ix, allow_decrypt, node));
        }
    }

    fn visit_signed(
        &mut self,
        part: &mut Part,
        ctx: WalkContext,
        node: Node,
    ) -> Result<(), Error> {
        let backends = self.backends;
        let protocol = part.content_type().parm("protocol").map(str::to_owned);
        let backend = backends
            .for_signature_type(protocol.as_deref())
            .ok_or_else(|| no_backend(protocol.as_deref()))?;

        let (signed, signature) = match part.children() {
            [signed, signature, ..] => (signed, signature),
            _ => {
                return Err(Error::Parse(
                    "multipart/signed without a signature".to_owned(),
                ))
            },
        };

        // Re-serialising could change the bytes, so verify what was actually
        // received if possible.
        let signed_bytes = signed
            .raw()
            .map_or_else(|| signed.to_bytes(), <[u8]>::to_vec);
        let signature_bytes = signature.decoded_body().ok_or_else(|| {
            Error::Parse("multipart/signed signature is not a leaf".to_owned())
        })?;

        let info =
            backend.verify(&normalise(&signed_bytes), Some(&signature_bytes))?;
        info!(
            "{} Signature {}: {}",
            self.log_prefix, info.status, info.description
        );

        let inner = signed.clone();
        self.adopt_signature(node, info);

        let mut names = part.replace_with(inner, true);
        self.strip_protected_headers(part, &mut names);
        part.signed_headers.extend(names);

        self.visit(part, ctx.inner(node, Some(node.sig), ctx.enc_cover));
        Ok(())
    }

    fn visit_encrypted(
        &mut self,
        part: &mut Part,
        ctx: WalkContext,
        node: Node,
    ) -> Result<(), Error> {
        if !ctx.allow_decrypt {
            return Err(self.forbid_decryption(ctx));
        }

        let backends = self.backends;
        let protocol = part.content_type().parm("protocol").map(str::to_owned);
        let backend = backends
            .for_encryption_type(protocol.as_deref())
            .ok_or_else(|| no_backend(protocol.as_deref()))?;

        let ciphertext = part
            .children()
            .get(1)
            .and_then(Part::decoded_body)
            .ok_or_else(|| {
                Error::Parse(
                    "multipart/encrypted without ciphertext".to_owned(),
                )
            })?;

        let decrypted = backend.decrypt(&ciphertext, self.options.require_mdc)?;
        info!(
            "{} Encryption {}: {}",
            self.log_prefix,
            decrypted.encryption.status,
            decrypted.encryption.description
        );

        let signed = self.adopt_signature(node, decrypted.signature);
        let status = decrypted.encryption.status;
        self.adopt_encryption(node, decrypted.encryption);
        if EncryptionStatus::Decrypted != status {
            return Ok(());
        }

        let mut names =
            part.replace_with(Part::parse(&decrypted.plaintext), true);
        self.strip_protected_headers(part, &mut names);
        if signed {
            part.signed_headers.extend(names.iter().cloned());
        }
        part.encrypted_headers.extend(names);

        let sig_cover = if signed { Some(node.sig) } else { ctx.sig_cover };
        self.visit(part, ctx.inner(node, sig_cover, Some(node.enc)));
        Ok(())
    }

    /// Applies and removes a `text/rfc822-headers; protected-headers=v1`
    /// part at the start of freshly unwrapped content.
    ///
    /// If only one part remains after that, it replaces the multipart.
    fn strip_protected_headers(
        &self,
        part: &mut Part,
        names: &mut BTreeSet<String>,
    ) {
        let has_legacy_display = part.is_multipart()
            && part.children().first().map_or(false, |child| {
                let content_type = child.content_type();
                content_type.is("text", "rfc822-headers")
                    && content_type.parm("protected-headers").is_some()
            });
        if !has_legacy_display {
            return;
        }

        let legacy = part.children_mut().remove(0);
        let headers = Part::parse(&legacy.decoded_body().unwrap_or_default())
            .headers()
            .to_vec();
        debug!(
            "{} Applying {} protected headers",
            self.log_prefix,
            headers.len()
        );
        names.extend(part.adopt_headers(headers, false));

        if 1 == part.children().len() {
            if let Some(message) = part.children_mut().pop() {
                part.replace_with(message, true);
            }
        }
    }

    /// Makes `info` the verdict of `node` unless it says nothing.
    ///
    /// Returns whether it was adopted.
    fn adopt_signature(&mut self, node: Node, info: SignatureInfo) -> bool {
        if SignatureStatus::None == info.status {
            return false;
        }

        *self.signatures.info_mut(node.sig) = info;
        self.signatures.set_bubbly(node.sig, true);
        true
    }

    fn adopt_encryption(&mut self, node: Node, info: EncryptionInfo) -> bool {
        if EncryptionStatus::None == info.status {
            return false;
        }

        *self.encryptions.info_mut(node.enc) = info;
        self.encryptions.set_bubbly(node.enc, true);
        true
    }

    fn forbid_decryption(&self, ctx: WalkContext) -> Error {
        info!(
            "{} Not decrypting part {} at depth {}",
            self.log_prefix, ctx.sibling_index, ctx.depth
        );
        Error::DecryptionForbidden
    }

    fn fail_signature(&mut self, node: Node, error: Error) {
        warn!("{} Signature check failed: {}", self.log_prefix, error);
        let info = self.signatures.info_mut(node.sig);
        info.status = SignatureStatus::Error;
        info.description = error.to_string();
        self.signatures.set_bubbly(node.sig, true);
    }

    fn fail_encryption(&mut self, node: Node, error: Error) {
        warn!("{} Decryption failed: {}", self.log_prefix, error);
        let info = self.encryptions.info_mut(node.enc);
        info.status = EncryptionStatus::Error;
        info.description = error.to_string();
        self.encryptions.set_bubbly(node.enc, true);
    }
}

fn no_backend(protocol: Option<&str>) -> Error {
    Error::NoBackend(protocol.unwrap_or(DEFAULT_PROTOCOL).to_owned())
}

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

//! Trust verdicts and their aggregation.
//!
//! Every MIME part visited by the engines gets one signature verdict and one
//! encryption verdict. Verdicts of parts further down the tree "bubble" up to
//! their ancestors, each of which folds what it received into a single
//! status for itself. The fold always keeps the most interesting status seen
//! and marks it `mixed-` when not everything agreed, so that a message with
//! one good signature and one bad one shows up as `mixed-invalid`.
//!
//! "Interesting" is the position in the status enum, which is *not* a
//! severity ranking. The order is part of the contract and must not be
//! changed.
//!
//! The verdicts of one walk live in a `TrustArena`. Nodes refer to their
//! parent and to the descendants which bubbled into them by index, so there
//! is no shared ownership anywhere.

use std::fmt;
use std::mem;
use std::str::FromStr;

use chrono::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::support::error::Error;

/// Common behaviour of the per-kind status enums.
pub trait Status:
    Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Every status, least interesting first.
    const ALL: &'static [Self];
    const NONE: Self;

    fn name(self) -> &'static str;

    fn index(self) -> usize {
        Self::ALL.iter().position(|&s| s == self).unwrap_or(0)
    }

    fn is_mixed(self) -> bool {
        self.name().starts_with("mixed-")
    }

    /// The `mixed-` form of this status.
    ///
    /// Statuses which are already mixed, and `none`, which has no mixed
    /// form, are returned unchanged.
    fn mixed(self) -> Self {
        if self.is_mixed() {
            return self;
        }

        Self::ALL
            .iter()
            .copied()
            .find(|s| s.name().strip_prefix("mixed-") == Some(self.name()))
            .unwrap_or(self)
    }

    fn parse(s: &str) -> Result<Self, Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|st| st.name() == s)
            .ok_or_else(|| Error::InvalidStatus(s.to_owned()))
    }
}

macro_rules! trust_status {
    ($(#[$meta:meta])* pub enum $name:ident {
        $($variant:ident = $text:literal,)*
    }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)*
        }

        impl Status for $name {
            const ALL: &'static [Self] = &[$($name::$variant,)*];
            const NONE: Self = $name::None;

            fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)*
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::None
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Error> {
                <Self as Status>::parse(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.name())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                <Self as Status>::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

trust_status! {
    /// The verdict on the signature(s) covering a part.
    pub enum SignatureStatus {
        None = "none",
        MixedError = "mixed-error",
        Error = "error",
        MixedUnknown = "mixed-unknown",
        Unknown = "unknown",
        MixedChanged = "mixed-changed",
        Changed = "changed",
        MixedUnsigned = "mixed-unsigned",
        Unsigned = "unsigned",
        MixedExpired = "mixed-expired",
        Expired = "expired",
        MixedRevoked = "mixed-revoked",
        Revoked = "revoked",
        MixedUnverified = "mixed-unverified",
        Unverified = "unverified",
        MixedSigned = "mixed-signed",
        Signed = "signed",
        MixedVerified = "mixed-verified",
        Verified = "verified",
        MixedInvalid = "mixed-invalid",
        Invalid = "invalid",
    }
}

trust_status! {
    /// The verdict on the encryption covering a part.
    pub enum EncryptionStatus {
        None = "none",
        MixedError = "mixed-error",
        Error = "error",
        MixedDecrypted = "mixed-decrypted",
        Decrypted = "decrypted",
        MixedMissingKey = "mixed-missingkey",
        MissingKey = "missingkey",
        MixedLockedKey = "mixed-lockedkey",
        LockedKey = "lockedkey",
    }
}

/// Who made a signature, as far as the backend could tell.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureDetails {
    pub name: Option<String>,
    pub email: Option<String>,
    pub keyinfo: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Which keys a ciphertext was addressed to, by whether we hold them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionDetails {
    pub have_keys: Vec<String>,
    pub missing_keys: Vec<String>,
    pub locked_keys: Vec<String>,
}

/// A trust verdict, as handed to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustInfo<S, D> {
    pub protocol: String,
    pub status: S,
    pub description: String,
    pub details: D,
    /// The original name of a decrypted attachment.
    pub filename: Option<String>,
}

pub type SignatureInfo = TrustInfo<SignatureStatus, SignatureDetails>;
pub type EncryptionInfo = TrustInfo<EncryptionStatus, EncryptionDetails>;

impl<S: Status, D: Default> TrustInfo<S, D> {
    pub fn new(protocol: &str) -> Self {
        TrustInfo {
            protocol: protocol.to_owned(),
            status: S::NONE,
            description: String::new(),
            details: D::default(),
            filename: None,
        }
    }

    pub fn with_status(mut self, status: S) -> Self {
        self.status = status;
        self
    }

    /// Sets the status by name, rejecting names which are not part of this
    /// kind's enum.
    pub fn set_status(&mut self, status: &str) -> Result<(), Error> {
        self.status = S::parse(status)?;
        Ok(())
    }
}

impl<S: Status, D: Default> Default for TrustInfo<S, D> {
    fn default() -> Self {
        Self::new("openpgp")
    }
}

/// Identifies a node in a `TrustArena`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrustId(usize);

#[derive(Clone, Debug)]
struct Node<S, D> {
    info: TrustInfo<S, D>,
    parent: Option<TrustId>,
    /// Whether this node's verdict should propagate to its ancestors.
    /// Pure MIME container boilerplate is not bubbly.
    bubbly: bool,
    /// Descendants which have bubbled into this node and not yet been mixed.
    bubbles: Vec<TrustId>,
}

/// All the verdicts of one kind produced by one walk over a MIME tree.
#[derive(Clone, Debug)]
pub struct TrustArena<S, D> {
    nodes: Vec<Node<S, D>>,
}

pub type SignatureArena = TrustArena<SignatureStatus, SignatureDetails>;
pub type EncryptionArena = TrustArena<EncryptionStatus, EncryptionDetails>;

impl<S: Status, D: Clone> Default for TrustArena<S, D> {
    fn default() -> Self {
        TrustArena { nodes: vec![] }
    }
}

impl<S: Status, D: Clone> TrustArena<S, D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new node holding `info`.
    ///
    /// `parent` must already be in the arena.
    pub fn add(
        &mut self,
        info: TrustInfo<S, D>,
        parent: Option<TrustId>,
        bubbly: bool,
    ) -> TrustId {
        let id = TrustId(self.nodes.len());
        debug_assert!(parent.map_or(true, |p| p < id));
        self.nodes.push(Node {
            info,
            parent,
            bubbly,
            bubbles: vec![],
        });
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn info(&self, id: TrustId) -> &TrustInfo<S, D> {
        &self.nodes[id.0].info
    }

    pub fn info_mut(&mut self, id: TrustId) -> &mut TrustInfo<S, D> {
        &mut self.nodes[id.0].info
    }

    pub fn status(&self, id: TrustId) -> S {
        self.nodes[id.0].info.status
    }

    pub fn set_status(&mut self, id: TrustId, status: S) {
        self.nodes[id.0].info.status = status;
    }

    pub fn parent(&self, id: TrustId) -> Option<TrustId> {
        self.nodes[id.0].parent
    }

    pub fn is_bubbly(&self, id: TrustId) -> bool {
        self.nodes[id.0].bubbly
    }

    pub fn set_bubbly(&mut self, id: TrustId, bubbly: bool) {
        self.nodes[id.0].bubbly = bubbly;
    }

    /// The descendants waiting to be mixed into `id`, in arrival order.
    pub fn bubbles(&self, id: TrustId) -> &[TrustId] {
        &self.nodes[id.0].bubbles
    }

    /// Registers `id` with every one of its ancestors for mixing.
    ///
    /// If `id` has no parent yet, `parent` becomes its parent. Nothing is
    /// registered for a node which is not bubbly. Registering the same node
    /// twice has no further effect.
    pub fn bubble_up(&mut self, id: TrustId, parent: Option<TrustId>) {
        if self.nodes[id.0].parent.is_none() {
            if let Some(parent) = parent.filter(|&p| !self.is_ancestor(id, p))
            {
                self.nodes[id.0].parent = Some(parent);
            }
        }

        if !self.nodes[id.0].bubbly {
            return;
        }

        let mut cursor = self.nodes[id.0].parent;
        // The parent links cannot form a cycle, but never walk more steps
        // than there are nodes all the same.
        for _ in 0..self.nodes.len() {
            let ancestor = match cursor {
                Some(ancestor) => ancestor,
                None => break,
            };

            let bubbles = &mut self.nodes[ancestor.0].bubbles;
            if !bubbles.contains(&id) {
                bubbles.push(id);
            }
            cursor = self.nodes[ancestor.0].parent;
        }
    }

    /// Folds every pending bubble of `id` into its own verdict, in arrival
    /// order, then forgets them.
    pub fn mix_bubbles(&mut self, id: TrustId) {
        let bubbles = mem::take(&mut self.nodes[id.0].bubbles);
        let bubbly = self.nodes[id.0].bubbly;
        let mut adopted = false;

        for bubble in bubbles {
            let child = self.nodes[bubble.0].info.clone();
            let own = &mut self.nodes[id.0].info;

            if own.status.index() <= child.status.index() {
                // A container adopts the first verdict it sees as its own;
                // anything after that which disagrees makes it mixed.
                let mix = own.status != child.status
                    && !child.status.is_mixed()
                    && (bubbly || adopted);
                *own = child;
                if mix {
                    own.status = own.status.mixed();
                }
                adopted = true;
            } else if !own.status.is_mixed() {
                own.status = own.status.mixed();
            }
        }
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    fn is_ancestor(&self, ancestor: TrustId, id: TrustId) -> bool {
        let mut cursor = Some(id);
        for _ in 0..=self.nodes.len() {
            match cursor {
                None => return false,
                Some(c) if c == ancestor => return true,
                Some(c) => cursor = self.nodes[c.0].parent,
            }
        }
        true
    }
}

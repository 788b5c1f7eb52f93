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

//! Which headers go inside the protected envelope, and what the world still
//! gets to see of them ("Memory Hole").

use std::collections::{BTreeMap, BTreeSet};

use lazy_static::lazy_static;
use log::warn;

use crate::mime::header::parse_address_list;
use crate::mime::part::Header;
use crate::support::log_prefix::LogPrefix;

/// How a header is rewritten on the public side of the envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Obscure {
    /// The header does not appear outside at all.
    Strip,
    /// The header is replaced with a fixed value.
    Fixed(&'static str),
    /// Display names are removed from an address list, leaving only
    /// `<addr-spec>` items.
    AddressesOnly,
}

impl Obscure {
    /// Computes the public value of `header`, or `None` if it is dropped.
    pub fn apply(
        self,
        header: &Header,
        log_prefix: &LogPrefix,
    ) -> Option<String> {
        match self {
            Obscure::Strip => None,
            Obscure::Fixed(value) => Some(value.to_owned()),
            Obscure::AddressesOnly => {
                let addresses = match parse_address_list(header.raw_value()) {
                    Some(addresses) => addresses,
                    None => {
                        warn!(
                            "{} Can't parse {} header; leaving it as is",
                            log_prefix, header.name
                        );
                        return Some(header.value());
                    },
                };

                Some(
                    addresses
                        .iter()
                        .flat_map(|a| a.mailboxes())
                        .map(|mb| format!("<{}>", mb.addr))
                        .collect::<Vec<_>>()
                        .join(", "),
                )
            },
        }
    }
}

/// A header protection policy.
///
/// All names are lower-case.
#[derive(Clone, Debug, Default)]
pub struct HeaderPolicy {
    /// Headers whose true value is kept inside the envelope.
    pub wrapped_headers: BTreeSet<&'static str>,
    /// Headers whose public copy is rewritten.
    pub obscured_headers: BTreeMap<&'static str, Obscure>,
    /// Obscured headers whose true value must also be shown to clients that
    /// know nothing about protected headers, by way of a
    /// `text/rfc822-headers` part.
    pub force_display_headers: BTreeSet<&'static str>,
}

impl HeaderPolicy {
    pub fn is_wrapped(&self, name: &str) -> bool {
        self.wrapped_headers
            .contains(name.to_ascii_lowercase().as_str())
    }

    pub fn obscuring(&self, name: &str) -> Option<Obscure> {
        self.obscured_headers
            .get(name.to_ascii_lowercase().as_str())
            .copied()
    }

    pub fn is_force_displayed(&self, name: &str) -> bool {
        self.force_display_headers
            .contains(name.to_ascii_lowercase().as_str())
    }

    /// This policy with obscuring turned off, so every wrapped header keeps
    /// its value on both sides.
    pub fn without_obscuring(&self) -> Self {
        HeaderPolicy {
            wrapped_headers: self.wrapped_headers.clone(),
            obscured_headers: BTreeMap::new(),
            force_display_headers: BTreeSet::new(),
        }
    }
}

const WRAPPED_HEADERS: &[&str] = &[
    "subject",
    "from",
    "to",
    "cc",
    "date",
    "reply-to",
    "sender",
    "in-reply-to",
    "references",
    "message-id",
    "user-agent",
    "openpgp",
    "autocrypt-gossip",
];

const FORCE_DISPLAY_HEADERS: &[&str] = &["subject", "from", "to", "cc"];

fn policy(obscured: &[(&'static str, Obscure)]) -> HeaderPolicy {
    HeaderPolicy {
        wrapped_headers: WRAPPED_HEADERS.iter().copied().collect(),
        obscured_headers: obscured.iter().copied().collect(),
        force_display_headers: FORCE_DISPLAY_HEADERS.iter().copied().collect(),
    }
}

const REQUIRED_OBSCURED: &[(&str, Obscure)] =
    &[("autocrypt-gossip", Obscure::Strip)];

const MILD_OBSCURED: &[(&str, Obscure)] = &[
    ("subject", Obscure::Fixed("(Subject unavailable)")),
    ("from", Obscure::AddressesOnly),
    ("sender", Obscure::AddressesOnly),
    ("reply-to", Obscure::AddressesOnly),
    ("to", Obscure::AddressesOnly),
    ("cc", Obscure::AddressesOnly),
    ("user-agent", Obscure::Strip),
];

const EXTREME_OBSCURED: &[(&str, Obscure)] = &[
    ("date", Obscure::Fixed("Thu, 01 Jan 1970 00:00:00 +0000")),
    ("in-reply-to", Obscure::Strip),
    ("references", Obscure::Strip),
    ("openpgp", Obscure::Strip),
];

lazy_static! {
    /// Only strips what must never leak.
    pub static ref REQUIRED: HeaderPolicy = policy(REQUIRED_OBSCURED);
    /// Hides the subject, display names and the mail client.
    pub static ref MILD: HeaderPolicy = policy(
        &REQUIRED_OBSCURED
            .iter()
            .chain(MILD_OBSCURED)
            .copied()
            .collect::<Vec<_>>()
    );
    /// Also hides the date and threading.
    pub static ref EXTREME: HeaderPolicy = policy(
        &REQUIRED_OBSCURED
            .iter()
            .chain(MILD_OBSCURED)
            .chain(EXTREME_OBSCURED)
            .copied()
            .collect::<Vec<_>>()
    );
}

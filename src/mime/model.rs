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

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrSpec {
    pub local: Vec<Vec<u8>>,
    pub domain: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxSpec {
    pub addr: AddrSpec,
    pub name: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupSpec {
    pub name: Vec<Vec<u8>>,
    pub boxes: Vec<MailboxSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
    Mailbox(MailboxSpec),
    Group(GroupSpec),
}

impl Address {
    /// All the mailboxes named by this address, flattening groups.
    pub fn mailboxes(&self) -> &[MailboxSpec] {
        match *self {
            Address::Mailbox(ref mb) => std::slice::from_ref(mb),
            Address::Group(ref group) => &group.boxes,
        }
    }
}

impl fmt::Display for AddrSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, word) in self.local.iter().enumerate() {
            if ix != 0 {
                write!(f, ".")?;
            }

            let word = String::from_utf8_lossy(word);
            if word.is_empty() || word.contains(|c: char| needs_quoting(c)) {
                write!(f, "\"")?;
                for c in word.chars() {
                    if '"' == c || '\\' == c {
                        write!(f, "\\")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, "\"")?;
            } else {
                write!(f, "{word}")?;
            }
        }

        write!(f, "@")?;
        for (ix, part) in self.domain.iter().enumerate() {
            if ix != 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", String::from_utf8_lossy(part))?;
        }

        Ok(())
    }
}

fn needs_quoting(c: char) -> bool {
    c.is_ascii() && (c.is_ascii_control() || " ()<>[]:;@\\,.\"".contains(c))
}

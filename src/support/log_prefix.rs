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
use std::mem;
use std::sync::{Arc, Mutex};

/// Tracks text that should be included in at the start of every log statement.
///
/// Clones of a `LogPrefix` share the same underlying data.
#[derive(Clone)]
pub struct LogPrefix {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Clone)]
struct Inner {
    operation: String,
    message_id: Option<String>,
    sender: Option<String>,
}

impl LogPrefix {
    pub fn new(operation: String) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                operation,
                message_id: None,
                sender: None,
            })),
        }
    }

    pub fn deep_clone(&self) -> Self {
        let inner = self.lock();
        Self {
            inner: Arc::new(Mutex::new(Inner::clone(&inner))),
        }
    }

    pub fn set_message_id(&self, message_id: String) {
        self.lock().message_id = Some(sanitise(message_id));
    }

    pub fn set_sender(&self, sender: String) {
        self.lock().sender = Some(sanitise(sender));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // The data is plain strings, so a poisoned lock still holds something
        // perfectly usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.lock();
        write!(f, "{}", inner.operation)?;
        if inner.message_id.is_some() || inner.sender.is_some() {
            write!(f, "[")?;
            let mut first = true;
            if let Some(ref message_id) = inner.message_id {
                write!(f, "{message_id}")?;
                first = false;
            }

            if let Some(ref sender) = inner.sender {
                if !mem::take(&mut first) {
                    write!(f, " ")?;
                }
                write!(f, "from={sender}")?;
            }
            write!(f, "]")?;
        }

        Ok(())
    }
}

impl fmt::Debug for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LogPrefix({self})")
    }
}

fn sanitise(mut s: String) -> String {
    s.retain(|c| !c.is_control());
    if let Some((truncate_len, _)) = s.char_indices().nth(64) {
        s.truncate(truncate_len);
    }

    s
}

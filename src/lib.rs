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

//! PGP/MIME transformation of parsed e-mail.
//!
//! Two engines share one MIME tree model. [`unwrap()`] takes a received
//! message, verifies and decrypts whatever it can, and replaces the protective
//! structure with what it protected, leaving a trust verdict on every part.
//! [`wrap()`] does the reverse for outgoing mail, moving sensitive headers
//! inside the protected envelope as it goes.
//!
//! All actual cryptography is delegated to a [`CryptoBackend`].

#[cfg(test)]
macro_rules! assert_matches {
    ($expected:pat, $actual:expr) => {
        match $actual {
            $expected => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
}

pub mod crypt;
pub mod mime;
pub mod support;
pub mod unwrap;
pub mod wrap;

#[cfg(test)]
mod test_data;

pub use crate::crypt::backend::{BackendRegistry, CryptoBackend, KeyId};
pub use crate::crypt::trust::{
    EncryptionInfo, EncryptionStatus, SignatureInfo, SignatureStatus,
};
pub use crate::mime::part::Part;
pub use crate::support::config::{Config, UnwrapOptions, WrapOptions};
pub use crate::support::error::Error;
pub use crate::unwrap::unwrap;
pub use crate::wrap::wrap;

#[cfg(test)]
static INIT_TEST_LOG: std::sync::Once = std::sync::Once::new();

#[cfg(test)]
fn init_test_log() {
    use log4rs::append::console::{ConsoleAppender, Target};
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    INIT_TEST_LOG.call_once(|| {
        let stderr = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new(
                "{d(%H:%M:%S%.3f)} [{l}][{t}] {m}{n}",
            )))
            .build();
        let config = Config::builder()
            .appender(Appender::builder().build("stderr", Box::new(stderr)))
            .build(
                Root::builder()
                    .appender("stderr")
                    .build(log::LevelFilter::Debug),
            )
            .unwrap();
        let _ = log4rs::init_config(config);
    })
}

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

/// Converts `data` into the canonical form which signatures are computed
/// over (RFC 3156 5).
///
/// Every line ending becomes CRLF, trailing spaces and tabs are removed from
/// every line, and the text ends with exactly one CRLF. Applying this twice
/// gives the same result as applying it once.
pub fn normalise(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 32 + 2);

    for line in data.split(|&b| b'\n' == b) {
        let mut end = line.len();
        while end > 0 && matches!(line[end - 1], b' ' | b'\t' | b'\r') {
            end -= 1;
        }
        out.extend_from_slice(&line[..end]);
        out.extend_from_slice(b"\r\n");
    }

    while matches!(out.last(), Some(b'\r') | Some(b'\n')) {
        out.pop();
    }
    out.extend_from_slice(b"\r\n");
    out
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_normalise() {
        assert_eq!(b"\r\n".to_vec(), normalise(b""));
        assert_eq!(b"\r\n".to_vec(), normalise(b"\n\n\r\n"));
        assert_eq!(b"foo\r\n".to_vec(), normalise(b"foo"));
        assert_eq!(
            b"foo\r\nbar\r\n".to_vec(),
            normalise(b"foo  \nbar\t\r\n\n")
        );
        assert_eq!(
            b"a\r\n\r\n b\r\n".to_vec(),
            normalise(b"a \r\n\t\r\n b \t")
        );
    }

    proptest! {
        #[test]
        fn normalise_is_idempotent(s in "[a-z \t\r\n]{0,60}") {
            let once = normalise(s.as_bytes());
            prop_assert_eq!(&once, &normalise(&once));
            prop_assert!(once.ends_with(b"\r\n"));
            prop_assert!(!once.ends_with(b"\r\n\r\n"));
        }

        #[test]
        fn normalise_never_leaves_bare_newlines(
            s in prop::collection::vec(prop::num::u8::ANY, 0..60)
        ) {
            let normalised = normalise(&s);
            for (ix, &b) in normalised.iter().enumerate() {
                if b'\n' == b {
                    prop_assert!(ix > 0 && b'\r' == normalised[ix - 1]);
                }
            }
        }
    }
}

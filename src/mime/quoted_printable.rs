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

/// Decodes a complete quoted-printable body, as described by RFC 2045.
///
/// Encoded bytes and soft line endings are both handled, the latter by
/// discarding. UNIX line endings are handled as well as DOS line endings.
///
/// This never fails. Invalid and truncated sequences are passed through
/// untransformed. 8-bit characters are passed through, including invalid
/// UTF-8.
pub fn qp_decode(s: &[u8]) -> Vec<u8> {
    let mut transformed = Vec::with_capacity(s.len());
    let mut rest = s;

    while let Some(eq) = memchr::memchr(b'=', rest) {
        transformed.extend_from_slice(&rest[..eq]);
        let escape = &rest[eq + 1..];

        if escape.starts_with(b"\n") {
            rest = &escape[1..];
        } else if escape.starts_with(b"\r\n") {
            rest = &escape[2..];
        } else if let Some(ch) = escape
            .get(..2)
            .filter(|e| e.iter().all(u8::is_ascii_hexdigit))
            .and_then(|e| std::str::from_utf8(e).ok())
            .and_then(|e| u8::from_str_radix(e, 16).ok())
        {
            transformed.push(ch);
            rest = &escape[2..];
        } else {
            transformed.push(b'=');
            rest = escape;
        }
    }

    transformed.extend_from_slice(rest);
    transformed
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn assert_qp(expected: &[u8], input: &[u8]) {
        assert_eq!(expected, &qp_decode(input)[..]);
    }

    #[test]
    fn test_qp_decode() {
        assert_qp(b"hello world", b"hello world");
        assert_qp(b"\xabfoo", b"=ABfoo");
        assert_qp(b"fo\xabo", b"fo=ABo");
        assert_qp(b"foo\xab", b"foo=AB");
        assert_qp(b"foo\xab\xcd", b"foo=AB=CD");

        assert_qp(b"foo", b"foo=\n");
        assert_qp(b"foobar", b"foo=\nbar");
        assert_qp(b"foo", b"foo=\r\n");
        assert_qp(b"foobar", b"foo=\r\nbar");

        assert_qp(b"foo=()bar", b"foo=()bar");
        assert_qp(b"foo=\xabbar", b"foo==ABbar");
        assert_qp(b"foo=A\xabbar", b"foo=A=ABbar");
        assert_qp("foo=ゑbar".as_bytes(), "foo=ゑbar".as_bytes());

        assert_qp(b"foo=", b"foo=");
        assert_qp(b"foo=A", b"foo=A");
        assert_qp(b"foo=\r", b"foo=\r");
    }

    proptest! {
        #[test]
        fn qp_decode_never_fails(
            s in prop::collection::vec(prop::num::u8::ANY, 0..40)
        ) {
            qp_decode(&s);
        }

        #[test]
        fn qp_decode_is_identity_without_escapes(s in "[^=]*") {
            prop_assert_eq!(s.as_bytes(), &qp_decode(s.as_bytes())[..]);
        }
    }
}

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

//! Utilities for working with individual RFC 2822 / RFC 2045 headers.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{is_a, is_not, take, take_while1},
    character::complete::char,
    combinator::{map, opt},
    multi::{fold_many0, many0, many1, separated_nonempty_list},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};

use super::model::*;

type PResult<'a, T> = IResult<&'a [u8], T>;

// RFC 2822 3.2.2 "quoted-pair", including the 8-bit clean "obsolete" syntax
fn quoted_pair(i: &[u8]) -> PResult<'_, &[u8]> {
    preceded(char('\\'), take(1usize))(i)
}

// RFC 2822 3.2.3 "Folding white space".
// Unfolding is not done before parsing, so the line-ending characters are
// simply treated as more whitespace.
fn fws(i: &[u8]) -> PResult<'_, ()> {
    map(is_a(" \t\r\n"), |_| ())(i)
}

// RFC 2822 3.2.3 "Comment text".
fn ctext(i: &[u8]) -> PResult<'_, &[u8]> {
    is_not("()\\ \t\r\n")(i)
}

// RFC 2822 3.2.3 "Comment". Note it is recursive.
fn comment(i: &[u8]) -> PResult<'_, ()> {
    delimited(
        char('('),
        map(
            many0(alt((
                map(ctext, |_| ()),
                map(quoted_pair, |_| ()),
                fws,
                comment,
            ))),
            |_| (),
        ),
        char(')'),
    )(i)
}

// RFC 2822 3.2.3 "Comment or folding white space".
fn cfws(i: &[u8]) -> PResult<'_, ()> {
    map(many0(alt((fws, comment))), |_| ())(i)
}

// RFC 2822 3.2.5 "Quoted [string] text"
// Amended by RFC 6532 to include all non-ASCII characters
fn qtext(i: &[u8]) -> PResult<'_, &[u8]> {
    is_not(" \t\r\n\\\"")(i)
}

// RFC 2822 3.2.5 "Quoted string"
// Folds inside the string are dropped, other whitespace is kept verbatim.
fn quoted_string(i: &[u8]) -> PResult<'_, Vec<u8>> {
    delimited(
        pair(opt(cfws), char('"')),
        fold_many0(
            alt((qtext, quoted_pair, is_a(" \t\r\n"))),
            Vec::new(),
            |mut acc: Vec<u8>, item: &[u8]| {
                acc.extend(
                    item.iter().copied().filter(|&b| b'\r' != b && b'\n' != b),
                );
                acc
            },
        ),
        pair(char('"'), opt(cfws)),
    )(i)
}

// RFC 2045 5.1 "token"
fn is_token_char(ch: u8) -> bool {
    ch > b' ' && ch < 0x7f && !b"()<>@,;:\\\"/[]?=".contains(&ch)
}

fn token(i: &[u8]) -> PResult<'_, &[u8]> {
    take_while1(is_token_char)(i)
}

// RFC 2045 5.1 "value". Unquoted values are accepted more liberally than the
// standard allows, since agents regularly write things like
// `protocol=application/pgp-signature` without quotes.
fn lenient_value(i: &[u8]) -> PResult<'_, &[u8]> {
    take_while1(|ch| {
        ch >= 0x80 || (ch > b' ' && ch < 0x7f && b';' != ch && b'"' != ch)
    })(i)
}

fn parm_value(i: &[u8]) -> PResult<'_, Vec<u8>> {
    alt((quoted_string, map(lenient_value, <[u8]>::to_vec)))(i)
}

// RFC 2045 5.1 "parameter", with its leading `;`
fn parm(i: &[u8]) -> PResult<'_, (String, String)> {
    map(
        preceded(
            tuple((opt(cfws), char(';'), opt(cfws))),
            separated_pair(
                token,
                tuple((opt(cfws), char('='), opt(cfws))),
                parm_value,
            ),
        ),
        |(name, value)| {
            (
                String::from_utf8_lossy(name).to_ascii_lowercase(),
                String::from_utf8_lossy(&value).into_owned(),
            )
        },
    )(i)
}

fn parms_tail(i: &[u8]) -> PResult<'_, Vec<(String, String)>> {
    terminated(
        many0(parm),
        tuple((opt(cfws), opt(char(';')), opt(cfws))),
    )(i)
}

// RFC 2045 5.1 "content"
fn content_type(i: &[u8]) -> PResult<'_, ContentType> {
    map(
        tuple((opt(cfws), token, char('/'), token, parms_tail)),
        |(_, typ, _, subtype, parms)| ContentType {
            typ: String::from_utf8_lossy(typ).to_ascii_lowercase(),
            subtype: String::from_utf8_lossy(subtype).to_ascii_lowercase(),
            parms,
        },
    )(i)
}

// RFC 2183 2 "disposition"
fn content_disposition(i: &[u8]) -> PResult<'_, ContentDisposition> {
    map(
        tuple((opt(cfws), token, parms_tail)),
        |(_, disposition, parms)| ContentDisposition {
            disposition: String::from_utf8_lossy(disposition)
                .to_ascii_lowercase(),
            parms,
        },
    )(i)
}

// RFC 2822 3.2.4 "Atom text"
// Amended by RFC 6532 to include all non-ASCII characters
fn is_atext(ch: u8) -> bool {
    ch.is_ascii_alphanumeric()
        || ch >= 0x80
        || b"!#$%&'*+-/=?^_`{|}~".contains(&ch)
}

// RFC 2822 3.2.4 "Atom"
fn atom(i: &[u8]) -> PResult<'_, Vec<u8>> {
    map(
        delimited(opt(cfws), take_while1(is_atext), opt(cfws)),
        <[u8]>::to_vec,
    )(i)
}

// RFC 2822 3.2.6 "word"
fn word(i: &[u8]) -> PResult<'_, Vec<u8>> {
    alt((atom, quoted_string))(i)
}

// Part of the `obs-phrase` grammar: the '.' that many agents put unquoted into
// display names.
fn obs_dot(i: &[u8]) -> PResult<'_, Vec<u8>> {
    map(terminated(char('.'), opt(cfws)), |_| b".".to_vec())(i)
}

// RFC 2822 3.2.6 "phrase", plus "obsolete phrase" syntax
fn phrase(i: &[u8]) -> PResult<'_, Vec<Vec<u8>>> {
    map(pair(word, many0(alt((word, obs_dot)))), |(head, mut tail)| {
        tail.insert(0, head);
        tail
    })(i)
}

// RFC 2822 3.4.1 local part of address, merged with `obs-local-part`.
fn local_part(i: &[u8]) -> PResult<'_, Vec<Vec<u8>>> {
    separated_nonempty_list(char('.'), word)(i)
}

// RFC 2822 3.4.1 domain name text
fn dtext(i: &[u8]) -> PResult<'_, &[u8]> {
    is_not("[]\\ \t\r\n")(i)
}

// RFC 2822 3.4.1 domain literal
fn domain_literal(i: &[u8]) -> PResult<'_, Vec<u8>> {
    map(
        delimited(
            pair(opt(cfws), char('[')),
            fold_many0(
                alt((dtext, quoted_pair, is_a(" \t\r\n"))),
                vec![b'['],
                |mut acc: Vec<u8>, item: &[u8]| {
                    acc.extend_from_slice(item);
                    acc
                },
            ),
            pair(char(']'), opt(cfws)),
        ),
        |mut res| {
            res.push(b']');
            res
        },
    )(i)
}

// RFC 2822 3.4.1 domain, including RFC 2822 4.4 obsolete syntax
fn domain(i: &[u8]) -> PResult<'_, Vec<Vec<u8>>> {
    alt((
        separated_nonempty_list(char('.'), atom),
        map(domain_literal, |d| vec![d]),
    ))(i)
}

// RFC 2822 3.4.1 address specification
fn addr_spec(i: &[u8]) -> PResult<'_, AddrSpec> {
    map(
        separated_pair(local_part, char('@'), domain),
        |(local, domain)| AddrSpec { local, domain },
    )(i)
}

// RFC 2822 3.4 angle-delimited address
fn angle_addr(i: &[u8]) -> PResult<'_, AddrSpec> {
    delimited(
        pair(opt(cfws), char('<')),
        addr_spec,
        pair(char('>'), opt(cfws)),
    )(i)
}

// RFC 2822 3.4 mailbox
fn mailbox(i: &[u8]) -> PResult<'_, MailboxSpec> {
    alt((
        map(pair(opt(phrase), angle_addr), |(name, addr)| MailboxSpec {
            name: name.unwrap_or_default(),
            addr,
        }),
        map(addr_spec, |addr| MailboxSpec { name: vec![], addr }),
    ))(i)
}

// Used in obsolete list syntax
fn obs_list_delim(i: &[u8]) -> PResult<'_, ()> {
    map(many1(tuple((opt(cfws), char(','), opt(cfws)))), |_| ())(i)
}

// RFC 2822 3.4 mailbox list, including 4.4 obsolete syntax
fn mailbox_list(i: &[u8]) -> PResult<'_, Vec<MailboxSpec>> {
    separated_nonempty_list(obs_list_delim, mailbox)(i)
}

// RFC 2822 3.4 group
fn group(i: &[u8]) -> PResult<'_, GroupSpec> {
    map(
        pair(
            terminated(phrase, char(':')),
            terminated(
                opt(mailbox_list),
                tuple((opt(cfws), char(';'), opt(cfws))),
            ),
        ),
        |(name, boxes)| GroupSpec {
            name,
            boxes: boxes.unwrap_or_default(),
        },
    )(i)
}

// RFC 2822 3.4 address
fn address(i: &[u8]) -> PResult<'_, Address> {
    alt((map(mailbox, Address::Mailbox), map(group, Address::Group)))(i)
}

// RFC 2822 3.4 address list, including 4.4 obsolete syntax
fn address_list(i: &[u8]) -> PResult<'_, Vec<Address>> {
    delimited(
        opt(obs_list_delim),
        separated_nonempty_list(obs_list_delim, address),
        opt(obs_list_delim),
    )(i)
}

/// A parsed `Content-Type` header.
///
/// The type, subtype, and parameter names are always lower case. Parameter
/// values are kept as written, minus quoting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    pub typ: String,
    pub subtype: String,
    pub parms: Vec<(String, String)>,
}

impl ContentType {
    pub fn new(typ: &str, subtype: &str) -> Self {
        ContentType {
            typ: typ.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            parms: vec![],
        }
    }

    /// RFC 2045 5.2 default content type.
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    pub fn with_parm(mut self, name: &str, value: &str) -> Self {
        self.set_parm(name, value);
        self
    }

    pub fn is_type(&self, typ: &str) -> bool {
        self.typ.eq_ignore_ascii_case(typ)
    }

    pub fn is(&self, typ: &str, subtype: &str) -> bool {
        self.is_type(typ) && self.subtype.eq_ignore_ascii_case(subtype)
    }

    pub fn parm(&self, name: &str) -> Option<&str> {
        find_parm(&self.parms, name)
    }

    pub fn set_parm(&mut self, name: &str, value: &str) {
        set_parm(&mut self.parms, name, value);
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.typ, self.subtype)?;
        write_parms(f, &self.parms)
    }
}

/// A parsed `Content-Disposition` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDisposition {
    pub disposition: String,
    pub parms: Vec<(String, String)>,
}

impl ContentDisposition {
    pub fn new(disposition: &str) -> Self {
        ContentDisposition {
            disposition: disposition.to_ascii_lowercase(),
            parms: vec![],
        }
    }

    pub fn attachment(filename: Option<&str>) -> Self {
        let mut this = Self::new("attachment");
        if let Some(filename) = filename {
            this.set_parm("filename", filename);
        }
        this
    }

    pub fn is_attachment(&self) -> bool {
        "attachment" == self.disposition
    }

    pub fn filename(&self) -> Option<&str> {
        self.parm("filename")
    }

    pub fn parm(&self, name: &str) -> Option<&str> {
        find_parm(&self.parms, name)
    }

    pub fn set_parm(&mut self, name: &str, value: &str) {
        set_parm(&mut self.parms, name, value);
    }
}

impl fmt::Display for ContentDisposition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.disposition)?;
        write_parms(f, &self.parms)
    }
}

fn find_parm<'a>(parms: &'a [(String, String)], name: &str) -> Option<&'a str> {
    parms
        .iter()
        .find(|&&(ref n, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, ref v)| v.as_str())
}

fn set_parm(parms: &mut Vec<(String, String)>, name: &str, value: &str) {
    let name = name.to_ascii_lowercase();
    if let Some(existing) = parms.iter_mut().find(|&&mut (ref n, _)| *n == name)
    {
        existing.1 = value.to_owned();
    } else {
        parms.push((name, value.to_owned()));
    }
}

fn write_parms(
    f: &mut fmt::Formatter,
    parms: &[(String, String)],
) -> fmt::Result {
    for &(ref name, ref value) in parms {
        if !value.is_empty() && value.bytes().all(is_token_char) {
            write!(f, "; {name}={value}")?;
        } else {
            write!(f, "; {name}=\"")?;
            for c in value.chars() {
                if '"' == c || '\\' == c {
                    write!(f, "\\")?;
                }
                write!(f, "{c}")?;
            }
            write!(f, "\"")?;
        }
    }

    Ok(())
}

/// Parses the value of a `Content-Type` header.
///
/// Trailing garbage after the last parameter is ignored.
pub fn parse_content_type(value: &[u8]) -> Option<ContentType> {
    content_type(value).ok().map(|(_, ct)| ct)
}

/// Parses the value of a `Content-Disposition` header.
pub fn parse_content_disposition(value: &[u8]) -> Option<ContentDisposition> {
    content_disposition(value).ok().map(|(_, cd)| cd)
}

/// Parses an RFC 2822 address list, such as the value of a `To` header.
///
/// Returns `None` unless the whole value is understood.
pub fn parse_address_list(value: &[u8]) -> Option<Vec<Address>> {
    match address_list(value) {
        Ok((rest, addresses))
            if rest.iter().all(|b| b.is_ascii_whitespace()) =>
        {
            Some(addresses)
        },
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_parse_content_type() {
        let ct = parse_content_type(b"text/plain").unwrap();
        assert!(ct.is("text", "plain"));
        assert!(ct.parms.is_empty());

        let ct = parse_content_type(
            b" Multipart/Signed; micalg=pgp-sha256;\r\n\t\
              protocol=\"application/pgp-signature\"; \
              boundary=\"=-=abc=-=\"",
        )
        .unwrap();
        assert!(ct.is("multipart", "signed"));
        assert_eq!(Some("pgp-sha256"), ct.parm("micalg"));
        assert_eq!(Some("application/pgp-signature"), ct.parm("PROTOCOL"));
        assert_eq!(Some("=-=abc=-="), ct.parm("boundary"));

        let ct =
            parse_content_type(b"text/plain; charset=utf-8; (comment) ;")
                .unwrap();
        assert_eq!(Some("utf-8"), ct.parm("charset"));

        let ct = parse_content_type(
            b"multipart/encrypted; protocol=application/pgp-encrypted",
        )
        .unwrap();
        assert_eq!(Some("application/pgp-encrypted"), ct.parm("protocol"));

        let ct = parse_content_type(
            b"text/rfc822-headers; protected-headers=\"v1\"",
        )
        .unwrap();
        assert_eq!(Some("v1"), ct.parm("protected-headers"));

        assert_eq!(None, parse_content_type(b"garbage"));
        assert_eq!(None, parse_content_type(b""));
    }

    #[test]
    fn test_parse_content_disposition() {
        let cd = parse_content_disposition(
            b"attachment; filename=\"notes \\\"v2\\\".txt.asc\"",
        )
        .unwrap();
        assert!(cd.is_attachment());
        assert_eq!(Some("notes \"v2\".txt.asc"), cd.filename());

        let cd = parse_content_disposition(b"INLINE").unwrap();
        assert!(!cd.is_attachment());
        assert_eq!(None, cd.filename());
    }

    #[test]
    fn test_content_type_display() {
        let ct = ContentType::new("multipart", "signed")
            .with_parm("micalg", "pgp-sha256")
            .with_parm("protocol", "application/pgp-signature")
            .with_parm("boundary", "abc");
        assert_eq!(
            "multipart/signed; micalg=pgp-sha256; \
             protocol=\"application/pgp-signature\"; boundary=abc",
            ct.to_string()
        );
        assert_eq!(
            Some(ct.clone()),
            parse_content_type(ct.to_string().as_bytes())
        );

        let cd = ContentDisposition::attachment(Some("my file.txt"));
        assert_eq!("attachment; filename=\"my file.txt\"", cd.to_string());
    }

    #[test]
    fn test_parse_address_list() {
        let addresses = parse_address_list(
            b"\"Alice A.\" <alice@a.example>, bob@b.example,\r\n \
              Carol (work) <carol.c@[192.0.2.1]>",
        )
        .unwrap();
        assert_eq!(3, addresses.len());
        let specs = addresses
            .iter()
            .flat_map(Address::mailboxes)
            .map(|mb| mb.addr.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            vec!["alice@a.example", "bob@b.example", "carol.c@[192.0.2.1]"],
            specs
        );
        assert_matches!(Address::Mailbox(_), &addresses[0]);
        if let Address::Mailbox(ref mb) = addresses[0] {
            assert_eq!(vec![b"Alice A.".to_vec()], mb.name);
        }

        let addresses =
            parse_address_list(b"Friends: a@x.example, b@y.example;")
                .unwrap();
        assert_eq!(1, addresses.len());
        assert_eq!(2, addresses[0].mailboxes().len());

        let addresses =
            parse_address_list(b"undisclosed-recipients:;").unwrap();
        assert_matches!(Address::Group(_), &addresses[0]);
        assert!(addresses[0].mailboxes().is_empty());

        assert_eq!(None, parse_address_list(b"not an address"));
        assert_eq!(None, parse_address_list(b"a@b.example <"));
    }

    proptest! {
        #[test]
        fn header_parsers_never_panic(
            s in prop::collection::vec(prop::num::u8::ANY, 0..80)
        ) {
            parse_content_type(&s);
            parse_content_disposition(&s);
            parse_address_list(&s);
        }
    }
}

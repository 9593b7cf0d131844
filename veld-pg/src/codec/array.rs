//! Array wire formats.
//!
//! The text parser avoids the usual buffer-and-copy path: element runs
//! are returned as sub-slices of the raw input, and quoted elements are
//! copied only when they contain backslash escapes.

use bytes::{BufMut, BytesMut};
use std::borrow::Cow;

use crate::error::{PgError, PgResult};

/// One dimension of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayDim {
    pub len: i32,
    pub lower: i32,
}

/// The binary array header: element OID, null flag and dimensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrayHeader {
    pub elem_oid: u32,
    pub contains_null: bool,
    pub dims: Vec<ArrayDim>,
}

impl ArrayHeader {
    /// Decodes the header, returning it and the body offset.
    pub fn decode(raw: &[u8]) -> PgResult<(ArrayHeader, usize)> {
        if raw.len() < 12 {
            return Err(PgError::WireSize { typ: "array header", len: raw.len() });
        }
        let ndim = i32::from_be_bytes(raw[0..4].try_into().unwrap());
        let contains_null = i32::from_be_bytes(raw[4..8].try_into().unwrap()) != 0;
        let elem_oid = u32::from_be_bytes(raw[8..12].try_into().unwrap());
        if !(0..=16).contains(&ndim) {
            return Err(PgError::format("array", format!("implausible dimension count {ndim}")));
        }
        let mut off = 12;
        let mut dims = Vec::with_capacity(ndim as usize);
        for _ in 0..ndim {
            if raw.len() < off + 8 {
                return Err(PgError::WireSize { typ: "array dimensions", len: raw.len() });
            }
            dims.push(ArrayDim {
                len: i32::from_be_bytes(raw[off..off + 4].try_into().unwrap()),
                lower: i32::from_be_bytes(raw[off + 4..off + 8].try_into().unwrap()),
            });
            off += 8;
        }
        Ok((ArrayHeader { elem_oid, contains_null, dims }, off))
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.dims.len() as i32);
        buf.put_i32(self.contains_null as i32);
        buf.put_u32(self.elem_oid);
        for d in &self.dims {
            buf.put_i32(d.len);
            buf.put_i32(d.lower);
        }
    }
}

/// One parsed text array element: a raw slice of the input, or an owned
/// copy for quoted elements that contained escapes.
#[derive(Debug)]
pub struct RawElement<'a> {
    pub raw: Cow<'a, [u8]>,
    pub quoted: bool,
}

impl RawElement<'_> {
    /// The literal `NULL`, case-sensitive, unquoted and four bytes long.
    pub fn is_null(&self) -> bool {
        !self.quoted && self.raw.as_ref() == b"NULL"
    }
}

#[derive(Debug, Default)]
pub struct RawTextArray<'a> {
    pub els: Vec<RawElement<'a>>,
    pub dims: Vec<ArrayDim>,
}

/// Parses the text form of an array: an optional `[lo:hi]=` dimension
/// prefix, then nested `{}` lists with `,` separators. Trailing input
/// is rejected.
pub fn parse_text_array(raw: &[u8]) -> PgResult<RawTextArray<'_>> {
    let mut p = Parser { raw, off: 0 };
    let mut dst = RawTextArray::default();
    p.skip_ws();

    let mut explicit = Vec::new();
    while p.peek() == Some(b'[') {
        p.bump();
        let lower = p.parse_int()?;
        if p.next_byte() != Some(b':') {
            return Err(PgError::format("array", "expected ':' in dimensions"));
        }
        let upper = p.parse_int()?;
        if p.next_byte() != Some(b']') {
            return Err(PgError::format("array", "expected ']' in dimensions"));
        }
        explicit.push(ArrayDim { lower, len: upper - lower + 1 });
    }
    if p.peek() == Some(b'=') {
        p.bump();
    }

    if p.peek() != Some(b'{') {
        return Err(PgError::format("array", "expected '{'"));
    }
    // Consume all initial opening braces; their count is the number of
    // implicit dimensions.
    let mut implicit = vec![ArrayDim { lower: 1, len: 0 }];
    while p.peek() == Some(b'{') {
        p.bump();
        implicit.last_mut().unwrap().len = 1;
        implicit.push(ArrayDim { lower: 1, len: 0 });
    }
    let mut current = implicit.len() - 1;
    let mut counter = current;

    loop {
        match p.peek() {
            Some(b'{') => {
                p.bump();
                if current == counter {
                    implicit[current].len += 1;
                }
                current += 1;
            }
            Some(b',') => {
                p.bump();
            }
            Some(b'}') => {
                p.bump();
                if current == 0 {
                    return Err(PgError::format("array", "unbalanced '}'"));
                }
                current -= 1;
                if current < counter {
                    counter = current;
                }
                if current == 0 {
                    break;
                }
            }
            _ => {
                let el = p.parse_value()?;
                if current == counter {
                    implicit[current].len += 1;
                }
                dst.els.push(el);
            }
        }
    }

    p.skip_ws();
    if p.off < p.raw.len() {
        return Err(PgError::format(
            "array",
            format!("unexpected trailing data: {}", String::from_utf8_lossy(&p.raw[p.off..])),
        ));
    }

    if dst.els.is_empty() {
        dst.dims = vec![];
    } else if !explicit.is_empty() {
        dst.dims = explicit;
    } else {
        // the first entry is the bookkeeping root, not a dimension
        dst.dims = implicit.split_off(1);
    }
    Ok(dst)
}

struct Parser<'a> {
    raw: &'a [u8],
    off: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.raw.get(self.off).copied()
    }
    fn bump(&mut self) {
        self.off += 1;
    }
    fn next_byte(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.off += 1;
        }
        b
    }
    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c == b' ' || (c > b'\t' && c < b'\r') {
                self.off += 1;
            } else {
                break;
            }
        }
    }

    fn parse_value(&mut self) -> PgResult<RawElement<'a>> {
        if self.peek() == Some(b'"') {
            return self.parse_quoted();
        }
        let mark = self.off;
        loop {
            match self.peek() {
                Some(b',') | Some(b'}') => {
                    return Ok(RawElement {
                        raw: Cow::Borrowed(&self.raw[mark..self.off]),
                        quoted: false,
                    })
                }
                Some(_) => self.bump(),
                None => return Err(PgError::format("array", "unterminated element")),
            }
        }
    }

    fn parse_quoted(&mut self) -> PgResult<RawElement<'a>> {
        self.bump();
        let mark = self.off;
        let mut copy: Option<Vec<u8>> = None;
        loop {
            match self.peek() {
                Some(b'\\') => {
                    // first escape: copy what was borrowed so far
                    let buf = copy.get_or_insert_with(|| self.raw[mark..self.off].to_vec());
                    self.off += 1;
                    match self.raw.get(self.off) {
                        Some(&c) => {
                            buf.push(c);
                            self.off += 1;
                        }
                        None => return Err(PgError::format("array", "unterminated escape")),
                    }
                }
                Some(b'"') => {
                    let raw = match copy {
                        Some(owned) => Cow::Owned(owned),
                        None => Cow::Borrowed(&self.raw[mark..self.off]),
                    };
                    self.bump();
                    return Ok(RawElement { raw, quoted: true });
                }
                Some(c) => {
                    if let Some(owned) = copy.as_mut() {
                        owned.push(c);
                    }
                    self.bump();
                }
                None => return Err(PgError::format("array", "unterminated quoted element")),
            }
        }
    }

    fn parse_int(&mut self) -> PgResult<i32> {
        match self.peek() {
            Some(c) if c.is_ascii_digit() => {}
            _ => return Err(PgError::format("array", "no number found")),
        }
        let mut res: i64 = 0;
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            res = res * 10 + (c - b'0') as i64;
            if res > i32::MAX as i64 {
                return Err(PgError::format("array", "number exceeds max int32"));
            }
            self.bump();
        }
        Ok(res as i32)
    }
}

/// Quotes a text array element if it needs quoting: empty, leading or
/// trailing whitespace, structural characters, or the bare word null.
pub fn quote_elem(raw: &[u8]) -> Vec<u8> {
    let is_space = |b: u8| b == b' ' || (b > b'\t' && b < b'\r');
    let needs = raw.is_empty()
        || is_space(raw[0])
        || is_space(raw[raw.len() - 1])
        || raw.iter().any(|&b| matches!(b, b'{' | b'}' | b',' | b'"' | b'\\'))
        || raw.eq_ignore_ascii_case(b"null");
    if !needs {
        return raw.to_vec();
    }
    let mut res = Vec::with_capacity(raw.len() + 8);
    res.push(b'"');
    for &b in raw {
        if b == b'\\' || b == b'"' {
            res.push(b'\\');
        }
        res.push(b);
    }
    res.push(b'"');
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let a = parse_text_array(b"{a,b,c}").unwrap();
        assert_eq!(a.els.len(), 3);
        assert_eq!(a.dims, vec![ArrayDim { lower: 1, len: 3 }]);
        assert_eq!(a.els[0].raw.as_ref(), b"a");
        assert!(matches!(a.els[0].raw, Cow::Borrowed(_)));
    }

    #[test]
    fn test_parse_quoted_and_null() {
        let a = parse_text_array(br#"{a,"b,c",NULL,"q\"r"}"#).unwrap();
        assert_eq!(a.els.len(), 4);
        assert_eq!(a.els[0].raw.as_ref(), b"a");
        assert_eq!(a.els[1].raw.as_ref(), b"b,c");
        assert!(matches!(a.els[1].raw, Cow::Borrowed(_)));
        assert!(a.els[2].is_null());
        assert_eq!(a.els[3].raw.as_ref(), br#"q"r"#);
        // only the escaped element gets its own allocation
        assert!(matches!(a.els[3].raw, Cow::Owned(_)));
    }

    #[test]
    fn test_parse_null_case_sensitive() {
        let a = parse_text_array(b"{null,NULL}").unwrap();
        assert!(!a.els[0].is_null());
        assert!(a.els[1].is_null());
        let a = parse_text_array(br#"{"NULL"}"#).unwrap();
        assert!(!a.els[0].is_null());
    }

    #[test]
    fn test_parse_dims() {
        let a = parse_text_array(b"{{1,2,3},{4,5,6}}").unwrap();
        assert_eq!(a.els.len(), 6);
        assert_eq!(
            a.dims,
            vec![ArrayDim { lower: 1, len: 2 }, ArrayDim { lower: 1, len: 3 }]
        );
        let a = parse_text_array(b"[0:2]={7,8,9}").unwrap();
        assert_eq!(a.dims, vec![ArrayDim { lower: 0, len: 3 }]);
    }

    #[test]
    fn test_parse_empty() {
        let a = parse_text_array(b"{}").unwrap();
        assert!(a.els.is_empty());
        assert!(a.dims.is_empty());
    }

    #[test]
    fn test_parse_trailing_rejected() {
        assert!(parse_text_array(b"{a} x").is_err());
        assert!(parse_text_array(b"{a}}").is_err());
    }

    #[test]
    fn test_header_roundtrip() {
        let hdr = ArrayHeader {
            elem_oid: 20,
            contains_null: true,
            dims: vec![ArrayDim { len: 4, lower: 1 }],
        };
        let mut buf = BytesMut::new();
        hdr.encode(&mut buf);
        let (back, off) = ArrayHeader::decode(&buf).unwrap();
        assert_eq!(back, hdr);
        assert_eq!(off, 20);
    }

    #[test]
    fn test_quote_elem() {
        assert_eq!(quote_elem(b"abc"), b"abc".to_vec());
        assert_eq!(quote_elem(b"a,b"), br#""a,b""#.to_vec());
        assert_eq!(quote_elem(b"null"), br#""null""#.to_vec());
        assert_eq!(quote_elem(br#"q"r"#), br#""q\"r""#.to_vec());
        assert_eq!(quote_elem(b""), br#""""#.to_vec());
    }
}

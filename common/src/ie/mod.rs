//! TLV-encoded information elements carried in management frames.

pub mod ft;
pub mod rsn;
pub mod wsc;

use bytes::BufMut;
use failure::Fail;

#[derive(Debug, Fail, PartialEq)]
pub enum Error {
    #[fail(display = "element header truncated")]
    TruncatedHeader,
    #[fail(display = "element {} overruns its buffer", _0)]
    ElementOverrun(u8),
    #[fail(display = "element {} has unexpected length {}", _0, _1)]
    UnexpectedLength(u8, usize),
    #[fail(display = "duplicate element {}", _0)]
    DuplicateElement(u8),
    #[fail(display = "invalid element: {}", _0)]
    InvalidValue(&'static str),
}

// IEEE Std 802.11-2016, 9.4.2.1, Table 9-77 (excerpt)
pub struct Id;

impl Id {
    pub const SSID: u8 = 0;
    pub const SUPPORTED_RATES: u8 = 1;
    pub const DSSS_PARAM_SET: u8 = 3;
    pub const TIM: u8 = 5;
    pub const COUNTRY: u8 = 7;
    pub const HT_CAPABILITIES: u8 = 45;
    pub const RSNE: u8 = 48;
    pub const EXTENDED_SUPPORTED_RATES: u8 = 50;
    pub const MOBILITY_DOMAIN: u8 = 54;
    pub const FAST_BSS_TRANSITION: u8 = 55;
    pub const VENDOR_SPECIFIC: u8 = 221;
}

/// Iterates over the elements of an IE section, yielding each `(id, body)`
/// exactly once. An element whose length runs past the end of the buffer
/// terminates iteration with an error; well-formed sections iterate to
/// completion.
pub struct Reader<'a> {
    buf: &'a [u8],
    failed: bool,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, failed: false }
    }
}

impl<'a> Iterator for Reader<'a> {
    type Item = Result<(u8, &'a [u8]), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }
        if self.buf.len() < 2 {
            self.failed = true;
            return Some(Err(Error::TruncatedHeader));
        }
        let id = self.buf[0];
        let body_len = self.buf[1] as usize;
        if self.buf.len() < 2 + body_len {
            self.failed = true;
            return Some(Err(Error::ElementOverrun(id)));
        }
        let body = &self.buf[2..2 + body_len];
        self.buf = &self.buf[2 + body_len..];
        Some(Ok((id, body)))
    }
}

/// Collects an IE section, rejecting malformed framing and duplicate RSNE or
/// MDE elements, which are fatal to the containing frame exchange.
pub fn parse_checked(buf: &[u8]) -> Result<Vec<(u8, &[u8])>, Error> {
    let mut seen_rsne = false;
    let mut seen_mde = false;
    let mut elements = vec![];
    for element in Reader::new(buf) {
        let (id, body) = element?;
        match id {
            Id::RSNE if seen_rsne => return Err(Error::DuplicateElement(id)),
            Id::RSNE => seen_rsne = true,
            Id::MOBILITY_DOMAIN if seen_mde => return Err(Error::DuplicateElement(id)),
            Id::MOBILITY_DOMAIN => seen_mde = true,
            _ => (),
        }
        elements.push((id, body));
    }
    Ok(elements)
}

pub fn write_element(buf: &mut Vec<u8>, id: u8, body: &[u8]) {
    debug_assert!(body.len() <= 255);
    buf.put_u8(id);
    buf.put_u8(body.len() as u8);
    buf.put_slice(body);
}

pub fn write_ssid(buf: &mut Vec<u8>, ssid: &[u8]) {
    write_element(buf, Id::SSID, ssid)
}

/// At most eight rates go into the Supported Rates element; the remainder
/// spills into Extended Supported Rates.
pub fn write_supported_rates(buf: &mut Vec<u8>, rates: &[u8]) {
    let (head, tail) = if rates.len() > 8 { rates.split_at(8) } else { (rates, &[][..]) };
    write_element(buf, Id::SUPPORTED_RATES, head);
    if !tail.is_empty() {
        write_element(buf, Id::EXTENDED_SUPPORTED_RATES, tail);
    }
}

/// Returns the body of the first element with the given id, if any.
pub fn find_element<'a>(buf: &'a [u8], id: u8) -> Option<&'a [u8]> {
    Reader::new(buf).filter_map(|r| r.ok()).find(|(i, _)| *i == id).map(|(_, body)| body)
}

/// Returns the raw bytes of the first element with the given id, TLV framing
/// included, so it can be echoed verbatim in a later frame.
pub fn find_raw_element<'a>(buf: &'a [u8], id: u8) -> Option<&'a [u8]> {
    let mut rest = buf;
    while rest.len() >= 2 {
        let body_len = rest[1] as usize;
        if rest.len() < 2 + body_len {
            return None;
        }
        if rest[0] == id {
            return Some(&rest[..2 + body_len]);
        }
        rest = &rest[2 + body_len..];
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_variant;

    #[test]
    fn reader_yields_each_element_once() {
        let buf = [0, 3, b'f', b'o', b'o', 1, 2, 0x82, 0x84];
        let elements: Vec<_> = Reader::new(&buf[..]).collect::<Result<_, _>>().unwrap();
        assert_eq!(elements, vec![(0u8, &b"foo"[..]), (1u8, &[0x82u8, 0x84][..])]);
    }

    #[test]
    fn reader_rejects_overrun() {
        let buf = [0, 3, b'f', b'o'];
        let mut reader = Reader::new(&buf[..]);
        assert_variant!(reader.next(), Some(Err(Error::ElementOverrun(0))));
        assert_variant!(reader.next(), None);
    }

    #[test]
    fn reader_rejects_dangling_header() {
        let buf = [0, 1, b'x', 7];
        let mut reader = Reader::new(&buf[..]);
        assert_variant!(reader.next(), Some(Ok((0, _))));
        assert_variant!(reader.next(), Some(Err(Error::TruncatedHeader)));
    }

    #[test]
    fn duplicate_rsne_is_fatal() {
        let buf = [48, 2, 1, 0, 48, 2, 1, 0];
        assert_variant!(parse_checked(&buf[..]), Err(Error::DuplicateElement(48)));
    }

    #[test]
    fn duplicate_mde_is_fatal() {
        let buf = [54, 3, 0x34, 0x12, 1, 54, 3, 0x34, 0x12, 1];
        assert_variant!(parse_checked(&buf[..]), Err(Error::DuplicateElement(54)));
    }

    #[test]
    fn unknown_elements_are_kept_for_the_caller_to_skip() {
        let buf = [200, 1, 0xAA, 0, 1, b'x'];
        let elements = parse_checked(&buf[..]).expect("well-formed section");
        assert_eq!(elements.len(), 2);
    }

    #[test]
    fn rates_spill_into_extended_element() {
        let mut buf = vec![];
        write_supported_rates(&mut buf, &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(&buf[..], &[1, 8, 1, 2, 3, 4, 5, 6, 7, 8, 50, 1, 9]);
    }

    #[test]
    fn find_raw_element_preserves_framing() {
        let buf = [0, 1, b'x', 54, 3, 0x34, 0x12, 1];
        assert_eq!(find_raw_element(&buf[..], 54), Some(&[54u8, 3, 0x34, 0x12, 1][..]));
        assert_eq!(find_element(&buf[..], 54), Some(&[0x34u8, 0x12, 1][..]));
    }
}

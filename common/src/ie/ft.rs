//! Fast BSS Transition elements: MDE and FTE.

use byteorder::{ByteOrder, LittleEndian};
use bytes::BufMut;

use crate::ie::{Error, Id};

/// IEEE Std 802.11-2016, 9.4.2.47. The body is exactly three bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mde {
    pub mdid: u16,
    pub ft_capabilities: u8,
}

pub const FT_CAP_OVER_DS: u8 = 0x01;
pub const FT_CAP_RESOURCE_REQ: u8 = 0x02;

impl Mde {
    pub fn from_bytes(bytes: &[u8]) -> Result<Mde, Error> {
        if bytes.len() < 2 {
            return Err(Error::TruncatedHeader);
        }
        if bytes[0] != Id::MOBILITY_DOMAIN {
            return Err(Error::InvalidValue("not an MDE"));
        }
        if bytes[1] != 3 || bytes.len() != 5 {
            return Err(Error::UnexpectedLength(Id::MOBILITY_DOMAIN, bytes.len() - 2));
        }
        Ok(Mde { mdid: LittleEndian::read_u16(&bytes[2..4]), ft_capabilities: bytes[4] })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(5);
        buf.put_u8(Id::MOBILITY_DOMAIN);
        buf.put_u8(3);
        buf.put_u16_le(self.mdid);
        buf.put_u8(self.ft_capabilities);
        buf
    }
}

// FTE subelement ids, IEEE Std 802.11-2016, 9.4.2.48, Table 9-148
const SUBELEM_R1KH_ID: u8 = 1;
const SUBELEM_GTK: u8 = 2;
const SUBELEM_R0KH_ID: u8 = 3;
const SUBELEM_IGTK: u8 = 4;

/// IEEE Std 802.11-2016, 9.4.2.48.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fte {
    pub mic_element_count: u8,
    pub mic: [u8; 16],
    pub anonce: [u8; 32],
    pub snonce: [u8; 32],
    pub r1kh_id: Option<[u8; 6]>,
    pub gtk: Option<Vec<u8>>,
    pub r0kh_id: Option<Vec<u8>>,
    pub igtk: Option<Vec<u8>>,
}

impl Fte {
    pub fn new() -> Self {
        Fte {
            mic_element_count: 0,
            mic: [0u8; 16],
            anonce: [0u8; 32],
            snonce: [0u8; 32],
            r1kh_id: None,
            gtk: None,
            r0kh_id: None,
            igtk: None,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Fte, Error> {
        if bytes.len() < 2 {
            return Err(Error::TruncatedHeader);
        }
        if bytes[0] != Id::FAST_BSS_TRANSITION {
            return Err(Error::InvalidValue("not an FTE"));
        }
        let body_len = bytes[1] as usize;
        if bytes.len() != 2 + body_len || body_len < 82 {
            return Err(Error::UnexpectedLength(Id::FAST_BSS_TRANSITION, bytes.len() - 2));
        }
        let body = &bytes[2..];

        let mut fte = Fte::new();
        // MIC control: first octet reserved, second octet is the element count.
        fte.mic_element_count = body[1];
        fte.mic.copy_from_slice(&body[2..18]);
        fte.anonce.copy_from_slice(&body[18..50]);
        fte.snonce.copy_from_slice(&body[50..82]);

        let mut rest = &body[82..];
        while !rest.is_empty() {
            if rest.len() < 2 {
                return Err(Error::TruncatedHeader);
            }
            let (sub_id, sub_len) = (rest[0], rest[1] as usize);
            if rest.len() < 2 + sub_len {
                return Err(Error::ElementOverrun(Id::FAST_BSS_TRANSITION));
            }
            let sub_body = &rest[2..2 + sub_len];
            match sub_id {
                SUBELEM_R1KH_ID => {
                    if sub_len != 6 {
                        return Err(Error::InvalidValue("R1KH-ID must be 6 bytes"));
                    }
                    let mut r1kh_id = [0u8; 6];
                    r1kh_id.copy_from_slice(sub_body);
                    fte.r1kh_id = Some(r1kh_id);
                }
                SUBELEM_GTK => fte.gtk = Some(sub_body.to_vec()),
                SUBELEM_R0KH_ID => {
                    if sub_len < 1 || sub_len > 48 {
                        return Err(Error::InvalidValue("R0KH-ID must be 1..48 bytes"));
                    }
                    fte.r0kh_id = Some(sub_body.to_vec());
                }
                SUBELEM_IGTK => fte.igtk = Some(sub_body.to_vec()),
                // Unknown subelements are skipped.
                _ => (),
            }
            rest = &rest[2 + sub_len..];
        }
        Ok(fte)
    }

    fn body_len(&self) -> usize {
        let mut len = 82;
        if let Some(_) = self.r1kh_id {
            len += 2 + 6;
        }
        if let Some(ref gtk) = self.gtk {
            len += 2 + gtk.len();
        }
        if let Some(ref r0kh_id) = self.r0kh_id {
            len += 2 + r0kh_id.len();
        }
        if let Some(ref igtk) = self.igtk {
            len += 2 + igtk.len();
        }
        len
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        if let Some(ref r0kh_id) = self.r0kh_id {
            if r0kh_id.is_empty() || r0kh_id.len() > 48 {
                return Err(Error::InvalidValue("R0KH-ID must be 1..48 bytes"));
            }
        }
        let body_len = self.body_len();
        if body_len > 255 {
            return Err(Error::UnexpectedLength(Id::FAST_BSS_TRANSITION, body_len));
        }
        let mut buf = Vec::with_capacity(2 + body_len);
        buf.put_u8(Id::FAST_BSS_TRANSITION);
        buf.put_u8(body_len as u8);
        buf.put_u8(0); // MIC control, reserved octet
        buf.put_u8(self.mic_element_count);
        buf.put_slice(&self.mic[..]);
        buf.put_slice(&self.anonce[..]);
        buf.put_slice(&self.snonce[..]);
        if let Some(ref r1kh_id) = self.r1kh_id {
            buf.put_u8(SUBELEM_R1KH_ID);
            buf.put_u8(6);
            buf.put_slice(&r1kh_id[..]);
        }
        if let Some(ref gtk) = self.gtk {
            buf.put_u8(SUBELEM_GTK);
            buf.put_u8(gtk.len() as u8);
            buf.put_slice(&gtk[..]);
        }
        if let Some(ref r0kh_id) = self.r0kh_id {
            buf.put_u8(SUBELEM_R0KH_ID);
            buf.put_u8(r0kh_id.len() as u8);
            buf.put_slice(&r0kh_id[..]);
        }
        if let Some(ref igtk) = self.igtk {
            buf.put_u8(SUBELEM_IGTK);
            buf.put_u8(igtk.len() as u8);
            buf.put_slice(&igtk[..]);
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_variant;

    #[test]
    fn mde_byte_layout() {
        let mde = Mde { mdid: 0x1234, ft_capabilities: 0x01 };
        assert_eq!(mde.to_bytes(), vec![0x36, 0x03, 0x34, 0x12, 0x01]);
    }

    #[test]
    fn mde_roundtrip() {
        let bytes = [0x36, 0x03, 0x34, 0x12, 0x01];
        let mde = Mde::from_bytes(&bytes[..]).expect("failed to parse MDE");
        assert_eq!(mde.mdid, 0x1234);
        assert_eq!(mde.ft_capabilities, FT_CAP_OVER_DS);
        assert_eq!(mde.to_bytes(), bytes.to_vec());
    }

    #[test]
    fn mde_wrong_length_rejected() {
        assert_variant!(
            Mde::from_bytes(&[0x36, 0x04, 0x34, 0x12, 0x01, 0x00]),
            Err(Error::UnexpectedLength(54, _))
        );
    }

    #[test]
    fn fte_roundtrip_with_subelements() {
        let mut fte = Fte::new();
        fte.snonce = [0xAB; 32];
        fte.r0kh_id = Some(b"r0kh.example.com".to_vec());
        fte.r1kh_id = Some([2, 0, 0, 0, 0, 1]);
        let bytes = fte.to_bytes().expect("failed to write FTE");
        assert_eq!(bytes[0], Id::FAST_BSS_TRANSITION);
        let parsed = Fte::from_bytes(&bytes[..]).expect("failed to parse FTE");
        assert_eq!(parsed, fte);
    }

    #[test]
    fn fte_minimal() {
        let fte = Fte::new();
        let bytes = fte.to_bytes().expect("failed to write FTE");
        assert_eq!(bytes.len(), 2 + 82);
        let parsed = Fte::from_bytes(&bytes[..]).expect("failed to parse FTE");
        assert_eq!(parsed.mic_element_count, 0);
        assert!(parsed.r0kh_id.is_none());
    }

    #[test]
    fn fte_truncated_subelement_rejected() {
        let mut bytes = Fte::new().to_bytes().unwrap();
        bytes.extend_from_slice(&[SUBELEM_GTK, 10, 1, 2]);
        bytes[1] += 4;
        assert_variant!(Fte::from_bytes(&bytes[..]), Err(Error::ElementOverrun(55)));
    }

    #[test]
    fn fte_bad_r0kh_len_rejected() {
        let mut fte = Fte::new();
        fte.r0kh_id = Some(vec![0; 49]);
        assert_variant!(fte.to_bytes(), Err(Error::InvalidValue(..)));
    }
}

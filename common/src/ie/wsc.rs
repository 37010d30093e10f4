//! Wi-Fi Simple Configuration attribute TLVs and the vendor IE carrying them.
//!
//! WSC attributes use big-endian 2-byte ids and lengths, unlike the
//! little-endian 802.11 fields around them.

use byteorder::{BigEndian, ByteOrder};
use bytes::BufMut;

use crate::ie::{Error, Id};

/// WFA vendor-specific OUI and the WSC type octet.
pub const WFA_OUI: [u8; 3] = [0x00, 0x50, 0xF2];
pub const WSC_OUI_TYPE: u8 = 0x04;

// WSC 2.0.5, Table 12 (excerpt)
pub struct AttrId;

impl AttrId {
    pub const ASSOCIATION_STATE: u16 = 0x1002;
    pub const CONFIG_METHODS: u16 = 0x1008;
    pub const CONFIGURATION_ERROR: u16 = 0x1009;
    pub const DEVICE_NAME: u16 = 0x1011;
    pub const DEVICE_PASSWORD_ID: u16 = 0x1012;
    pub const MANUFACTURER: u16 = 0x1021;
    pub const MODEL_NAME: u16 = 0x1023;
    pub const MODEL_NUMBER: u16 = 0x1024;
    pub const REQUEST_TYPE: u16 = 0x103A;
    pub const RESPONSE_TYPE: u16 = 0x103B;
    pub const RF_BANDS: u16 = 0x103C;
    pub const SELECTED_REGISTRAR: u16 = 0x1041;
    pub const SERIAL_NUMBER: u16 = 0x1042;
    pub const WSC_STATE: u16 = 0x1044;
    pub const UUID_E: u16 = 0x1047;
    pub const VENDOR_EXTENSION: u16 = 0x1049;
    pub const SELECTED_REGISTRAR_CONFIG_METHODS: u16 = 0x1053;
    pub const PRIMARY_DEVICE_TYPE: u16 = 0x1054;
    pub const VERSION: u16 = 0x104A;
}

// WSC 2.0.5, Table 37
pub const DEVICE_PASSWORD_PUSH_BUTTON: u16 = 0x0004;

// WSC 2.0.5, Table 33 (excerpt)
pub const CONFIG_METHOD_PUSH_BUTTON: u16 = 0x0080;

// WSC 2.0.5, Table 40
pub const STATE_NOT_CONFIGURED: u8 = 0x01;
pub const STATE_CONFIGURED: u8 = 0x02;

// WSC 2.0.5, Table 42
pub const RESPONSE_TYPE_ENROLLEE_OPEN_8021X: u8 = 0x00;
pub const RESPONSE_TYPE_AP: u8 = 0x03;
pub const REQUEST_TYPE_ENROLLEE_OPEN_8021X: u8 = 0x01;

pub const VERSION_2_0: u8 = 0x10;

/// Attributes extracted from one WSC IE. Unknown attributes are skipped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WscAttributes {
    pub version: Option<u8>,
    pub request_type: Option<u8>,
    pub response_type: Option<u8>,
    pub config_methods: Option<u16>,
    pub uuid_e: Option<[u8; 16]>,
    pub rf_bands: Option<u8>,
    pub association_state: Option<u16>,
    pub configuration_error: Option<u16>,
    pub device_password_id: Option<u16>,
    pub selected_registrar: Option<bool>,
    pub selected_registrar_config_methods: Option<u16>,
    pub state: Option<u8>,
    pub device_name: Option<Vec<u8>>,
}

/// Iterates the attribute list of a WSC IE body (the bytes after the WFA
/// OUI + type header), with the same overrun policy as the outer IE reader.
pub struct AttrReader<'a> {
    buf: &'a [u8],
    failed: bool,
}

impl<'a> AttrReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        AttrReader { buf, failed: false }
    }
}

impl<'a> Iterator for AttrReader<'a> {
    type Item = Result<(u16, &'a [u8]), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }
        if self.buf.len() < 4 {
            self.failed = true;
            return Some(Err(Error::TruncatedHeader));
        }
        let id = BigEndian::read_u16(&self.buf[0..2]);
        let body_len = BigEndian::read_u16(&self.buf[2..4]) as usize;
        if self.buf.len() < 4 + body_len {
            self.failed = true;
            return Some(Err(Error::ElementOverrun(Id::VENDOR_SPECIFIC)));
        }
        let body = &self.buf[4..4 + body_len];
        self.buf = &self.buf[4 + body_len..];
        Some(Ok((id, body)))
    }
}

fn expect_len(body: &[u8], len: usize) -> Result<(), Error> {
    if body.len() != len {
        return Err(Error::UnexpectedLength(Id::VENDOR_SPECIFIC, body.len()));
    }
    Ok(())
}

/// Parses the attribute TLVs of a WSC IE body.
pub fn parse_wsc_attrs(buf: &[u8]) -> Result<WscAttributes, Error> {
    let mut attrs = WscAttributes::default();
    for attr in AttrReader::new(buf) {
        let (id, body) = attr?;
        match id {
            AttrId::VERSION => {
                expect_len(body, 1)?;
                attrs.version = Some(body[0]);
            }
            AttrId::REQUEST_TYPE => {
                expect_len(body, 1)?;
                attrs.request_type = Some(body[0]);
            }
            AttrId::RESPONSE_TYPE => {
                expect_len(body, 1)?;
                attrs.response_type = Some(body[0]);
            }
            AttrId::CONFIG_METHODS => {
                expect_len(body, 2)?;
                attrs.config_methods = Some(BigEndian::read_u16(body));
            }
            AttrId::UUID_E => {
                expect_len(body, 16)?;
                let mut uuid = [0u8; 16];
                uuid.copy_from_slice(body);
                attrs.uuid_e = Some(uuid);
            }
            AttrId::RF_BANDS => {
                expect_len(body, 1)?;
                attrs.rf_bands = Some(body[0]);
            }
            AttrId::ASSOCIATION_STATE => {
                expect_len(body, 2)?;
                attrs.association_state = Some(BigEndian::read_u16(body));
            }
            AttrId::CONFIGURATION_ERROR => {
                expect_len(body, 2)?;
                attrs.configuration_error = Some(BigEndian::read_u16(body));
            }
            AttrId::DEVICE_PASSWORD_ID => {
                expect_len(body, 2)?;
                attrs.device_password_id = Some(BigEndian::read_u16(body));
            }
            AttrId::SELECTED_REGISTRAR => {
                expect_len(body, 1)?;
                attrs.selected_registrar = Some(body[0] != 0);
            }
            AttrId::SELECTED_REGISTRAR_CONFIG_METHODS => {
                expect_len(body, 2)?;
                attrs.selected_registrar_config_methods = Some(BigEndian::read_u16(body));
            }
            AttrId::WSC_STATE => {
                expect_len(body, 1)?;
                attrs.state = Some(body[0]);
            }
            AttrId::DEVICE_NAME => attrs.device_name = Some(body.to_vec()),
            _ => (),
        }
    }
    Ok(attrs)
}

/// Returns the WSC attribute list of the first WSC vendor IE in an IE
/// section, if one is present.
pub fn find_wsc_attrs<'a>(elements: &'a [u8]) -> Option<&'a [u8]> {
    for element in crate::ie::Reader::new(elements) {
        match element {
            Ok((Id::VENDOR_SPECIFIC, body))
                if body.len() >= 4 && body[0..3] == WFA_OUI && body[3] == WSC_OUI_TYPE =>
            {
                return Some(&body[4..]);
            }
            Ok(_) => (),
            Err(_) => return None,
        }
    }
    None
}

fn put_attr_u8(buf: &mut Vec<u8>, id: u16, value: u8) {
    buf.put_u16_be(id);
    buf.put_u16_be(1);
    buf.put_u8(value);
}

fn put_attr_u16(buf: &mut Vec<u8>, id: u16, value: u16) {
    buf.put_u16_be(id);
    buf.put_u16_be(2);
    buf.put_u16_be(value);
}

fn put_attr_bytes(buf: &mut Vec<u8>, id: u16, value: &[u8]) {
    buf.put_u16_be(id);
    buf.put_u16_be(value.len() as u16);
    buf.put_slice(value);
}

fn finish_wsc_ie(attrs: Vec<u8>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(attrs.len() + 6);
    buf.put_u8(Id::VENDOR_SPECIFIC);
    buf.put_u8((attrs.len() + 4) as u8);
    buf.put_slice(&WFA_OUI[..]);
    buf.put_u8(WSC_OUI_TYPE);
    buf.put_slice(&attrs[..]);
    buf
}

/// Identity of the device advertised in WSC exchanges.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceInfo {
    pub manufacturer: Vec<u8>,
    pub model_name: Vec<u8>,
    pub model_number: Vec<u8>,
    pub serial_number: Vec<u8>,
    pub device_name: Vec<u8>,
    pub primary_device_type: [u8; 8],
    pub uuid_e: [u8; 16],
}

/// Beacon WSC IE; the Selected Registrar and Device Password ID attributes
/// toggle with push-button mode.
pub fn build_beacon(configured: bool, pbc_active: bool) -> Vec<u8> {
    let mut attrs = vec![];
    put_attr_u8(&mut attrs, AttrId::VERSION, VERSION_2_0);
    put_attr_u8(
        &mut attrs,
        AttrId::WSC_STATE,
        if configured { STATE_CONFIGURED } else { STATE_NOT_CONFIGURED },
    );
    if pbc_active {
        put_attr_u8(&mut attrs, AttrId::SELECTED_REGISTRAR, 1);
        put_attr_u16(&mut attrs, AttrId::DEVICE_PASSWORD_ID, DEVICE_PASSWORD_PUSH_BUTTON);
        put_attr_u16(
            &mut attrs,
            AttrId::SELECTED_REGISTRAR_CONFIG_METHODS,
            CONFIG_METHOD_PUSH_BUTTON,
        );
    }
    finish_wsc_ie(attrs)
}

pub fn build_probe_response(device: &DeviceInfo, configured: bool, pbc_active: bool) -> Vec<u8> {
    let mut attrs = vec![];
    put_attr_u8(&mut attrs, AttrId::VERSION, VERSION_2_0);
    put_attr_u8(
        &mut attrs,
        AttrId::WSC_STATE,
        if configured { STATE_CONFIGURED } else { STATE_NOT_CONFIGURED },
    );
    if pbc_active {
        put_attr_u8(&mut attrs, AttrId::SELECTED_REGISTRAR, 1);
        put_attr_u16(&mut attrs, AttrId::DEVICE_PASSWORD_ID, DEVICE_PASSWORD_PUSH_BUTTON);
        put_attr_u16(
            &mut attrs,
            AttrId::SELECTED_REGISTRAR_CONFIG_METHODS,
            CONFIG_METHOD_PUSH_BUTTON,
        );
    }
    put_attr_u8(&mut attrs, AttrId::RESPONSE_TYPE, RESPONSE_TYPE_AP);
    put_attr_bytes(&mut attrs, AttrId::UUID_E, &device.uuid_e[..]);
    put_attr_bytes(&mut attrs, AttrId::MANUFACTURER, &device.manufacturer[..]);
    put_attr_bytes(&mut attrs, AttrId::MODEL_NAME, &device.model_name[..]);
    put_attr_bytes(&mut attrs, AttrId::MODEL_NUMBER, &device.model_number[..]);
    put_attr_bytes(&mut attrs, AttrId::SERIAL_NUMBER, &device.serial_number[..]);
    put_attr_bytes(&mut attrs, AttrId::PRIMARY_DEVICE_TYPE, &device.primary_device_type[..]);
    put_attr_bytes(&mut attrs, AttrId::DEVICE_NAME, &device.device_name[..]);
    put_attr_u16(&mut attrs, AttrId::CONFIG_METHODS, CONFIG_METHOD_PUSH_BUTTON);
    finish_wsc_ie(attrs)
}

pub fn build_probe_request(device: &DeviceInfo) -> Vec<u8> {
    let mut attrs = vec![];
    put_attr_u8(&mut attrs, AttrId::VERSION, VERSION_2_0);
    put_attr_u8(&mut attrs, AttrId::REQUEST_TYPE, REQUEST_TYPE_ENROLLEE_OPEN_8021X);
    put_attr_u16(&mut attrs, AttrId::CONFIG_METHODS, CONFIG_METHOD_PUSH_BUTTON);
    put_attr_bytes(&mut attrs, AttrId::UUID_E, &device.uuid_e[..]);
    put_attr_bytes(&mut attrs, AttrId::PRIMARY_DEVICE_TYPE, &device.primary_device_type[..]);
    put_attr_u8(&mut attrs, AttrId::RF_BANDS, 0x01);
    put_attr_u16(&mut attrs, AttrId::ASSOCIATION_STATE, 0);
    put_attr_u16(&mut attrs, AttrId::CONFIGURATION_ERROR, 0);
    put_attr_u16(&mut attrs, AttrId::DEVICE_PASSWORD_ID, DEVICE_PASSWORD_PUSH_BUTTON);
    finish_wsc_ie(attrs)
}

pub fn build_association_response() -> Vec<u8> {
    let mut attrs = vec![];
    put_attr_u8(&mut attrs, AttrId::VERSION, VERSION_2_0);
    put_attr_u8(&mut attrs, AttrId::RESPONSE_TYPE, RESPONSE_TYPE_AP);
    finish_wsc_ie(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_variant;

    fn fake_device() -> DeviceInfo {
        DeviceInfo {
            manufacturer: b"Acme".to_vec(),
            model_name: b"AP".to_vec(),
            model_number: b"1".to_vec(),
            serial_number: b"0001".to_vec(),
            device_name: b"acme-ap".to_vec(),
            primary_device_type: [0x00, 0x06, 0x00, 0x50, 0xF2, 0x04, 0x00, 0x01],
            uuid_e: [0x11; 16],
        }
    }

    #[test]
    fn beacon_toggles_selected_registrar() {
        let idle = build_beacon(true, false);
        let attrs = find_wsc_attrs(&idle[..]).expect("expected WSC IE");
        let parsed = parse_wsc_attrs(attrs).expect("failed to parse attrs");
        assert_eq!(parsed.state, Some(STATE_CONFIGURED));
        assert_eq!(parsed.selected_registrar, None);
        assert_eq!(parsed.device_password_id, None);

        let active = build_beacon(true, true);
        let attrs = find_wsc_attrs(&active[..]).expect("expected WSC IE");
        let parsed = parse_wsc_attrs(attrs).expect("failed to parse attrs");
        assert_eq!(parsed.selected_registrar, Some(true));
        assert_eq!(parsed.device_password_id, Some(DEVICE_PASSWORD_PUSH_BUTTON));
    }

    #[test]
    fn probe_request_roundtrip() {
        let ie = build_probe_request(&fake_device());
        let attrs = find_wsc_attrs(&ie[..]).expect("expected WSC IE");
        let parsed = parse_wsc_attrs(attrs).expect("failed to parse attrs");
        assert_eq!(parsed.version, Some(VERSION_2_0));
        assert_eq!(parsed.device_password_id, Some(DEVICE_PASSWORD_PUSH_BUTTON));
        assert_eq!(parsed.uuid_e, Some([0x11; 16]));
    }

    #[test]
    fn probe_response_carries_device_identity() {
        let ie = build_probe_response(&fake_device(), true, false);
        let attrs = find_wsc_attrs(&ie[..]).expect("expected WSC IE");
        let parsed = parse_wsc_attrs(attrs).expect("failed to parse attrs");
        assert_eq!(parsed.response_type, Some(RESPONSE_TYPE_AP));
        assert_eq!(parsed.device_name, Some(b"acme-ap".to_vec()));
    }

    #[test]
    fn association_response_is_minimal() {
        let ie = build_association_response();
        let attrs = find_wsc_attrs(&ie[..]).expect("expected WSC IE");
        let parsed = parse_wsc_attrs(attrs).expect("failed to parse attrs");
        assert_eq!(parsed.version, Some(VERSION_2_0));
        assert_eq!(parsed.response_type, Some(RESPONSE_TYPE_AP));
    }

    #[test]
    fn truncated_attr_rejected() {
        // Claims 4 bytes of payload, provides 1.
        let buf = [0x10, 0x4A, 0x00, 0x04, 0x10];
        assert_variant!(parse_wsc_attrs(&buf[..]), Err(Error::ElementOverrun(221)));
    }

    #[test]
    fn non_wsc_vendor_ie_is_ignored() {
        // Microsoft WMM vendor IE, then a WSC IE.
        let mut elements = vec![221, 5, 0x00, 0x50, 0xF2, 0x02, 0x01];
        elements.extend_from_slice(&build_beacon(true, false)[..]);
        let attrs = find_wsc_attrs(&elements[..]).expect("expected WSC IE");
        assert!(parse_wsc_attrs(attrs).unwrap().state.is_some());
    }
}

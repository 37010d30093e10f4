//! 802.11 management MPDU codec.
//!
//! Frames are built with a zeroed sequence number; the driver fills it in.

use bitfield::{bitfield, bitfield_debug, bitfield_fields, bitfield_struct};
use byteorder::{ByteOrder, LittleEndian};
use bytes::BufMut;
use failure::Fail;

use crate::MacAddr;

#[derive(Debug, Fail, PartialEq)]
pub enum FrameParseError {
    #[fail(display = "frame truncated; needed {} more bytes", _0)]
    Truncated(usize),
    #[fail(display = "not a management frame")]
    NotMgmtFrame,
}

// IEEE Std 802.11-2016, 9.2.4.1.1
bitfield! {
    #[derive(Clone, Copy, PartialEq)]
    pub struct FrameControl(u16);
    impl Debug;
    pub protocol_version, set_protocol_version: 1, 0;
    pub frame_type, set_frame_type: 3, 2;
    pub frame_subtype, set_frame_subtype: 7, 4;
    pub to_ds, set_to_ds: 8;
    pub from_ds, set_from_ds: 9;
    pub more_fragments, set_more_fragments: 10;
    pub retry, set_retry: 11;
    pub power_mgmt, set_power_mgmt: 12;
    pub more_data, set_more_data: 13;
    pub protected, set_protected: 14;
    pub htc_order, set_htc_order: 15;

    pub value, _: 15, 0;
}

pub const FRAME_TYPE_MGMT: u16 = 0;

// IEEE Std 802.11-2016, 9.2.4.1.3, Table 9-1
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MgmtSubtype(pub u8);

impl MgmtSubtype {
    pub const ASSOC_REQ: Self = MgmtSubtype(0);
    pub const ASSOC_RESP: Self = MgmtSubtype(1);
    pub const REASSOC_REQ: Self = MgmtSubtype(2);
    pub const REASSOC_RESP: Self = MgmtSubtype(3);
    pub const PROBE_REQ: Self = MgmtSubtype(4);
    pub const PROBE_RESP: Self = MgmtSubtype(5);
    pub const BEACON: Self = MgmtSubtype(8);
    pub const DISASSOC: Self = MgmtSubtype(10);
    pub const AUTH: Self = MgmtSubtype(11);
    pub const DEAUTH: Self = MgmtSubtype(12);
    pub const ACTION: Self = MgmtSubtype(13);
}

// IEEE Std 802.11-2016, 9.4.1.7, Table 9-45 (excerpt)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReasonCode(pub u16);

impl ReasonCode {
    pub const UNSPECIFIED: Self = ReasonCode(1);
    pub const INVALID_AUTHENTICATION: Self = ReasonCode(2);
    pub const LEAVING: Self = ReasonCode(3);
    pub const DISASSOC_INACTIVITY: Self = ReasonCode(4);
    pub const FOURWAY_HANDSHAKE_TIMEOUT: Self = ReasonCode(16);
    pub const IEEE8021X_AUTH_FAILED: Self = ReasonCode(23);
}

// IEEE Std 802.11-2016, 9.4.1.9, Table 9-46 (excerpt)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const SUCCESS: Self = StatusCode(0);
    pub const UNSPECIFIED: Self = StatusCode(1);
    pub const UNSUPPORTED_AUTH_ALGORITHM: Self = StatusCode(13);
    pub const DENIED_RATES: Self = StatusCode(18);
    pub const INVALID_IE: Self = StatusCode(40);
    pub const INVALID_GROUP_CIPHER: Self = StatusCode(41);
    pub const INVALID_PAIRWISE_CIPHER: Self = StatusCode(42);
    pub const INVALID_AKMP: Self = StatusCode(43);
    pub const INVALID_RSNE_CAPABILITIES: Self = StatusCode(45);
}

// IEEE Std 802.11-2016, 9.4.1.1
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthAlgorithm(pub u16);

impl AuthAlgorithm {
    pub const OPEN_SYSTEM: Self = AuthAlgorithm(0);
    pub const SHARED_KEY: Self = AuthAlgorithm(1);
    pub const FAST_BSS_TRANSITION: Self = AuthAlgorithm(2);
}

// IEEE Std 802.11-2016, 9.4.1.4
bitfield! {
    #[derive(Clone, Copy, PartialEq)]
    pub struct CapabilityInfo(u16);
    impl Debug;
    pub ess, set_ess: 0;
    pub ibss, set_ibss: 1;
    pub cf_pollable, set_cf_pollable: 2;
    pub cf_poll_req, set_cf_poll_req: 3;
    pub privacy, set_privacy: 4;
    pub short_preamble, set_short_preamble: 5;
    pub spectrum_mgmt, set_spectrum_mgmt: 8;
    pub qos, set_qos: 9;
    pub short_slot_time, set_short_slot_time: 10;
    pub radio_measurement, set_radio_measurement: 12;

    pub value, _: 15, 0;
}

/// Fixed 24-byte management frame header.
#[derive(Clone, Debug, PartialEq)]
pub struct MgmtHdr {
    pub frame_ctrl: FrameControl,
    pub duration: u16,
    pub addr1: MacAddr,
    pub addr2: MacAddr,
    pub addr3: MacAddr,
    pub seq_ctrl: u16,
}

impl MgmtHdr {
    pub const LEN: usize = 24;

    pub fn subtype(&self) -> MgmtSubtype {
        MgmtSubtype(self.frame_ctrl.frame_subtype() as u8)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BeaconHdr {
    pub timestamp: u64,
    pub beacon_interval: u16,
    pub capabilities: CapabilityInfo,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AuthHdr {
    pub auth_alg: AuthAlgorithm,
    pub auth_txn_seq_num: u16,
    pub status_code: StatusCode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssocReqHdr {
    pub capabilities: CapabilityInfo,
    pub listen_interval: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReassocReqHdr {
    pub capabilities: CapabilityInfo,
    pub listen_interval: u16,
    pub current_ap: MacAddr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssocRespHdr {
    pub capabilities: CapabilityInfo,
    pub status_code: StatusCode,
    pub aid: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeauthHdr {
    pub reason_code: ReasonCode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DisassocHdr {
    pub reason_code: ReasonCode,
}

/// Subtype-specific fixed fields followed by the frame's IE section.
#[derive(Debug)]
pub enum MgmtBody<'a> {
    Beacon { bcn_hdr: BeaconHdr, elements: &'a [u8] },
    ProbeReq { elements: &'a [u8] },
    ProbeResp { bcn_hdr: BeaconHdr, elements: &'a [u8] },
    Authentication { auth_hdr: AuthHdr, elements: &'a [u8] },
    AssocReq { assoc_req_hdr: AssocReqHdr, elements: &'a [u8] },
    AssocResp { assoc_resp_hdr: AssocRespHdr, elements: &'a [u8] },
    ReassocReq { reassoc_req_hdr: ReassocReqHdr, elements: &'a [u8] },
    ReassocResp { assoc_resp_hdr: AssocRespHdr, elements: &'a [u8] },
    Disassoc { disassoc_hdr: DisassocHdr },
    Deauth { deauth_hdr: DeauthHdr },
    Action { body: &'a [u8] },
    Unsupported { subtype: MgmtSubtype },
}

#[derive(Debug)]
pub struct MgmtFrame<'a> {
    pub hdr: MgmtHdr,
    pub body: MgmtBody<'a>,
}

fn take<'a>(bytes: &'a [u8], n: usize) -> Result<(&'a [u8], &'a [u8]), FrameParseError> {
    if bytes.len() < n {
        return Err(FrameParseError::Truncated(n - bytes.len()));
    }
    Ok(bytes.split_at(n))
}

fn read_addr(bytes: &[u8]) -> MacAddr {
    let mut addr = [0u8; 6];
    addr.copy_from_slice(&bytes[..6]);
    addr
}

impl<'a> MgmtFrame<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<MgmtFrame<'a>, FrameParseError> {
        let (hdr_bytes, rest) = take(bytes, MgmtHdr::LEN)?;
        let frame_ctrl = FrameControl(LittleEndian::read_u16(&hdr_bytes[0..2]));
        if frame_ctrl.frame_type() != FRAME_TYPE_MGMT {
            return Err(FrameParseError::NotMgmtFrame);
        }
        let hdr = MgmtHdr {
            frame_ctrl,
            duration: LittleEndian::read_u16(&hdr_bytes[2..4]),
            addr1: read_addr(&hdr_bytes[4..10]),
            addr2: read_addr(&hdr_bytes[10..16]),
            addr3: read_addr(&hdr_bytes[16..22]),
            seq_ctrl: LittleEndian::read_u16(&hdr_bytes[22..24]),
        };
        let body = MgmtBody::parse(hdr.subtype(), rest)?;
        Ok(MgmtFrame { hdr, body })
    }
}

impl<'a> MgmtBody<'a> {
    pub fn parse(subtype: MgmtSubtype, bytes: &'a [u8]) -> Result<Self, FrameParseError> {
        match subtype {
            MgmtSubtype::BEACON | MgmtSubtype::PROBE_RESP => {
                let (fixed, elements) = take(bytes, 12)?;
                let bcn_hdr = BeaconHdr {
                    timestamp: LittleEndian::read_u64(&fixed[0..8]),
                    beacon_interval: LittleEndian::read_u16(&fixed[8..10]),
                    capabilities: CapabilityInfo(LittleEndian::read_u16(&fixed[10..12])),
                };
                Ok(if subtype == MgmtSubtype::BEACON {
                    MgmtBody::Beacon { bcn_hdr, elements }
                } else {
                    MgmtBody::ProbeResp { bcn_hdr, elements }
                })
            }
            MgmtSubtype::PROBE_REQ => Ok(MgmtBody::ProbeReq { elements: bytes }),
            MgmtSubtype::AUTH => {
                let (fixed, elements) = take(bytes, 6)?;
                let auth_hdr = AuthHdr {
                    auth_alg: AuthAlgorithm(LittleEndian::read_u16(&fixed[0..2])),
                    auth_txn_seq_num: LittleEndian::read_u16(&fixed[2..4]),
                    status_code: StatusCode(LittleEndian::read_u16(&fixed[4..6])),
                };
                Ok(MgmtBody::Authentication { auth_hdr, elements })
            }
            MgmtSubtype::ASSOC_REQ => {
                let (fixed, elements) = take(bytes, 4)?;
                let assoc_req_hdr = AssocReqHdr {
                    capabilities: CapabilityInfo(LittleEndian::read_u16(&fixed[0..2])),
                    listen_interval: LittleEndian::read_u16(&fixed[2..4]),
                };
                Ok(MgmtBody::AssocReq { assoc_req_hdr, elements })
            }
            MgmtSubtype::REASSOC_REQ => {
                let (fixed, elements) = take(bytes, 10)?;
                let reassoc_req_hdr = ReassocReqHdr {
                    capabilities: CapabilityInfo(LittleEndian::read_u16(&fixed[0..2])),
                    listen_interval: LittleEndian::read_u16(&fixed[2..4]),
                    current_ap: read_addr(&fixed[4..10]),
                };
                Ok(MgmtBody::ReassocReq { reassoc_req_hdr, elements })
            }
            MgmtSubtype::ASSOC_RESP | MgmtSubtype::REASSOC_RESP => {
                let (fixed, elements) = take(bytes, 6)?;
                let assoc_resp_hdr = AssocRespHdr {
                    capabilities: CapabilityInfo(LittleEndian::read_u16(&fixed[0..2])),
                    status_code: StatusCode(LittleEndian::read_u16(&fixed[2..4])),
                    aid: LittleEndian::read_u16(&fixed[4..6]) & 0x3FFF,
                };
                Ok(if subtype == MgmtSubtype::ASSOC_RESP {
                    MgmtBody::AssocResp { assoc_resp_hdr, elements }
                } else {
                    MgmtBody::ReassocResp { assoc_resp_hdr, elements }
                })
            }
            MgmtSubtype::DISASSOC => {
                let (fixed, _) = take(bytes, 2)?;
                let disassoc_hdr =
                    DisassocHdr { reason_code: ReasonCode(LittleEndian::read_u16(&fixed[0..2])) };
                Ok(MgmtBody::Disassoc { disassoc_hdr })
            }
            MgmtSubtype::DEAUTH => {
                let (fixed, _) = take(bytes, 2)?;
                let deauth_hdr =
                    DeauthHdr { reason_code: ReasonCode(LittleEndian::read_u16(&fixed[0..2])) };
                Ok(MgmtBody::Deauth { deauth_hdr })
            }
            MgmtSubtype::ACTION => Ok(MgmtBody::Action { body: bytes }),
            subtype => Ok(MgmtBody::Unsupported { subtype }),
        }
    }
}

/// Writes the 24-byte header: version 0, type management, the given subtype,
/// duration and sequence number zeroed.
pub fn write_mgmt_hdr(buf: &mut Vec<u8>, subtype: MgmtSubtype, da: MacAddr, sa: MacAddr, bssid: MacAddr) {
    let mut frame_ctrl = FrameControl(0);
    frame_ctrl.set_frame_type(FRAME_TYPE_MGMT);
    frame_ctrl.set_frame_subtype(subtype.0 as u16);
    buf.put_u16_le(frame_ctrl.value());
    buf.put_u16_le(0); // duration
    buf.put_slice(&da[..]);
    buf.put_slice(&sa[..]);
    buf.put_slice(&bssid[..]);
    buf.put_u16_le(0); // sequence control, filled by the driver
}

pub fn write_auth_frame(
    buf: &mut Vec<u8>,
    da: MacAddr,
    sa: MacAddr,
    bssid: MacAddr,
    auth_alg: AuthAlgorithm,
    auth_txn_seq_num: u16,
    status_code: StatusCode,
    elements: &[u8],
) {
    write_mgmt_hdr(buf, MgmtSubtype::AUTH, da, sa, bssid);
    buf.put_u16_le(auth_alg.0);
    buf.put_u16_le(auth_txn_seq_num);
    buf.put_u16_le(status_code.0);
    buf.put_slice(elements);
}

pub fn write_assoc_resp_frame(
    buf: &mut Vec<u8>,
    da: MacAddr,
    bssid: MacAddr,
    reassoc: bool,
    capabilities: CapabilityInfo,
    status_code: StatusCode,
    aid: u16,
    elements: &[u8],
) {
    let subtype = if reassoc { MgmtSubtype::REASSOC_RESP } else { MgmtSubtype::ASSOC_RESP };
    write_mgmt_hdr(buf, subtype, da, bssid, bssid);
    buf.put_u16_le(capabilities.value());
    buf.put_u16_le(status_code.0);
    // AID carries the two MSBs set per IEEE Std 802.11-2016, 9.4.1.8.
    buf.put_u16_le(if status_code == StatusCode::SUCCESS { aid | 0xC000 } else { 0 });
    buf.put_slice(elements);
}

pub fn write_reassoc_req_frame(
    buf: &mut Vec<u8>,
    da: MacAddr,
    sa: MacAddr,
    bssid: MacAddr,
    capabilities: CapabilityInfo,
    listen_interval: u16,
    current_ap: MacAddr,
    elements: &[u8],
) {
    write_mgmt_hdr(buf, MgmtSubtype::REASSOC_REQ, da, sa, bssid);
    buf.put_u16_le(capabilities.value());
    buf.put_u16_le(listen_interval);
    buf.put_slice(&current_ap[..]);
    buf.put_slice(elements);
}

pub fn write_probe_resp_frame(
    buf: &mut Vec<u8>,
    da: MacAddr,
    bssid: MacAddr,
    capabilities: CapabilityInfo,
    beacon_interval: u16,
    elements: &[u8],
) {
    write_mgmt_hdr(buf, MgmtSubtype::PROBE_RESP, da, bssid, bssid);
    buf.put_u64_le(0); // timestamp, filled by the driver
    buf.put_u16_le(beacon_interval);
    buf.put_u16_le(capabilities.value());
    buf.put_slice(elements);
}

pub fn write_deauth_frame(
    buf: &mut Vec<u8>,
    da: MacAddr,
    sa: MacAddr,
    bssid: MacAddr,
    reason_code: ReasonCode,
) {
    write_mgmt_hdr(buf, MgmtSubtype::DEAUTH, da, sa, bssid);
    buf.put_u16_le(reason_code.0);
}

pub fn write_disassoc_frame(
    buf: &mut Vec<u8>,
    da: MacAddr,
    sa: MacAddr,
    bssid: MacAddr,
    reason_code: ReasonCode,
) {
    write_mgmt_hdr(buf, MgmtSubtype::DISASSOC, da, sa, bssid);
    buf.put_u16_le(reason_code.0);
}

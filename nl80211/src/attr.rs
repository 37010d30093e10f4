//! The subset of nl80211 attributes this daemon exchanges with the kernel.

use anyhow::Context;
use byteorder::{ByteOrder, NativeEndian};
use netlink_packet_utils::{
    nla::{DefaultNla, Nla, NlaBuffer, NlasIterator},
    parsers::{parse_string, parse_u16, parse_u32, parse_u8},
    DecodeError, Emitable, Parseable,
};

use wifi_common::MacAddr;

const NL80211_ATTR_IFINDEX: u16 = 3;
const NL80211_ATTR_IFNAME: u16 = 4;
const NL80211_ATTR_IFTYPE: u16 = 5;
const NL80211_ATTR_MAC: u16 = 6;
const NL80211_ATTR_KEY_DATA: u16 = 7;
const NL80211_ATTR_KEY_IDX: u16 = 8;
const NL80211_ATTR_KEY_CIPHER: u16 = 9;
const NL80211_ATTR_KEY_SEQ: u16 = 10;
const NL80211_ATTR_KEY_DEFAULT: u16 = 11;
const NL80211_ATTR_BEACON_INTERVAL: u16 = 12;
const NL80211_ATTR_DTIM_PERIOD: u16 = 13;
const NL80211_ATTR_BEACON_HEAD: u16 = 14;
const NL80211_ATTR_BEACON_TAIL: u16 = 15;
const NL80211_ATTR_STA_AID: u16 = 16;
const NL80211_ATTR_STA_LISTEN_INTERVAL: u16 = 18;
const NL80211_ATTR_STA_SUPPORTED_RATES: u16 = 19;
const NL80211_ATTR_WIPHY_FREQ: u16 = 38;
const NL80211_ATTR_KEY_DEFAULT_MGMT: u16 = 40;
const NL80211_ATTR_IE: u16 = 42;
const NL80211_ATTR_FRAME: u16 = 51;
const NL80211_ATTR_SSID: u16 = 52;
const NL80211_ATTR_AUTH_TYPE: u16 = 53;
const NL80211_ATTR_REASON_CODE: u16 = 54;
const NL80211_ATTR_KEY_TYPE: u16 = 55;
const NL80211_ATTR_TIMED_OUT: u16 = 65;
const NL80211_ATTR_USE_MFP: u16 = 66;
const NL80211_ATTR_STA_FLAGS2: u16 = 67;
const NL80211_ATTR_CONTROL_PORT: u16 = 68;
const NL80211_ATTR_DISCONNECTED_BY_AP: u16 = 71;
const NL80211_ATTR_STATUS_CODE: u16 = 72;
const NL80211_ATTR_CIPHER_SUITES_PAIRWISE: u16 = 73;
const NL80211_ATTR_CIPHER_SUITE_GROUP: u16 = 74;
const NL80211_ATTR_WPA_VERSIONS: u16 = 75;
const NL80211_ATTR_AKM_SUITES: u16 = 76;
const NL80211_ATTR_RESP_IE: u16 = 78;
const NL80211_ATTR_PREV_BSSID: u16 = 79;
const NL80211_ATTR_DURATION: u16 = 87;
const NL80211_ATTR_COOKIE: u16 = 88;
const NL80211_ATTR_FRAME_MATCH: u16 = 91;
const NL80211_ATTR_ACK: u16 = 92;
const NL80211_ATTR_CQM: u16 = 94;
const NL80211_ATTR_FRAME_TYPE: u16 = 101;
const NL80211_ATTR_CONTROL_PORT_ETHERTYPE: u16 = 102;
const NL80211_ATTR_CONTROL_PORT_NO_ENCRYPT: u16 = 103;
const NL80211_ATTR_REKEY_DATA: u16 = 122;
const NL80211_ATTR_CONTROL_PORT_OVER_NL80211: u16 = 232;

const NL80211_ATTR_CQM_RSSI_THOLD: u16 = 1;
const NL80211_ATTR_CQM_RSSI_HYST: u16 = 2;
const NL80211_ATTR_CQM_RSSI_THRESHOLD_EVENT: u16 = 3;

const NL80211_REKEY_DATA_KEK: u16 = 1;
const NL80211_REKEY_DATA_KCK: u16 = 2;
const NL80211_REKEY_DATA_REPLAY_CTR: u16 = 3;

/// struct nl80211_sta_flag_update: which flags to touch, and their values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationFlagUpdate {
    pub mask: u32,
    pub set: u32,
}

const NL80211_ATTR_CQM_BEACON_LOSS_EVENT: u16 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CqmAttr {
    RssiThold(u32),
    RssiHyst(u32),
    RssiThresholdEvent(u32),
    Other(DefaultNla),
}

impl CqmAttr {
    /// NL80211_ATTR_CQM_BEACON_LOSS_EVENT is a bare flag with no typed
    /// variant of its own.
    pub fn is_beacon_loss(&self) -> bool {
        match self {
            CqmAttr::Other(nla) => nla.kind() == NL80211_ATTR_CQM_BEACON_LOSS_EVENT,
            _ => false,
        }
    }
}

impl Nla for CqmAttr {
    fn value_len(&self) -> usize {
        match self {
            CqmAttr::RssiThold(_) | CqmAttr::RssiHyst(_) | CqmAttr::RssiThresholdEvent(_) => 4,
            CqmAttr::Other(attr) => attr.value_len(),
        }
    }

    fn kind(&self) -> u16 {
        match self {
            CqmAttr::RssiThold(_) => NL80211_ATTR_CQM_RSSI_THOLD,
            CqmAttr::RssiHyst(_) => NL80211_ATTR_CQM_RSSI_HYST,
            CqmAttr::RssiThresholdEvent(_) => NL80211_ATTR_CQM_RSSI_THRESHOLD_EVENT,
            CqmAttr::Other(attr) => attr.kind(),
        }
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        match self {
            CqmAttr::RssiThold(d) | CqmAttr::RssiHyst(d) | CqmAttr::RssiThresholdEvent(d) => {
                NativeEndian::write_u32(buffer, *d)
            }
            CqmAttr::Other(attr) => attr.emit_value(buffer),
        }
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Parseable<NlaBuffer<&'a T>> for CqmAttr {
    fn parse(buf: &NlaBuffer<&'a T>) -> Result<Self, DecodeError> {
        let payload = buf.value();
        Ok(match buf.kind() {
            NL80211_ATTR_CQM_RSSI_THOLD => {
                CqmAttr::RssiThold(parse_u32(payload).context("invalid CQM_RSSI_THOLD")?)
            }
            NL80211_ATTR_CQM_RSSI_HYST => {
                CqmAttr::RssiHyst(parse_u32(payload).context("invalid CQM_RSSI_HYST")?)
            }
            NL80211_ATTR_CQM_RSSI_THRESHOLD_EVENT => CqmAttr::RssiThresholdEvent(
                parse_u32(payload).context("invalid CQM_RSSI_THRESHOLD_EVENT")?,
            ),
            _ => CqmAttr::Other(DefaultNla::parse(buf).context("invalid CQM NLA")?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RekeyAttr {
    Kek(Vec<u8>),
    Kck(Vec<u8>),
    /// Big-endian 8-byte EAPOL replay counter.
    ReplayCtr([u8; 8]),
    Other(DefaultNla),
}

impl Nla for RekeyAttr {
    fn value_len(&self) -> usize {
        match self {
            RekeyAttr::Kek(d) | RekeyAttr::Kck(d) => d.len(),
            RekeyAttr::ReplayCtr(_) => 8,
            RekeyAttr::Other(attr) => attr.value_len(),
        }
    }

    fn kind(&self) -> u16 {
        match self {
            RekeyAttr::Kek(_) => NL80211_REKEY_DATA_KEK,
            RekeyAttr::Kck(_) => NL80211_REKEY_DATA_KCK,
            RekeyAttr::ReplayCtr(_) => NL80211_REKEY_DATA_REPLAY_CTR,
            RekeyAttr::Other(attr) => attr.kind(),
        }
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        match self {
            RekeyAttr::Kek(d) | RekeyAttr::Kck(d) => buffer[..d.len()].copy_from_slice(&d[..]),
            RekeyAttr::ReplayCtr(d) => buffer[..8].copy_from_slice(&d[..]),
            RekeyAttr::Other(attr) => attr.emit_value(buffer),
        }
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Parseable<NlaBuffer<&'a T>> for RekeyAttr {
    fn parse(buf: &NlaBuffer<&'a T>) -> Result<Self, DecodeError> {
        let payload = buf.value();
        Ok(match buf.kind() {
            NL80211_REKEY_DATA_KEK => RekeyAttr::Kek(payload.to_vec()),
            NL80211_REKEY_DATA_KCK => RekeyAttr::Kck(payload.to_vec()),
            NL80211_REKEY_DATA_REPLAY_CTR => {
                if payload.len() != 8 {
                    return Err(DecodeError::from("REKEY_DATA_REPLAY_CTR must be 8 bytes"));
                }
                let mut ctr = [0u8; 8];
                ctr.copy_from_slice(payload);
                RekeyAttr::ReplayCtr(ctr)
            }
            _ => RekeyAttr::Other(DefaultNla::parse(buf).context("invalid REKEY_DATA NLA")?),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Nl80211Attr {
    Ifindex(u32),
    Ifname(String),
    Iftype(u32),
    Mac(MacAddr),
    KeyData(Vec<u8>),
    KeyIdx(u8),
    KeyCipher(u32),
    KeySeq(Vec<u8>),
    KeyDefault,
    KeyDefaultMgmt,
    KeyType(u32),
    BeaconInterval(u32),
    DtimPeriod(u32),
    BeaconHead(Vec<u8>),
    BeaconTail(Vec<u8>),
    StaAid(u16),
    StaListenInterval(u16),
    StaSupportedRates(Vec<u8>),
    StaFlags2(StationFlagUpdate),
    WiphyFreq(u32),
    Ie(Vec<u8>),
    Frame(Vec<u8>),
    FrameMatch(Vec<u8>),
    FrameType(u16),
    Ssid(Vec<u8>),
    AuthType(u32),
    ReasonCode(u16),
    StatusCode(u16),
    TimedOut,
    Ack,
    DisconnectedByAp,
    UseMfp(u32),
    ControlPort,
    ControlPortEthertype(u16),
    ControlPortNoEncrypt,
    ControlPortOverNl80211,
    CipherSuitesPairwise(Vec<u32>),
    CipherSuiteGroup(u32),
    WpaVersions(u32),
    AkmSuites(Vec<u32>),
    RespIe(Vec<u8>),
    PrevBssid(MacAddr),
    Duration(u32),
    Cookie(u64),
    Cqm(Vec<CqmAttr>),
    RekeyData(Vec<RekeyAttr>),
    Other(DefaultNla),
}

impl Nla for Nl80211Attr {
    fn value_len(&self) -> usize {
        match self {
            Nl80211Attr::KeyIdx(_) => 1,
            Nl80211Attr::StaAid(_)
            | Nl80211Attr::StaListenInterval(_)
            | Nl80211Attr::ReasonCode(_)
            | Nl80211Attr::StatusCode(_)
            | Nl80211Attr::FrameType(_)
            | Nl80211Attr::ControlPortEthertype(_) => 2,
            Nl80211Attr::Ifindex(_)
            | Nl80211Attr::Iftype(_)
            | Nl80211Attr::KeyCipher(_)
            | Nl80211Attr::KeyType(_)
            | Nl80211Attr::BeaconInterval(_)
            | Nl80211Attr::DtimPeriod(_)
            | Nl80211Attr::WiphyFreq(_)
            | Nl80211Attr::AuthType(_)
            | Nl80211Attr::UseMfp(_)
            | Nl80211Attr::CipherSuiteGroup(_)
            | Nl80211Attr::WpaVersions(_)
            | Nl80211Attr::Duration(_) => 4,
            Nl80211Attr::Cookie(_) | Nl80211Attr::StaFlags2(_) => 8,
            Nl80211Attr::Mac(_) | Nl80211Attr::PrevBssid(_) => 6,
            Nl80211Attr::Ifname(s) => s.len() + 1,
            Nl80211Attr::KeyData(d)
            | Nl80211Attr::KeySeq(d)
            | Nl80211Attr::BeaconHead(d)
            | Nl80211Attr::BeaconTail(d)
            | Nl80211Attr::StaSupportedRates(d)
            | Nl80211Attr::Ie(d)
            | Nl80211Attr::Frame(d)
            | Nl80211Attr::FrameMatch(d)
            | Nl80211Attr::Ssid(d)
            | Nl80211Attr::RespIe(d) => d.len(),
            Nl80211Attr::CipherSuitesPairwise(suites) | Nl80211Attr::AkmSuites(suites) => {
                4 * suites.len()
            }
            Nl80211Attr::KeyDefault
            | Nl80211Attr::KeyDefaultMgmt
            | Nl80211Attr::TimedOut
            | Nl80211Attr::Ack
            | Nl80211Attr::DisconnectedByAp
            | Nl80211Attr::ControlPort
            | Nl80211Attr::ControlPortNoEncrypt
            | Nl80211Attr::ControlPortOverNl80211 => 0,
            Nl80211Attr::Cqm(nlas) => nlas.as_slice().buffer_len(),
            Nl80211Attr::RekeyData(nlas) => nlas.as_slice().buffer_len(),
            Nl80211Attr::Other(attr) => attr.value_len(),
        }
    }

    fn kind(&self) -> u16 {
        match self {
            Nl80211Attr::Ifindex(_) => NL80211_ATTR_IFINDEX,
            Nl80211Attr::Ifname(_) => NL80211_ATTR_IFNAME,
            Nl80211Attr::Iftype(_) => NL80211_ATTR_IFTYPE,
            Nl80211Attr::Mac(_) => NL80211_ATTR_MAC,
            Nl80211Attr::KeyData(_) => NL80211_ATTR_KEY_DATA,
            Nl80211Attr::KeyIdx(_) => NL80211_ATTR_KEY_IDX,
            Nl80211Attr::KeyCipher(_) => NL80211_ATTR_KEY_CIPHER,
            Nl80211Attr::KeySeq(_) => NL80211_ATTR_KEY_SEQ,
            Nl80211Attr::KeyDefault => NL80211_ATTR_KEY_DEFAULT,
            Nl80211Attr::KeyDefaultMgmt => NL80211_ATTR_KEY_DEFAULT_MGMT,
            Nl80211Attr::KeyType(_) => NL80211_ATTR_KEY_TYPE,
            Nl80211Attr::BeaconInterval(_) => NL80211_ATTR_BEACON_INTERVAL,
            Nl80211Attr::DtimPeriod(_) => NL80211_ATTR_DTIM_PERIOD,
            Nl80211Attr::BeaconHead(_) => NL80211_ATTR_BEACON_HEAD,
            Nl80211Attr::BeaconTail(_) => NL80211_ATTR_BEACON_TAIL,
            Nl80211Attr::StaAid(_) => NL80211_ATTR_STA_AID,
            Nl80211Attr::StaListenInterval(_) => NL80211_ATTR_STA_LISTEN_INTERVAL,
            Nl80211Attr::StaSupportedRates(_) => NL80211_ATTR_STA_SUPPORTED_RATES,
            Nl80211Attr::StaFlags2(_) => NL80211_ATTR_STA_FLAGS2,
            Nl80211Attr::WiphyFreq(_) => NL80211_ATTR_WIPHY_FREQ,
            Nl80211Attr::Ie(_) => NL80211_ATTR_IE,
            Nl80211Attr::Frame(_) => NL80211_ATTR_FRAME,
            Nl80211Attr::FrameMatch(_) => NL80211_ATTR_FRAME_MATCH,
            Nl80211Attr::FrameType(_) => NL80211_ATTR_FRAME_TYPE,
            Nl80211Attr::Ssid(_) => NL80211_ATTR_SSID,
            Nl80211Attr::AuthType(_) => NL80211_ATTR_AUTH_TYPE,
            Nl80211Attr::ReasonCode(_) => NL80211_ATTR_REASON_CODE,
            Nl80211Attr::StatusCode(_) => NL80211_ATTR_STATUS_CODE,
            Nl80211Attr::TimedOut => NL80211_ATTR_TIMED_OUT,
            Nl80211Attr::Ack => NL80211_ATTR_ACK,
            Nl80211Attr::DisconnectedByAp => NL80211_ATTR_DISCONNECTED_BY_AP,
            Nl80211Attr::UseMfp(_) => NL80211_ATTR_USE_MFP,
            Nl80211Attr::ControlPort => NL80211_ATTR_CONTROL_PORT,
            Nl80211Attr::ControlPortEthertype(_) => NL80211_ATTR_CONTROL_PORT_ETHERTYPE,
            Nl80211Attr::ControlPortNoEncrypt => NL80211_ATTR_CONTROL_PORT_NO_ENCRYPT,
            Nl80211Attr::ControlPortOverNl80211 => NL80211_ATTR_CONTROL_PORT_OVER_NL80211,
            Nl80211Attr::CipherSuitesPairwise(_) => NL80211_ATTR_CIPHER_SUITES_PAIRWISE,
            Nl80211Attr::CipherSuiteGroup(_) => NL80211_ATTR_CIPHER_SUITE_GROUP,
            Nl80211Attr::WpaVersions(_) => NL80211_ATTR_WPA_VERSIONS,
            Nl80211Attr::AkmSuites(_) => NL80211_ATTR_AKM_SUITES,
            Nl80211Attr::RespIe(_) => NL80211_ATTR_RESP_IE,
            Nl80211Attr::PrevBssid(_) => NL80211_ATTR_PREV_BSSID,
            Nl80211Attr::Duration(_) => NL80211_ATTR_DURATION,
            Nl80211Attr::Cookie(_) => NL80211_ATTR_COOKIE,
            Nl80211Attr::Cqm(_) => NL80211_ATTR_CQM,
            Nl80211Attr::RekeyData(_) => NL80211_ATTR_REKEY_DATA,
            Nl80211Attr::Other(attr) => attr.kind(),
        }
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        match self {
            Nl80211Attr::KeyIdx(d) => buffer[0] = *d,
            Nl80211Attr::StaAid(d)
            | Nl80211Attr::StaListenInterval(d)
            | Nl80211Attr::ReasonCode(d)
            | Nl80211Attr::StatusCode(d)
            | Nl80211Attr::FrameType(d)
            | Nl80211Attr::ControlPortEthertype(d) => NativeEndian::write_u16(buffer, *d),
            Nl80211Attr::Ifindex(d)
            | Nl80211Attr::Iftype(d)
            | Nl80211Attr::KeyCipher(d)
            | Nl80211Attr::KeyType(d)
            | Nl80211Attr::BeaconInterval(d)
            | Nl80211Attr::DtimPeriod(d)
            | Nl80211Attr::WiphyFreq(d)
            | Nl80211Attr::AuthType(d)
            | Nl80211Attr::UseMfp(d)
            | Nl80211Attr::CipherSuiteGroup(d)
            | Nl80211Attr::WpaVersions(d)
            | Nl80211Attr::Duration(d) => NativeEndian::write_u32(buffer, *d),
            Nl80211Attr::Cookie(d) => NativeEndian::write_u64(buffer, *d),
            Nl80211Attr::StaFlags2(flags) => {
                NativeEndian::write_u32(&mut buffer[0..4], flags.mask);
                NativeEndian::write_u32(&mut buffer[4..8], flags.set);
            }
            Nl80211Attr::Mac(addr) | Nl80211Attr::PrevBssid(addr) => {
                buffer[..6].copy_from_slice(&addr[..])
            }
            Nl80211Attr::Ifname(s) => {
                buffer[..s.len()].copy_from_slice(s.as_bytes());
                buffer[s.len()] = 0;
            }
            Nl80211Attr::KeyData(d)
            | Nl80211Attr::KeySeq(d)
            | Nl80211Attr::BeaconHead(d)
            | Nl80211Attr::BeaconTail(d)
            | Nl80211Attr::StaSupportedRates(d)
            | Nl80211Attr::Ie(d)
            | Nl80211Attr::Frame(d)
            | Nl80211Attr::FrameMatch(d)
            | Nl80211Attr::Ssid(d)
            | Nl80211Attr::RespIe(d) => buffer[..d.len()].copy_from_slice(&d[..]),
            Nl80211Attr::CipherSuitesPairwise(suites) | Nl80211Attr::AkmSuites(suites) => {
                for (i, suite) in suites.iter().enumerate() {
                    NativeEndian::write_u32(&mut buffer[i * 4..(i + 1) * 4], *suite);
                }
            }
            Nl80211Attr::KeyDefault
            | Nl80211Attr::KeyDefaultMgmt
            | Nl80211Attr::TimedOut
            | Nl80211Attr::Ack
            | Nl80211Attr::DisconnectedByAp
            | Nl80211Attr::ControlPort
            | Nl80211Attr::ControlPortNoEncrypt
            | Nl80211Attr::ControlPortOverNl80211 => (),
            Nl80211Attr::Cqm(nlas) => nlas.as_slice().emit(buffer),
            Nl80211Attr::RekeyData(nlas) => nlas.as_slice().emit(buffer),
            Nl80211Attr::Other(attr) => attr.emit_value(buffer),
        }
    }

    fn is_nested(&self) -> bool {
        match self {
            Nl80211Attr::Cqm(_) | Nl80211Attr::RekeyData(_) => true,
            _ => false,
        }
    }
}

fn parse_mac(payload: &[u8]) -> Result<MacAddr, DecodeError> {
    if payload.len() != 6 {
        return Err(DecodeError::from("MAC attribute must be 6 bytes"));
    }
    let mut addr = [0u8; 6];
    addr.copy_from_slice(payload);
    Ok(addr)
}

fn parse_u32_list(payload: &[u8]) -> Result<Vec<u32>, DecodeError> {
    if payload.len() % 4 != 0 {
        return Err(DecodeError::from("suite list length must be a multiple of 4"));
    }
    Ok(payload.chunks(4).map(NativeEndian::read_u32).collect())
}

impl<'a, T: AsRef<[u8]> + ?Sized> Parseable<NlaBuffer<&'a T>> for Nl80211Attr {
    fn parse(buf: &NlaBuffer<&'a T>) -> Result<Self, DecodeError> {
        let payload = buf.value();
        Ok(match buf.kind() {
            NL80211_ATTR_IFINDEX => {
                Nl80211Attr::Ifindex(parse_u32(payload).context("invalid IFINDEX")?)
            }
            NL80211_ATTR_IFNAME => {
                Nl80211Attr::Ifname(parse_string(payload).context("invalid IFNAME")?)
            }
            NL80211_ATTR_IFTYPE => {
                Nl80211Attr::Iftype(parse_u32(payload).context("invalid IFTYPE")?)
            }
            NL80211_ATTR_MAC => Nl80211Attr::Mac(parse_mac(payload)?),
            NL80211_ATTR_KEY_DATA => Nl80211Attr::KeyData(payload.to_vec()),
            NL80211_ATTR_KEY_IDX => {
                Nl80211Attr::KeyIdx(parse_u8(payload).context("invalid KEY_IDX")?)
            }
            NL80211_ATTR_KEY_CIPHER => {
                Nl80211Attr::KeyCipher(parse_u32(payload).context("invalid KEY_CIPHER")?)
            }
            NL80211_ATTR_KEY_SEQ => Nl80211Attr::KeySeq(payload.to_vec()),
            NL80211_ATTR_KEY_DEFAULT => Nl80211Attr::KeyDefault,
            NL80211_ATTR_KEY_DEFAULT_MGMT => Nl80211Attr::KeyDefaultMgmt,
            NL80211_ATTR_KEY_TYPE => {
                Nl80211Attr::KeyType(parse_u32(payload).context("invalid KEY_TYPE")?)
            }
            NL80211_ATTR_BEACON_INTERVAL => {
                Nl80211Attr::BeaconInterval(parse_u32(payload).context("invalid BEACON_INTERVAL")?)
            }
            NL80211_ATTR_DTIM_PERIOD => {
                Nl80211Attr::DtimPeriod(parse_u32(payload).context("invalid DTIM_PERIOD")?)
            }
            NL80211_ATTR_BEACON_HEAD => Nl80211Attr::BeaconHead(payload.to_vec()),
            NL80211_ATTR_BEACON_TAIL => Nl80211Attr::BeaconTail(payload.to_vec()),
            NL80211_ATTR_STA_AID => {
                Nl80211Attr::StaAid(parse_u16(payload).context("invalid STA_AID")?)
            }
            NL80211_ATTR_STA_LISTEN_INTERVAL => Nl80211Attr::StaListenInterval(
                parse_u16(payload).context("invalid STA_LISTEN_INTERVAL")?,
            ),
            NL80211_ATTR_STA_SUPPORTED_RATES => {
                Nl80211Attr::StaSupportedRates(payload.to_vec())
            }
            NL80211_ATTR_STA_FLAGS2 => {
                if payload.len() != 8 {
                    return Err(DecodeError::from("STA_FLAGS2 must be 8 bytes"));
                }
                Nl80211Attr::StaFlags2(StationFlagUpdate {
                    mask: NativeEndian::read_u32(&payload[0..4]),
                    set: NativeEndian::read_u32(&payload[4..8]),
                })
            }
            NL80211_ATTR_WIPHY_FREQ => {
                Nl80211Attr::WiphyFreq(parse_u32(payload).context("invalid WIPHY_FREQ")?)
            }
            NL80211_ATTR_IE => Nl80211Attr::Ie(payload.to_vec()),
            NL80211_ATTR_FRAME => Nl80211Attr::Frame(payload.to_vec()),
            NL80211_ATTR_FRAME_MATCH => Nl80211Attr::FrameMatch(payload.to_vec()),
            NL80211_ATTR_FRAME_TYPE => {
                Nl80211Attr::FrameType(parse_u16(payload).context("invalid FRAME_TYPE")?)
            }
            NL80211_ATTR_SSID => Nl80211Attr::Ssid(payload.to_vec()),
            NL80211_ATTR_AUTH_TYPE => {
                Nl80211Attr::AuthType(parse_u32(payload).context("invalid AUTH_TYPE")?)
            }
            NL80211_ATTR_REASON_CODE => {
                Nl80211Attr::ReasonCode(parse_u16(payload).context("invalid REASON_CODE")?)
            }
            NL80211_ATTR_STATUS_CODE => {
                Nl80211Attr::StatusCode(parse_u16(payload).context("invalid STATUS_CODE")?)
            }
            NL80211_ATTR_TIMED_OUT => Nl80211Attr::TimedOut,
            NL80211_ATTR_ACK => Nl80211Attr::Ack,
            NL80211_ATTR_DISCONNECTED_BY_AP => Nl80211Attr::DisconnectedByAp,
            NL80211_ATTR_USE_MFP => {
                Nl80211Attr::UseMfp(parse_u32(payload).context("invalid USE_MFP")?)
            }
            NL80211_ATTR_CONTROL_PORT => Nl80211Attr::ControlPort,
            NL80211_ATTR_CONTROL_PORT_ETHERTYPE => Nl80211Attr::ControlPortEthertype(
                parse_u16(payload).context("invalid CONTROL_PORT_ETHERTYPE")?,
            ),
            NL80211_ATTR_CONTROL_PORT_NO_ENCRYPT => Nl80211Attr::ControlPortNoEncrypt,
            NL80211_ATTR_CONTROL_PORT_OVER_NL80211 => Nl80211Attr::ControlPortOverNl80211,
            NL80211_ATTR_CIPHER_SUITES_PAIRWISE => {
                Nl80211Attr::CipherSuitesPairwise(parse_u32_list(payload)?)
            }
            NL80211_ATTR_CIPHER_SUITE_GROUP => Nl80211Attr::CipherSuiteGroup(
                parse_u32(payload).context("invalid CIPHER_SUITE_GROUP")?,
            ),
            NL80211_ATTR_WPA_VERSIONS => {
                Nl80211Attr::WpaVersions(parse_u32(payload).context("invalid WPA_VERSIONS")?)
            }
            NL80211_ATTR_AKM_SUITES => Nl80211Attr::AkmSuites(parse_u32_list(payload)?),
            NL80211_ATTR_RESP_IE => Nl80211Attr::RespIe(payload.to_vec()),
            NL80211_ATTR_PREV_BSSID => Nl80211Attr::PrevBssid(parse_mac(payload)?),
            NL80211_ATTR_DURATION => {
                Nl80211Attr::Duration(parse_u32(payload).context("invalid DURATION")?)
            }
            NL80211_ATTR_COOKIE => {
                if payload.len() != 8 {
                    return Err(DecodeError::from("COOKIE must be 8 bytes"));
                }
                Nl80211Attr::Cookie(NativeEndian::read_u64(payload))
            }
            NL80211_ATTR_CQM => {
                let mut nlas = Vec::new();
                for nla in NlasIterator::new(payload) {
                    let nla = &nla.context("invalid CQM NLA")?;
                    nlas.push(CqmAttr::parse(nla).context("invalid CQM NLA")?);
                }
                Nl80211Attr::Cqm(nlas)
            }
            NL80211_ATTR_REKEY_DATA => {
                let mut nlas = Vec::new();
                for nla in NlasIterator::new(payload) {
                    let nla = &nla.context("invalid REKEY_DATA NLA")?;
                    nlas.push(RekeyAttr::parse(nla).context("invalid REKEY_DATA NLA")?);
                }
                Nl80211Attr::RekeyData(nlas)
            }
            _ => Nl80211Attr::Other(DefaultNla::parse(buf).context("invalid NLA (unknown kind)")?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_and_parse_scalar_attrs() {
        let attrs = vec![
            Nl80211Attr::Ifindex(3),
            Nl80211Attr::Mac([1, 2, 3, 4, 5, 6]),
            Nl80211Attr::StatusCode(0),
            Nl80211Attr::TimedOut,
            Nl80211Attr::AkmSuites(vec![0x000F_AC02]),
        ];
        let mut buf = vec![0u8; attrs.as_slice().buffer_len()];
        attrs.as_slice().emit(&mut buf[..]);

        let mut parsed = Vec::new();
        for nla in NlasIterator::new(&buf[..]) {
            let nla = nla.expect("failed reading NLA");
            parsed.push(Nl80211Attr::parse(&nla).expect("failed parsing NLA"));
        }
        assert_eq!(parsed, attrs);
    }

    #[test]
    fn ifname_is_null_terminated() {
        let attr = Nl80211Attr::Ifname("wlan0".to_string());
        let mut buf = vec![0xFFu8; attr.buffer_len()];
        attr.emit(&mut buf[..]);
        // 4-byte NLA header, then the name and its terminator.
        assert_eq!(&buf[4..10], b"wlan0\0");
    }

    #[test]
    fn rekey_replay_ctr_requires_8_bytes() {
        let attrs = vec![Nl80211Attr::RekeyData(vec![RekeyAttr::ReplayCtr([0, 0, 0, 0, 0, 0, 0, 42])])];
        let mut buf = vec![0u8; attrs.as_slice().buffer_len()];
        attrs.as_slice().emit(&mut buf[..]);
        let mut parsed = Vec::new();
        for nla in NlasIterator::new(&buf[..]) {
            let nla = nla.expect("failed reading NLA");
            parsed.push(Nl80211Attr::parse(&nla).expect("failed parsing NLA"));
        }
        assert_eq!(parsed, attrs);
    }

    #[test]
    fn sta_flags2_roundtrip() {
        let attr = Nl80211Attr::StaFlags2(StationFlagUpdate {
            mask: crate::STA_FLAG_AUTHORIZED,
            set: crate::STA_FLAG_AUTHORIZED,
        });
        let mut buf = vec![0u8; attr.buffer_len()];
        attr.emit(&mut buf[..]);
        let nla = NlasIterator::new(&buf[..]).next().unwrap().unwrap();
        let parsed = Nl80211Attr::parse(&nla).unwrap();
        assert_eq!(parsed, attr);
    }
}

use bitfield::{bitfield, bitfield_debug, bitfield_fields, bitfield_struct};
use byteorder::{ByteOrder, LittleEndian};
use bytes::BufMut;

use crate::ie::rsn::akm::Akm;
use crate::ie::rsn::cipher::Cipher;
use crate::ie::{Error, Id};

pub type Pmkid = [u8; 16];

// IEEE Std 802.11-2016, 9.4.2.25.4, Figure 9-257
bitfield! {
    #[derive(Clone, PartialEq)]
    pub struct RsnCapabilities(u16);
    impl Debug;
    pub preauth, set_preauth: 0;
    pub no_pairwise, set_no_pairwise: 1;
    pub ptksa_replay_counters, set_ptksa_replay_counters: 3, 2;
    pub gtksa_replay_counters, set_gtksa_replay_counters: 5, 4;
    pub mgmt_frame_protection_req, set_mgmt_frame_protection_req: 6;
    pub mgmt_frame_protection_cap, set_mgmt_frame_protection_cap: 7;
    pub joint_multiband, set_joint_multiband: 8;
    pub peerkey_enabled, set_peerkey_enabled: 9;
    pub ssp_amsdu_cap, set_ssp_amsdu_cap: 10;
    pub ssp_amsdu_req, set_ssp_amsdu_req: 11;
    pub pbac, set_pbac: 12;
    pub extended_key_id, set_extended_key_id: 13;

    pub value, _: 15, 0;
}

/// IEEE Std 802.11-2016, 9.4.2.25.1. All trailing fields are optional; a
/// field is only written when it, or a later field, is present.
#[derive(Clone, Debug, PartialEq)]
pub struct Rsne {
    pub version: u16,
    pub group_data_cipher_suite: Option<Cipher>,
    pub pairwise_cipher_suites: Vec<Cipher>,
    pub akm_suites: Vec<Akm>,
    pub rsn_capabilities: Option<RsnCapabilities>,
    pub pmkids: Vec<Pmkid>,
    pub group_mgmt_cipher_suite: Option<Cipher>,
}

pub const VERSION: u16 = 1;

impl Rsne {
    pub fn new() -> Self {
        Rsne {
            version: VERSION,
            group_data_cipher_suite: None,
            pairwise_cipher_suites: vec![],
            akm_suites: vec![],
            rsn_capabilities: None,
            pmkids: vec![],
            group_mgmt_cipher_suite: None,
        }
    }

    /// Length of the serialized element, TLV framing included.
    pub fn len(&self) -> usize {
        2 + self.body_len()
    }

    fn body_len(&self) -> usize {
        let fields = [
            self.group_data_cipher_suite.as_ref().map(|_| 4),
            if self.pairwise_cipher_suites.is_empty() {
                None
            } else {
                Some(2 + 4 * self.pairwise_cipher_suites.len())
            },
            if self.akm_suites.is_empty() { None } else { Some(2 + 4 * self.akm_suites.len()) },
            self.rsn_capabilities.as_ref().map(|_| 2),
            if self.pmkids.is_empty() { None } else { Some(2 + 16 * self.pmkids.len()) },
            self.group_mgmt_cipher_suite.as_ref().map(|_| 4),
        ];
        2 + fields.iter().take_while(|f| f.is_some()).filter_map(|f| *f).sum::<usize>()
    }

    /// Serializes the element. The output is deterministic for a given value
    /// so two RSNEs can be byte-compared. Trailing absent fields are omitted;
    /// an absent field followed by a present one is invalid.
    pub fn write_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        self.validate_field_order()?;
        buf.put_u8(Id::RSNE);
        buf.put_u8((self.body_len()) as u8);
        buf.put_u16_le(self.version);
        if let Some(ref group) = self.group_data_cipher_suite {
            write_suite(buf, &group.oui, group.suite_type);
        }
        if !self.pairwise_cipher_suites.is_empty() {
            buf.put_u16_le(self.pairwise_cipher_suites.len() as u16);
            for cipher in &self.pairwise_cipher_suites {
                write_suite(buf, &cipher.oui, cipher.suite_type);
            }
        }
        if !self.akm_suites.is_empty() {
            buf.put_u16_le(self.akm_suites.len() as u16);
            for akm in &self.akm_suites {
                write_suite(buf, &akm.oui, akm.suite_type);
            }
        }
        if let Some(ref caps) = self.rsn_capabilities {
            buf.put_u16_le(caps.value());
        }
        if !self.pmkids.is_empty() {
            buf.put_u16_le(self.pmkids.len() as u16);
            for pmkid in &self.pmkids {
                buf.put_slice(&pmkid[..]);
            }
        }
        if let Some(ref group_mgmt) = self.group_mgmt_cipher_suite {
            buf.put_slice(&group_mgmt.oui[..]);
            buf.put_u8(group_mgmt.suite_type);
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::with_capacity(self.len());
        self.write_into(&mut buf)?;
        Ok(buf)
    }

    fn validate_field_order(&self) -> Result<(), Error> {
        let present = [
            self.group_data_cipher_suite.is_some(),
            !self.pairwise_cipher_suites.is_empty(),
            !self.akm_suites.is_empty(),
            self.rsn_capabilities.is_some(),
            !self.pmkids.is_empty(),
            self.group_mgmt_cipher_suite.is_some(),
        ];
        let last = present.iter().rposition(|p| *p).unwrap_or(0);
        if present[..last].iter().any(|p| !*p) {
            return Err(Error::InvalidValue("absent RSNE field before a present one"));
        }
        Ok(())
    }
}

fn write_suite(buf: &mut Vec<u8>, oui: &[u8; 3], suite_type: u8) {
    buf.put_slice(&oui[..]);
    buf.put_u8(suite_type);
}

struct BodyReader<'a> {
    buf: &'a [u8],
}

impl<'a> BodyReader<'a> {
    fn empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn read(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.buf.len() < n {
            return Err(Error::UnexpectedLength(Id::RSNE, self.buf.len()));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(LittleEndian::read_u16(self.read(2)?))
    }

    fn read_suite(&mut self) -> Result<([u8; 3], u8), Error> {
        let bytes = self.read(4)?;
        Ok(([bytes[0], bytes[1], bytes[2]], bytes[3]))
    }
}

/// Parses a serialized RSNE, TLV framing included. Truncated and over-long
/// elements are rejected.
pub fn from_bytes(bytes: &[u8]) -> Result<Rsne, Error> {
    if bytes.len() < 2 {
        return Err(Error::TruncatedHeader);
    }
    if bytes[0] != Id::RSNE {
        return Err(Error::InvalidValue("not an RSNE"));
    }
    let body_len = bytes[1] as usize;
    if bytes.len() != 2 + body_len {
        return Err(Error::UnexpectedLength(Id::RSNE, bytes.len() - 2));
    }
    let mut reader = BodyReader { buf: &bytes[2..] };

    let mut rsne = Rsne::new();
    rsne.version = reader.read_u16()?;
    loop {
        if reader.empty() {
            return Ok(rsne);
        }
        let (oui, suite_type) = reader.read_suite()?;
        rsne.group_data_cipher_suite = Some(Cipher { oui, suite_type });
        if reader.empty() {
            return Ok(rsne);
        }
        let pairwise_count = reader.read_u16()? as usize;
        for _ in 0..pairwise_count {
            let (oui, suite_type) = reader.read_suite()?;
            rsne.pairwise_cipher_suites.push(Cipher { oui, suite_type });
        }
        if reader.empty() {
            return Ok(rsne);
        }
        let akm_count = reader.read_u16()? as usize;
        for _ in 0..akm_count {
            let (oui, suite_type) = reader.read_suite()?;
            rsne.akm_suites.push(Akm { oui, suite_type });
        }
        if reader.empty() {
            return Ok(rsne);
        }
        rsne.rsn_capabilities = Some(RsnCapabilities(reader.read_u16()?));
        if reader.empty() {
            return Ok(rsne);
        }
        let pmkid_count = reader.read_u16()? as usize;
        for _ in 0..pmkid_count {
            let bytes = reader.read(16)?;
            let mut pmkid = [0u8; 16];
            pmkid.copy_from_slice(bytes);
            rsne.pmkids.push(pmkid);
        }
        if reader.empty() {
            return Ok(rsne);
        }
        let (oui, suite_type) = reader.read_suite()?;
        rsne.group_mgmt_cipher_suite = Some(Cipher { oui, suite_type });
        if !reader.empty() {
            return Err(Error::UnexpectedLength(Id::RSNE, body_len));
        }
        return Ok(rsne);
    }
}

//! The target BSS descriptor a connect command operates on.

use wifi_common::ie::{self, Id};
use wifi_common::{MacAddr, Ssid};

/// Everything the connect path needs to know about one BSS, captured from
/// its beacon or probe response.
#[derive(Clone, Debug, PartialEq)]
pub struct BssDescription {
    pub bssid: MacAddr,
    pub ssid: Ssid,
    pub freq: u32,
    pub capability: u16,
    /// The advertised IE section, original TLV framing preserved.
    pub ies: Vec<u8>,
}

impl BssDescription {
    /// The advertised RSNE, TLV framing included.
    pub fn rsne(&self) -> Option<&[u8]> {
        ie::find_raw_element(&self.ies[..], Id::RSNE)
    }

    /// The advertised MDE, TLV framing included. FT requires later frames to
    /// echo these bytes exactly.
    pub fn mde(&self) -> Option<&[u8]> {
        ie::find_raw_element(&self.ies[..], Id::MOBILITY_DOMAIN)
    }

    pub fn is_protected(&self) -> bool {
        self.rsne().is_some()
    }

    pub fn mdid(&self) -> Option<u16> {
        self.mde().and_then(|mde| wifi_common::ie::ft::Mde::from_bytes(mde).ok()).map(|m| m.mdid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fake_protected_bss_description, fake_unprotected_bss_description};

    #[test]
    fn protected_bss_exposes_rsne() {
        let bss = fake_protected_bss_description(b"foo".to_vec());
        let rsne = bss.rsne().expect("expected RSNE");
        assert_eq!(rsne[0], Id::RSNE);
        assert!(bss.is_protected());
    }

    #[test]
    fn unprotected_bss_has_no_rsne() {
        let bss = fake_unprotected_bss_description(b"foo".to_vec());
        assert!(bss.rsne().is_none());
        assert!(!bss.is_protected());
    }

    #[test]
    fn mdid_is_parsed_from_the_mde() {
        let mut bss = fake_protected_bss_description(b"foo".to_vec());
        bss.ies.extend_from_slice(&[0x36, 0x03, 0x34, 0x12, 0x01]);
        assert_eq!(bss.mde(), Some(&[0x36, 0x03, 0x34, 0x12, 0x01][..]));
        assert_eq!(bss.mdid(), Some(0x1234));
    }
}

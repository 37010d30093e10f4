use crate::ie::rsn::suite_selector::{self, OUI};

// IEEE Std 802.11-2016, 9.4.2.25.3, Table 9-133
pub const EAP: u8 = 1;
pub const PSK: u8 = 2;
pub const FT_EAP: u8 = 3;
pub const FT_PSK: u8 = 4;
pub const EAP_SHA256: u8 = 5;
pub const PSK_SHA256: u8 = 6;
pub const TDLS: u8 = 7;
pub const SAE: u8 = 8;
pub const FT_SAE: u8 = 9;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Akm {
    pub oui: [u8; 3],
    pub suite_type: u8,
}

impl Akm {
    pub fn new_dot11(suite_type: u8) -> Self {
        Akm { oui: OUI, suite_type }
    }

    pub fn has_known_algorithm(&self) -> bool {
        self.oui == OUI
            && match self.suite_type {
                EAP | PSK | FT_EAP | FT_PSK | EAP_SHA256 | PSK_SHA256 => true,
                _ => false,
            }
    }

    /// EAPOL-Key MIC length. IEEE Std 802.11-2016, 12.7.3, Table 12-8.
    pub fn mic_bytes(&self) -> Option<u16> {
        if self.oui != OUI {
            return None;
        }
        match self.suite_type {
            EAP | PSK | FT_EAP | FT_PSK | EAP_SHA256 | PSK_SHA256 => Some(16),
            _ => None,
        }
    }

    pub fn kck_bytes(&self) -> Option<usize> {
        self.mic_bytes().map(|_| 16)
    }

    pub fn kek_bytes(&self) -> Option<usize> {
        if self.oui != OUI {
            return None;
        }
        match self.suite_type {
            EAP | PSK | FT_EAP | FT_PSK | EAP_SHA256 | PSK_SHA256 => Some(16),
            _ => None,
        }
    }

    /// True for AKMs whose key derivation uses KDF-SHA256 rather than the
    /// SHA1-based PRF. IEEE Std 802.11-2016, 12.7.1.2.
    pub fn uses_sha256(&self) -> bool {
        self.oui == OUI
            && match self.suite_type {
                FT_EAP | FT_PSK | EAP_SHA256 | PSK_SHA256 => true,
                _ => false,
            }
    }

    pub fn is_ft(&self) -> bool {
        self.oui == OUI && (self.suite_type == FT_EAP || self.suite_type == FT_PSK)
    }

    pub fn to_u32(&self) -> u32 {
        suite_selector::as_u32(self.oui, self.suite_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn psk_properties() {
        let akm = Akm::new_dot11(PSK);
        assert!(akm.has_known_algorithm());
        assert!(!akm.uses_sha256());
        assert!(!akm.is_ft());
        assert_eq!(akm.mic_bytes(), Some(16));
        assert_eq!(akm.kck_bytes(), Some(16));
        assert_eq!(akm.kek_bytes(), Some(16));
        assert_eq!(akm.to_u32(), 0x000F_AC02);
    }

    #[test]
    fn ft_psk_uses_sha256() {
        let akm = Akm::new_dot11(FT_PSK);
        assert!(akm.is_ft());
        assert!(akm.uses_sha256());
        assert_eq!(akm.mic_bytes(), Some(16));
    }

    #[test]
    fn unknown_suite_has_no_mic() {
        assert_eq!(Akm::new_dot11(200).mic_bytes(), None);
        assert!(!Akm::new_dot11(200).has_known_algorithm());
    }
}
